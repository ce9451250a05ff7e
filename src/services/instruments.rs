//! Instrument lifecycle. Deletion cascades to the instrument's orders,
//! trades, and balances; cash reservations backing its open BUY orders are
//! unwound first so other balances stay exact.

use sqlx::{PgConnection, PgPool};

use crate::models::{CreateInstrumentRequest, Instrument, InstrumentResponse, QUOTE_TICKER};
use crate::services::matching::MatchingEngine;
use crate::services::{ledger, wallets};
use crate::utils::response::ApiError;

pub async fn by_ticker(
    conn: &mut PgConnection,
    ticker: &str,
) -> Result<Option<Instrument>, sqlx::Error> {
    sqlx::query_as::<_, Instrument>(
        "SELECT id, ticker, name, created_at FROM instruments WHERE ticker = $1",
    )
    .bind(ticker)
    .fetch_optional(conn)
    .await
}

pub async fn list_all(pool: &PgPool) -> Result<Vec<InstrumentResponse>, sqlx::Error> {
    let instruments = sqlx::query_as::<_, Instrument>(
        "SELECT id, ticker, name, created_at FROM instruments ORDER BY ticker",
    )
    .fetch_all(pool)
    .await?;

    Ok(instruments.into_iter().map(InstrumentResponse::from).collect())
}

pub async fn create(pool: &PgPool, req: &CreateInstrumentRequest) -> Result<Instrument, ApiError> {
    sqlx::query_as::<_, Instrument>(
        "INSERT INTO instruments (ticker, name) VALUES ($1, $2)
         RETURNING id, ticker, name, created_at",
    )
    .bind(&req.ticker)
    .bind(&req.name)
    .fetch_one(pool)
    .await
    .map_err(|err| match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ApiError::Conflict(format!("Instrument {} already exists", req.ticker))
        }
        _ => ApiError::from(err),
    })
}

pub async fn delete_by_ticker(
    pool: &PgPool,
    engine: &MatchingEngine,
    ticker: &str,
) -> Result<(), ApiError> {
    let _serialised = engine.lock_ticker(ticker).await;

    let mut tx = pool.begin().await.map_err(ApiError::from)?;

    let instrument = by_ticker(&mut *tx, ticker)
        .await?
        .ok_or(ApiError::NotFound("Instrument"))?;
    let quote = by_ticker(&mut *tx, QUOTE_TICKER)
        .await?
        .ok_or_else(|| {
            ApiError::Internal(anyhow::anyhow!("quote instrument {QUOTE_TICKER} not configured"))
        })?;

    // Open BUY orders reserve cash, and cash balances survive the cascade.
    // SELL reservations live on this instrument's own balance rows and are
    // deleted with them.
    let open_buys = ledger::open_buy_orders_for_instrument(&mut *tx, instrument.id).await?;
    for order in open_buys {
        if let Some(wallet) = wallets::by_user_id(&mut *tx, order.user_id).await? {
            ledger::release(&mut *tx, wallet.id, quote.id, order.remaining() * order.price)
                .await?;
        }
    }

    sqlx::query("DELETE FROM instruments WHERE id = $1")
        .bind(instrument.id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::from)?;

    tx.commit().await.map_err(ApiError::from)?;

    engine.remove_book(ticker);

    tracing::info!(%ticker, "instrument deleted");
    Ok(())
}
