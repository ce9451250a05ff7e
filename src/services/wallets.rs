//! Wallet lookups, the balance projection, and admin deposit/withdraw.

use sqlx::{PgConnection, PgPool};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::{BalanceChangeRequest, Wallet};
use crate::services::ledger::LedgerError;
use crate::services::{instruments, ledger};
use crate::utils::response::ApiError;

pub async fn by_user_id(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> Result<Option<Wallet>, sqlx::Error> {
    sqlx::query_as::<_, Wallet>("SELECT id, user_id FROM wallets WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(conn)
        .await
}

pub async fn create_for_user(conn: &mut PgConnection, user_id: Uuid) -> Result<Wallet, sqlx::Error> {
    sqlx::query_as::<_, Wallet>("INSERT INTO wallets (user_id) VALUES ($1) RETURNING id, user_id")
        .bind(user_id)
        .fetch_one(conn)
        .await
}

/// Ticker → total units held (reserved included).
pub async fn user_balances(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<BTreeMap<String, i64>, ApiError> {
    let mut conn = pool.acquire().await.map_err(ApiError::from)?;
    let wallet = by_user_id(&mut *conn, user_id)
        .await?
        .ok_or(ApiError::NotFound("Wallet"))?;

    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT i.ticker, b.amount
         FROM balances b
         JOIN instruments i ON i.id = b.instrument_id
         WHERE b.wallet_id = $1
         ORDER BY i.ticker",
    )
    .bind(wallet.id)
    .fetch_all(&mut *conn)
    .await
    .map_err(ApiError::from)?;

    Ok(rows.into_iter().collect())
}

pub async fn deposit(pool: &PgPool, req: &BalanceChangeRequest) -> Result<(), ApiError> {
    let mut tx = pool.begin().await.map_err(ApiError::from)?;

    let wallet = by_user_id(&mut *tx, req.user_id)
        .await?
        .ok_or(ApiError::NotFound("Wallet"))?;
    let instrument = instruments::by_ticker(&mut *tx, &req.ticker)
        .await?
        .ok_or(ApiError::NotFound("Instrument"))?;

    ledger::deposit(&mut *tx, wallet.id, instrument.id, req.amount).await?;

    tx.commit().await.map_err(ApiError::from)?;
    Ok(())
}

pub async fn withdraw(pool: &PgPool, req: &BalanceChangeRequest) -> Result<(), ApiError> {
    let mut tx = pool.begin().await.map_err(ApiError::from)?;

    let wallet = by_user_id(&mut *tx, req.user_id)
        .await?
        .ok_or(ApiError::NotFound("Wallet"))?;
    let instrument = instruments::by_ticker(&mut *tx, &req.ticker)
        .await?
        .ok_or(ApiError::NotFound("Instrument"))?;

    match ledger::withdraw(&mut *tx, wallet.id, instrument.id, req.amount).await {
        Ok(()) => {}
        Err(LedgerError::BalanceMissing) => {
            return Err(ApiError::NotFound("Instrument balance"));
        }
        Err(LedgerError::InsufficientFunds) => {
            return Err(ApiError::InsufficientFunds("Insufficient funds".to_string()));
        }
        Err(err) => return Err(err.into()),
    }

    tx.commit().await.map_err(ApiError::from)?;
    Ok(())
}
