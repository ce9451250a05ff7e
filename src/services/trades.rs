//! Trade tape: recent fills per instrument, newest first.

use sqlx::PgPool;

use crate::models::TradeResponse;
use crate::services::instruments;
use crate::utils::response::ApiError;

pub async fn recent(
    pool: &PgPool,
    ticker: &str,
    limit: i64,
) -> Result<Vec<TradeResponse>, ApiError> {
    let mut conn = pool.acquire().await.map_err(ApiError::from)?;
    instruments::by_ticker(&mut *conn, ticker)
        .await?
        .ok_or(ApiError::NotFound("Instrument"))?;

    let trades = sqlx::query_as::<_, TradeResponse>(
        "SELECT i.ticker, t.amount, t.price, t.timestamp
         FROM transactions t
         JOIN instruments i ON i.id = t.instrument_id
         WHERE i.ticker = $1
         ORDER BY t.timestamp DESC, t.id DESC
         LIMIT $2",
    )
    .bind(ticker)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await
    .map_err(ApiError::from)?;

    Ok(trades)
}
