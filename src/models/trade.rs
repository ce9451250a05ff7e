use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One matched fill, written exactly once and never updated. The wallet
/// reference points at the selling side.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Trade {
    pub id: i64,
    pub instrument_id: i64,
    pub wallet_id: i64,
    pub amount: i64,
    pub price: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct TradeResponse {
    pub ticker: String,
    pub amount: i64,
    pub price: i64,
    pub timestamp: DateTime<Utc>,
}
