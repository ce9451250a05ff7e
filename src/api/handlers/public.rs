//! Public handlers: registration and the read-only market data endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::models::{InstrumentResponse, RegisterRequest, TradeResponse, UserResponse};
use crate::services::matching::OrderBookSnapshot;
use crate::services::{instruments, trades, users};
use crate::utils::response::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

impl LimitQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(10).clamp(1, 100)
    }
}

/// POST /public/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    req.validate().map_err(ApiError::validation)?;

    let user = users::register(&state.db.pool, &req.name).await?;
    Ok(Json(user.into()))
}

/// GET /public/instrument
pub async fn list_instruments(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<InstrumentResponse>>, ApiError> {
    let instruments = instruments::list_all(&state.db.pool)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(instruments))
}

/// GET /public/orderbook/{ticker}
pub async fn get_orderbook(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<OrderBookSnapshot>, ApiError> {
    let depth = query.limit() as usize;
    Ok(Json(state.engine.snapshot(&ticker, depth)))
}

/// GET /public/transactions/{ticker}
pub async fn get_transactions(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<TradeResponse>>, ApiError> {
    let tape = trades::recent(&state.db.pool, &ticker, query.limit()).await?;
    Ok(Json(tape))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_query_defaults_and_clamps() {
        assert_eq!(LimitQuery { limit: None }.limit(), 10);
        assert_eq!(LimitQuery { limit: Some(5) }.limit(), 5);
        assert_eq!(LimitQuery { limit: Some(0) }.limit(), 1);
        assert_eq!(LimitQuery { limit: Some(10_000) }.limit(), 100);
    }
}
