//! Admin handlers: wallet funding and user/instrument lifecycle.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::models::{BalanceChangeRequest, CreateInstrumentRequest, UserResponse};
use crate::services::{instruments, users, wallets};
use crate::utils::response::{ApiError, SuccessResponse};
use crate::AppState;

/// POST /admin/balance/deposit
pub async fn deposit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BalanceChangeRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    req.validate().map_err(ApiError::validation)?;

    wallets::deposit(&state.db.pool, &req).await?;
    Ok(Json(SuccessResponse::new()))
}

/// POST /admin/balance/withdraw
pub async fn withdraw(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BalanceChangeRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    req.validate().map_err(ApiError::validation)?;

    wallets::withdraw(&state.db.pool, &req).await?;
    Ok(Json(SuccessResponse::new()))
}

/// POST /admin/instrument
pub async fn add_instrument(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateInstrumentRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    req.validate().map_err(ApiError::validation)?;

    instruments::create(&state.db.pool, &req).await?;
    Ok(Json(SuccessResponse::new()))
}

/// DELETE /admin/instrument/{ticker}
pub async fn delete_instrument(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    instruments::delete_by_ticker(&state.db.pool, &state.engine, &ticker).await?;
    Ok(Json(SuccessResponse::new()))
}

/// DELETE /admin/user/{user_id}
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserResponse>, ApiError> {
    let deleted = users::delete_by_id(&state.db.pool, user_id).await?;
    state.engine.purge_user(user_id).await;
    Ok(Json(deleted.into()))
}
