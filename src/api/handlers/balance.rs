use axum::{extract::State, Extension, Json};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::auth::middleware::AuthUser;
use crate::services::wallets;
use crate::utils::response::ApiError;
use crate::AppState;

/// GET /balance, mapping ticker to total units held (reserved included).
pub async fn get_balances(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<BTreeMap<String, i64>>, ApiError> {
    let balances = wallets::user_balances(&state.db.pool, auth_user.id).await?;
    Ok(Json(balances))
}
