//! Order handlers: placement, listing, inspection, cancellation.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use sqlx::FromRow;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::models::{CreateOrderRequest, CreateOrderResponse, Order, OrderView};
use crate::utils::response::{ApiError, SuccessResponse};
use crate::AppState;

#[derive(Debug, FromRow)]
struct OrderRow {
    #[sqlx(flatten)]
    order: Order,
    ticker: String,
}

/// POST /order
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, ApiError> {
    req.validate().map_err(ApiError::validation)?;

    let order_id = state.engine.place_order(auth_user.id, &req).await?;

    Ok(Json(CreateOrderResponse {
        success: true,
        order_id,
    }))
}

/// GET /order
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<Vec<OrderView>>, ApiError> {
    let rows = sqlx::query_as::<_, OrderRow>(
        "SELECT o.id, o.user_id, o.instrument_id, o.order_type, o.status, o.direction,
                o.qty, o.price, o.filled, o.timestamp, i.ticker
         FROM orders o
         JOIN instruments i ON i.id = o.instrument_id
         WHERE o.user_id = $1
         ORDER BY o.timestamp DESC",
    )
    .bind(auth_user.id)
    .fetch_all(&state.db.pool)
    .await
    .map_err(ApiError::from)?;

    let views = rows
        .iter()
        .map(|row| OrderView::from_order(&row.order, &row.ticker))
        .collect();

    Ok(Json(views))
}

/// GET /order/{order_id}
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderView>, ApiError> {
    let row = sqlx::query_as::<_, OrderRow>(
        "SELECT o.id, o.user_id, o.instrument_id, o.order_type, o.status, o.direction,
                o.qty, o.price, o.filled, o.timestamp, i.ticker
         FROM orders o
         JOIN instruments i ON i.id = o.instrument_id
         WHERE o.id = $1",
    )
    .bind(order_id)
    .fetch_optional(&state.db.pool)
    .await
    .map_err(ApiError::from)?
    .ok_or(ApiError::NotFound("Order"))?;

    if row.order.user_id != auth_user.id {
        return Err(ApiError::AccessDenied("Can't get other user's order"));
    }

    Ok(Json(OrderView::from_order(&row.order, &row.ticker)))
}

/// DELETE /order/{order_id}
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.engine.cancel_order(auth_user.id, order_id).await?;
    Ok(Json(SuccessResponse::new()))
}
