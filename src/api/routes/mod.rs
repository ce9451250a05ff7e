use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use crate::api::handlers;
use crate::auth::middleware::{admin_middleware, auth_middleware};
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/public/register", post(handlers::public::register))
        .route("/public/instrument", get(handlers::public::list_instruments))
        .route("/public/orderbook/:ticker", get(handlers::public::get_orderbook))
        .route("/public/transactions/:ticker", get(handlers::public::get_transactions));

    // Authenticated user routes
    let user_routes = Router::new()
        .route("/balance", get(handlers::balance::get_balances))
        .route("/order", post(handlers::order::create_order))
        .route("/order", get(handlers::order::list_orders))
        .route("/order/:order_id", get(handlers::order::get_order))
        .route("/order/:order_id", delete(handlers::order::cancel_order))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Admin routes: auth first, then the role gate
    let admin_routes = Router::new()
        .route("/admin/balance/deposit", post(handlers::admin::deposit))
        .route("/admin/balance/withdraw", post(handlers::admin::withdraw))
        .route("/admin/instrument", post(handlers::admin::add_instrument))
        .route("/admin/instrument/:ticker", delete(handlers::admin::delete_instrument))
        .route("/admin/user/:user_id", delete(handlers::admin::delete_user))
        .layer(axum_middleware::from_fn(admin_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(admin_routes)
}
