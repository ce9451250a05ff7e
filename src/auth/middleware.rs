use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::UserRole;
use crate::services::users;
use crate::utils::response::ApiError;
use crate::AppState;

/// Authenticated caller, inserted into request extensions by
/// [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: UserRole,
}

/// Resolves `Authorization: TOKEN <api_key>` to a user.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match header_value.and_then(|h| h.strip_prefix("TOKEN ")) {
        Some(key) => key,
        None => return Err(ApiError::InvalidAuthorizationFormat),
    };

    let user = users::find_by_api_key(&state.db.pool, api_key)
        .await?
        .ok_or(ApiError::InvalidApiKey)?;

    request.extensions_mut().insert(AuthUser {
        id: user.id,
        role: user.role,
    });

    Ok(next.run(request).await)
}

/// Rejects non-admin callers; must run after [`auth_middleware`].
pub async fn admin_middleware(request: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(ApiError::InvalidAuthorizationFormat)?;

    if auth_user.role != UserRole::Admin {
        return Err(ApiError::AccessDenied("Access denied: Admin rights required"));
    }

    Ok(next.run(request).await)
}
