//! HTTP error taxonomy and response envelopes.
//!
//! Every handler returns `Result<Json<T>, ApiError>`; the `IntoResponse`
//! impl maps each error class to its status code and a `{ "detail": ... }`
//! body. Accounting violations (`InsufficientReserved`, broken invariants)
//! are deliberately surfaced as 500s, never masked as client errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn new() -> Self {
        Self { success: true }
    }
}

impl Default for SuccessResponse {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0} does not exist")]
    NotFound(&'static str),

    #[error("Invalid authorization format")]
    InvalidAuthorizationFormat,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("{0}")]
    AccessDenied(&'static str),

    #[error("{0}")]
    InsufficientFunds(String),

    #[error("Not enough liquidity for market order")]
    InsufficientLiquidity,

    #[error("{0}")]
    InvalidOrderState(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidAuthorizationFormat | ApiError::InvalidApiKey => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::AccessDenied(_) => StatusCode::FORBIDDEN,
            ApiError::InsufficientFunds(_)
            | ApiError::InsufficientLiquidity
            | ApiError::InvalidOrderState(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn validation(errors: validator::ValidationErrors) -> Self {
        ApiError::Validation(errors.to_string())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Internal(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("internal error: {:#}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::NotFound("Instrument").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::InvalidAuthorizationFormat.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::InvalidApiKey.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::AccessDenied("Access denied: Admin rights required").status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::InsufficientFunds("Insufficient funds".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::InsufficientLiquidity.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Validation("bad".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_not_found_detail() {
        assert_eq!(
            ApiError::NotFound("Instrument").to_string(),
            "Instrument does not exist"
        );
    }
}
