use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("credential not found")]
    CredentialNotFound,

    #[error("credential revoked")]
    CredentialRevoked,

    #[error("credential expired")]
    CredentialExpired,

    #[error("resource not found")]
    ResourceNotFound,

    #[error("caller does not own this resource")]
    NotResourceOwner,

    #[error("admin key required")]
    AdminKeyRequired,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::CredentialNotFound => (
                StatusCode::NOT_FOUND,
                "authentication_error",
                "invalid_credential",
                "invalid or unknown credential".to_string(),
            ),
            AppError::CredentialRevoked => (
                StatusCode::FORBIDDEN,
                "authentication_error",
                "revoked",
                "credential has been revoked".to_string(),
            ),
            AppError::CredentialExpired => (
                StatusCode::FORBIDDEN,
                "authentication_error",
                "expired",
                "credential has expired".to_string(),
            ),
            AppError::ResourceNotFound => (
                StatusCode::NOT_FOUND,
                "invalid_request_error",
                "resource_unavailable",
                "resource not found or inactive".to_string(),
            ),
            AppError::NotResourceOwner => (
                StatusCode::FORBIDDEN,
                "permission_error",
                "not_resource_owner",
                "only the owning credential may manage this resource".to_string(),
            ),
            AppError::AdminKeyRequired => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "admin_key_required",
                "missing or invalid admin key".to_string(),
            ),
            AppError::InvalidRequest(reason) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "invalid_request",
                reason.clone(),
            ),
            AppError::Store(StoreError::NotFound) => (
                StatusCode::NOT_FOUND,
                "invalid_request_error",
                "not_found",
                "record not found".to_string(),
            ),
            AppError::Store(StoreError::UsageLimitExceeded) => (
                StatusCode::FORBIDDEN,
                "permission_error",
                "usage_exceeded",
                "credential usage limit exceeded".to_string(),
            ),
            AppError::Store(e) => {
                // DuplicateId surviving issuance retries, or a backend
                // failure — operational either way, never leaked.
                tracing::error!("Storage error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}
