//! API error handling
//!
//! One error type, one kind→status table. Handlers convert domain errors
//! into [`ApiError`]; nothing else decides transport status, and no internal
//! error text crosses the boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use vaultbank_auth::AuthError;
use vaultbank_ledger::{EngineError, RejectKind};
use vaultbank_store::StoreError;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// API error
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or invalid credentials")]
    Unauthorized,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// An engine rejection, carried through to the response verbatim
    #[error("transfer rejected")]
    Transfer(RejectKind),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("internal server error")]
    Internal,
}

impl ApiError {
    /// The centralized error-kind to transport-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidParameter(_) | Self::InvalidAmount(_) => StatusCode::BAD_REQUEST,
            Self::Transfer(kind) if kind.is_retryable() => StatusCode::CONFLICT,
            Self::Transfer(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error kind for response bodies.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::InvalidParameter(_) => "invalid_parameter",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::Transfer(kind) => external_reject_kind(*kind),
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Internal => "internal",
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Transfer(kind) => kind.message().to_string(),
            other => other.to_string(),
        }
    }
}

/// An unauthorized source must read exactly like a missing one; the
/// distinction only exists in server-side logs.
fn external_reject_kind(kind: RejectKind) -> &'static str {
    match kind {
        RejectKind::UnauthorizedSource => RejectKind::SourceNotFound.as_str(),
        other => other.as_str(),
    }
}

/// JSON error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.error_kind().to_string(),
            message: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidToken | AuthError::TokenExpired | AuthError::InvalidCredentials => {
                Self::Unauthorized
            }
            AuthError::InvalidEmail => Self::InvalidParameter("invalid email address".to_string()),
            AuthError::WeakPassword(msg) => Self::InvalidParameter(msg),
            AuthError::EmailTaken => Self::Conflict("email already registered".to_string()),
            AuthError::Store(e) => Self::from(e),
            err => {
                tracing::error!(error = %err, "authentication failure");
                Self::Internal
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound("account not found".to_string()),
            StoreError::Duplicate(msg) => Self::Conflict(msg),
            StoreError::ConflictTimeout => {
                Self::Conflict("operation could not be completed in time, retry".to_string())
            }
            StoreError::InvalidInput(msg) => Self::InvalidParameter(msg),
            err => {
                tracing::error!(error = %err, "store error");
                Self::Internal
            }
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        tracing::error!(error = %err, "transfer engine failure");
        Self::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_table() {
        assert_eq!(
            ApiError::Transfer(RejectKind::InvalidAmount).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Transfer(RejectKind::InsufficientFunds).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Transfer(RejectKind::ConflictTimeout).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::NotFound("x".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::Internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unauthorized_source_is_externally_source_not_found() {
        let denied = ApiError::Transfer(RejectKind::UnauthorizedSource);
        let missing = ApiError::Transfer(RejectKind::SourceNotFound);

        assert_eq!(denied.error_kind(), missing.error_kind());
        assert_eq!(denied.public_message(), missing.public_message());
        assert_eq!(denied.status_code(), missing.status_code());
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let err = ApiError::from(EngineError::StoreUnavailable(
            "connection refused (10.0.0.3:5432)".to_string(),
        ));
        assert_eq!(err.public_message(), "internal server error");
    }
}
