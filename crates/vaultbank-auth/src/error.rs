//! Authentication error types

use thiserror::Error;
use vaultbank_store::StoreError;

/// Authentication and authorization errors
///
/// Credential failures are deliberately uniform: a wrong password and an
/// unknown email both surface as [`AuthError::InvalidCredentials`].
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    TokenExpired,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid email address")]
    InvalidEmail,

    #[error("password too weak: {0}")]
    WeakPassword(String),

    #[error("email already registered")]
    EmailTaken,

    #[error("password hashing failed")]
    PasswordHashingFailed,

    #[error("password verification failed")]
    PasswordVerificationFailed,

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
