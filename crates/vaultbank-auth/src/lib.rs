//! Vaultbank authentication
//!
//! Resolves inbound credentials to verified user identities. Two halves:
//!
//! - credential operations ([`Authorizer::register`], [`Authorizer::login`]):
//!   Argon2id-hashed passwords, HS256 tokens with a bounded lifetime
//! - request authorization ([`Authorizer::authorize`]): raw bearer token in,
//!   verified user id out; downstream components never inspect the token
//!
//! Whether the underlying checks block or not is this crate's business; the
//! contract is always a plain `Result`.

pub mod config;
pub mod error;
pub mod jwt;
pub mod password;

use std::sync::Arc;

use uuid::Uuid;

use vaultbank_store::{AccountStore, StoreError};
use vaultbank_types::User;

pub use config::{AuthConfig, DEFAULT_JWT_SECRET};
pub use error::{AuthError, AuthResult};
pub use jwt::{Claims, IssuedToken, TokenService};
pub use password::{hash_password, verify_password};

/// Request authorizer and credential service
pub struct Authorizer {
    store: Arc<dyn AccountStore>,
    tokens: TokenService,
    config: AuthConfig,
}

impl Authorizer {
    pub fn new(store: Arc<dyn AccountStore>, config: AuthConfig) -> Self {
        let tokens = TokenService::new(&config);
        Self {
            store,
            tokens,
            config,
        }
    }

    /// Register a new user.
    pub async fn register(&self, email: &str, password: &str) -> AuthResult<User> {
        let email = email.trim().to_ascii_lowercase();
        validate_email(&email)?;

        if password.len() < self.config.min_password_length {
            return Err(AuthError::WeakPassword(format!(
                "password must be at least {} characters",
                self.config.min_password_length
            )));
        }

        let password_hash = hash_password(password)?;
        let user = self
            .store
            .create_user(&email, &password_hash)
            .await
            .map_err(|e| match e {
                StoreError::Duplicate(_) => AuthError::EmailTaken,
                other => AuthError::Store(other),
            })?;

        tracing::info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Authenticate credentials and issue an access token.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<IssuedToken> {
        let email = email.trim().to_ascii_lowercase();
        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let issued = self.tokens.issue(user.id)?;
        tracing::info!(user_id = %user.id, "login successful");
        Ok(issued)
    }

    /// Resolve a raw bearer token to a verified user id.
    pub async fn authorize(&self, token: &str) -> AuthResult<Uuid> {
        self.tokens.verify(token)
    }
}

fn validate_email(email: &str) -> AuthResult<()> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(AuthError::InvalidEmail);
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') || email.contains(' ') {
        return Err(AuthError::InvalidEmail);
    }
    Ok(())
}
