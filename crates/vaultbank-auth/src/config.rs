//! Authentication configuration

use std::time::Duration;

/// Placeholder secret that must never survive into production.
pub const DEFAULT_JWT_SECRET: &str = "change-me-in-production";

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret for HS256 token signing
    pub jwt_secret: String,
    /// `iss` claim stamped into and required from every token
    pub issuer: String,
    /// Access token lifetime
    pub token_lifetime: Duration,
    /// Minimum accepted password length
    pub min_password_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: std::env::var("JWT_SECRET")
                .unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string()),
            issuer: "vaultbank".to_string(),
            token_lifetime: Duration::from_secs(60 * 60),
            min_password_length: 8,
        }
    }
}
