//! JWT token service
//!
//! HS256 access tokens carrying the user id in `sub`. The engine-facing
//! contract is a plain result: token in, verified user id out. Token
//! internals never leak past this module.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};

/// Registered claims carried by an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly issued access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Token issue/verify service
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    lifetime: Duration,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.issuer.clone(),
            lifetime: Duration::from_std(config.token_lifetime)
                .unwrap_or_else(|_| Duration::hours(1)),
        }
    }

    /// Issue an access token for a user.
    pub fn issue(&self, user_id: Uuid) -> AuthResult<IssuedToken> {
        let now = Utc::now();
        let expires_at = now + self.lifetime;
        let claims = Claims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| AuthError::InvalidToken)?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Verify a token and return the user id it was issued to.
    pub fn verify(&self, token: &str) -> AuthResult<Uuid> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            }
        })?;

        Uuid::parse_str(&data.claims.sub).map_err(|_| AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(secret: &str) -> TokenService {
        TokenService::new(&AuthConfig {
            jwt_secret: secret.to_string(),
            ..AuthConfig::default()
        })
    }

    #[test]
    fn issue_verify_round_trip() {
        let tokens = service("test-secret-key-at-least-32-bytes-long!!");
        let user_id = Uuid::new_v4();

        let issued = tokens.issue(user_id).unwrap();
        assert!(issued.expires_at > Utc::now());
        assert_eq!(tokens.verify(&issued.token).unwrap(), user_id);
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut tokens = service("test-secret-key-at-least-32-bytes-long!!");
        tokens.lifetime = Duration::hours(-2);

        let issued = tokens.issue(Uuid::new_v4()).unwrap();
        assert!(matches!(
            tokens.verify(&issued.token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let issued = service("secret-one-0000000000000000000000000")
            .issue(Uuid::new_v4())
            .unwrap();
        assert!(matches!(
            service("secret-two-0000000000000000000000000").verify(&issued.token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        let tokens = service("test-secret-key-at-least-32-bytes-long!!");
        assert!(matches!(
            tokens.verify("not.a.token"),
            Err(AuthError::InvalidToken)
        ));
    }
}
