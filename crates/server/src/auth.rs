//! Session tokens.
//!
//! HS256 tokens bound to a username, with a UUID `jti` so individual tokens
//! can be revoked before their natural expiry (the revocation list lives in
//! the store).

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Username the session is bound to.
    pub sub: String,
    /// Expiry, seconds since the epoch.
    pub exp: usize,
    /// Unique token identifier, checked against the revocation list.
    pub jti: String,
}

/// Issues and verifies session tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    /// Issue a signed, time-limited token for a username.
    pub fn issue(&self, username: &str) -> Result<String, AppError> {
        let exp = Utc::now().timestamp() as usize + self.ttl.as_secs() as usize;
        let claims = Claims {
            sub: username.to_string(),
            exp,
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Token encoding failed: {}", e)))
    }

    /// Verify signature and expiry. Revocation is checked separately against
    /// the store.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let validation = Validation::new(Algorithm::HS256);

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::Unauthorized("The token has expired".to_string())
                }
                _ => AppError::Unauthorized("Invalid token".to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_and_verify_round_trip() {
        let tokens = TokenService::new("test-secret", Duration::from_secs(60));
        let token = tokens.issue("alice").unwrap();

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert!(!claims.jti.is_empty());
    }

    #[test]
    fn tokens_carry_distinct_jtis() {
        let tokens = TokenService::new("test-secret", Duration::from_secs(60));
        let a = tokens.verify(&tokens.issue("alice").unwrap()).unwrap();
        let b = tokens.verify(&tokens.issue("alice").unwrap()).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let issuer = TokenService::new("secret-a", Duration::from_secs(60));
        let verifier = TokenService::new("secret-b", Duration::from_secs(60));

        let token = issuer.issue("alice").unwrap();
        assert!(matches!(
            verifier.verify(&token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = TokenService::new("test-secret", Duration::from_secs(60));

        // Hand-roll a token whose expiry is firmly in the past.
        let claims = Claims {
            sub: "alice".to_string(),
            exp: (Utc::now().timestamp() - 3600) as usize,
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret("test-secret".as_bytes()),
        )
        .unwrap();

        let err = tokens.verify(&token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(msg) if msg.contains("expired")));
    }
}
