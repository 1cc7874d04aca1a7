//! Stateless access token issuer (HS256 JWT).
//!
//! Tokens are short-lived and self-contained; verification needs only the
//! shared signing secret and the clock, never the database. Every
//! verification failure collapses into one opaque outcome so callers cannot
//! distinguish a bad signature from an expired token.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::config::{TOKEN_AUDIENCE, TOKEN_ISSUER};
use crate::error::{AppError, AppResult};
use crate::models::user::AccessClaims;

/// Create a signed access token for the given principal.
pub fn create_access_token(
    user_id: Uuid,
    username: &str,
    secret: &SecretString,
    ttl_secs: u64,
) -> AppResult<String> {
    let now = chrono::Utc::now();
    let exp = now + chrono::Duration::seconds(ttl_secs as i64);

    let claims = AccessClaims {
        sub: user_id.to_string(),
        iss: TOKEN_ISSUER.to_string(),
        aud: TOKEN_AUDIENCE.to_string(),
        exp: exp.timestamp() as usize,
        iat: now.timestamp() as usize,
        user_id: user_id.to_string(),
        username: username.to_string(),
    };

    let key = EncodingKey::from_secret(secret.expose_secret().as_bytes());
    encode(&Header::default(), &claims, &key)
        .map_err(|e| AppError::Database(format!("Failed to sign access token: {}", e)))
}

/// Verify an access token and return its claims.
///
/// Checks signature, issuer, audience, and expiry with zero leeway.
pub fn verify_access_token(token: &str, secret: &SecretString) -> Result<AccessClaims, String> {
    let key = DecodingKey::from_secret(secret.expose_secret().as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[TOKEN_ISSUER]);
    validation.set_audience(&[TOKEN_AUDIENCE]);
    validation.leeway = 0;

    let token_data = decode::<AccessClaims>(token, &key, &validation)
        .map_err(|e| format!("Invalid access token: {}", e))?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_secret() -> SecretString {
        SecretString::from("unit-test-signing-secret")
    }

    #[test]
    fn test_issue_and_verify_roundtrip() {
        let user_id = Uuid::new_v4();
        let token = create_access_token(user_id, "alice", &test_secret(), 3600).unwrap();

        let claims = verify_access_token(&token, &test_secret()).unwrap();
        assert_eq!(claims.user_id, user_id.to_string());
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.iss, TOKEN_ISSUER);
        assert_eq!(claims.aud, TOKEN_AUDIENCE);
    }

    #[test]
    fn test_tampered_token_fails_verification() {
        let token = create_access_token(Uuid::new_v4(), "alice", &test_secret(), 3600).unwrap();

        // Flip the last signature character.
        let mut tampered: String = token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });
        assert_ne!(token, tampered);

        assert!(verify_access_token(&tampered, &test_secret()).is_err());
    }

    #[test]
    fn test_wrong_secret_fails_verification() {
        let token = create_access_token(Uuid::new_v4(), "alice", &test_secret(), 3600).unwrap();
        let other = SecretString::from("a-different-secret");

        assert!(verify_access_token(&token, &other).is_err());
    }

    #[test]
    fn test_expired_token_fails_verification() {
        // Craft a well-formed token whose expiry is already in the past.
        let now = chrono::Utc::now();
        let claims = AccessClaims {
            sub: Uuid::new_v4().to_string(),
            iss: TOKEN_ISSUER.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            exp: (now - chrono::Duration::seconds(120)).timestamp() as usize,
            iat: (now - chrono::Duration::seconds(3720)).timestamp() as usize,
            user_id: Uuid::new_v4().to_string(),
            username: "alice".to_string(),
        };
        let key = EncodingKey::from_secret(test_secret().expose_secret().as_bytes());
        let token = encode(&Header::default(), &claims, &key).unwrap();

        assert!(verify_access_token(&token, &test_secret()).is_err());
    }

    #[test]
    fn test_wrong_issuer_fails_verification() {
        let now = chrono::Utc::now();
        let claims = AccessClaims {
            sub: Uuid::new_v4().to_string(),
            iss: "someone-else".to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            exp: (now + chrono::Duration::seconds(3600)).timestamp() as usize,
            iat: now.timestamp() as usize,
            user_id: Uuid::new_v4().to_string(),
            username: "alice".to_string(),
        };
        let key = EncodingKey::from_secret(test_secret().expose_secret().as_bytes());
        let token = encode(&Header::default(), &claims, &key).unwrap();

        assert!(verify_access_token(&token, &test_secret()).is_err());
    }
}
