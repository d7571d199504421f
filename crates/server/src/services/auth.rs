use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::Config,
    error::{AppError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub username: String,
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| AppError::Internal("Failed to hash password".to_string()))
}

/// False for a wrong password and for stored hashes that are not valid PHC
/// strings (such accounts cannot log in).
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn issue_token(
    user_id: &str,
    username: &str,
    token_type: TokenType,
    config: &Config,
) -> Result<String> {
    let lifetime = match token_type {
        TokenType::Access => Duration::minutes(config.access_token_minutes),
        TokenType::Refresh => Duration::days(config.refresh_token_days),
    };
    let now = Utc::now();
    let expiration = now
        .checked_add_signed(lifetime)
        .ok_or_else(|| AppError::Internal("Token lifetime out of range".to_string()))?;

    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        token_type,
        iat: now.timestamp(),
        exp: expiration.timestamp(),
        jti: Uuid::new_v4().simple().to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|_| AppError::Internal("Failed to create token".to_string()))
}

pub fn issue_token_pair(user_id: &str, username: &str, config: &Config) -> Result<TokenPair> {
    Ok(TokenPair {
        access: issue_token(user_id, username, TokenType::Access, config)?,
        refresh: issue_token(user_id, username, TokenType::Refresh, config)?,
    })
}

/// Verifies signature and expiry, and that the token is of the expected kind.
pub fn decode_token(token: &str, expected: TokenType, secret: &str) -> Result<Claims> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("Token is invalid or expired".to_string()))?
    .claims;

    if claims.token_type != expected {
        return Err(AppError::Unauthorized("Token has wrong type".to_string()));
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            port: 0,
            database_url: String::new(),
            jwt_secret: "unit-test-secret".to_string(),
            access_token_minutes: 5,
            refresh_token_days: 1,
        }
    }

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("pass1234").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("pass1234", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("pass1234", "not-a-phc-string"));
    }

    #[test]
    fn token_kinds_are_not_interchangeable() {
        let config = config();
        let pair = issue_token_pair("u1", "tester", &config).unwrap();

        let access = decode_token(&pair.access, TokenType::Access, &config.jwt_secret).unwrap();
        assert_eq!(access.sub, "u1");
        assert_eq!(access.username, "tester");
        assert!(access.exp > access.iat);

        assert!(decode_token(&pair.access, TokenType::Refresh, &config.jwt_secret).is_err());
        assert!(decode_token(&pair.refresh, TokenType::Access, &config.jwt_secret).is_err());
        assert!(decode_token(&pair.refresh, TokenType::Refresh, &config.jwt_secret).is_ok());
    }

    #[test]
    fn rejects_foreign_signature_and_expired_tokens() {
        let config = config();
        let token = issue_token("u1", "tester", TokenType::Access, &config).unwrap();
        assert!(decode_token(&token, TokenType::Access, "another-secret").is_err());

        let expired = Config {
            access_token_minutes: -10,
            ..config
        };
        let token = issue_token("u1", "tester", TokenType::Access, &expired).unwrap();
        assert!(matches!(
            decode_token(&token, TokenType::Access, &expired.jwt_secret),
            Err(AppError::Unauthorized(_))
        ));
    }
}
