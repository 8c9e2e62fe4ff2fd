use crate::config::AuthConfig;
use crate::error::AppError;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>, // Account email
    pub exp: i64,
    pub iat: i64,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Password hashing and session token signing.
///
/// The signing key, algorithm and default lifetime are fixed when the codec is
/// built and never change afterwards.
pub struct CredentialCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    ttl: Duration,
}

impl CredentialCodec {
    pub fn new(secret: &str, algorithm: Algorithm, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm,
            ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, AppError> {
        if config.secret_key.is_empty() {
            return Err(AppError::ConfigError("auth.secret_key must not be empty".into()));
        }

        let algorithm = Algorithm::from_str(&config.algorithm)
            .map_err(|_| AppError::ConfigError(format!("unknown signing algorithm: {}", config.algorithm)))?;
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(AppError::ConfigError(format!(
                "signing algorithm {} needs a key pair; only HS256, HS384 and HS512 are supported",
                config.algorithm
            )));
        }

        if config.access_token_expire_minutes <= 0 {
            return Err(AppError::ConfigError("auth.access_token_expire_minutes must be positive".into()));
        }

        Ok(Self::new(
            &config.secret_key,
            algorithm,
            Duration::minutes(config.access_token_expire_minutes),
        ))
    }

    /// Lifetime of tokens minted by [`issue_session_token`](Self::issue_session_token).
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn hash_password(plaintext: &str) -> Result<String, CodecError> {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt).map_err(|e| CodecError::Hashing(e.to_string()))?;

        Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| CodecError::Hashing(e.to_string()))
    }

    pub fn verify_password(plaintext: &str, digest: &str) -> bool {
        PasswordHash::new(digest)
            .map(|hash| Argon2::default().verify_password(plaintext.as_bytes(), &hash).is_ok())
            .unwrap_or(false)
    }

    pub fn issue_token(&self, subject: &str, ttl: Duration) -> Result<String, CodecError> {
        let now = Utc::now();
        let claims = Claims {
            sub: Some(subject.to_string()),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| CodecError::Signing(e.to_string()))
    }

    pub fn issue_session_token(&self, subject: &str) -> Result<String, CodecError> {
        self.issue_token(subject, self.ttl)
    }

    pub fn decode_token(&self, token: &str) -> Result<Claims, CodecError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => CodecError::Expired,
                _ => CodecError::InvalidSignature,
            })?
            .claims;

        // The library only rejects `exp < now`; a token expiring this second is already dead.
        if claims.exp <= Utc::now().timestamp() {
            return Err(CodecError::Expired);
        }

        Ok(claims)
    }
}
