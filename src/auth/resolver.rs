use crate::auth::codec::{CodecError, CredentialCodec};
use crate::db::{AccountStore, User};
use crate::error::{AppError, AuthError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token carries no subject")]
    MalformedToken,

    #[error("no account matches the token subject")]
    UnknownPrincipal,

    #[error("account lookup failed: {0}")]
    Storage(#[source] AppError),
}

impl From<ResolveError> for AppError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::InvalidSignature | ResolveError::Expired | ResolveError::MalformedToken => {
                AppError::AuthError(AuthError::InvalidToken)
            }
            ResolveError::UnknownPrincipal => AppError::AuthError(AuthError::PrincipalNotFound),
            // Whatever the store reported, a failed lookup is a server fault.
            ResolveError::Storage(e) => AppError::InternalError(format!("account lookup failed: {}", e)),
        }
    }
}

/// Turns a bearer token into the account it was issued for.
pub struct SessionResolver {
    codec: Arc<CredentialCodec>,
    accounts: Arc<dyn AccountStore>,
}

impl SessionResolver {
    pub fn new(codec: Arc<CredentialCodec>, accounts: Arc<dyn AccountStore>) -> Self {
        Self { codec, accounts }
    }

    pub async fn resolve(&self, token: &str) -> Result<User, ResolveError> {
        let claims = self.codec.decode_token(token).map_err(|e| match e {
            CodecError::Expired => ResolveError::Expired,
            _ => ResolveError::InvalidSignature,
        })?;

        let email = claims.sub.ok_or(ResolveError::MalformedToken)?;

        self.accounts
            .find_user_by_email(&email)
            .await
            .map_err(ResolveError::Storage)?
            .ok_or(ResolveError::UnknownPrincipal)
    }
}
