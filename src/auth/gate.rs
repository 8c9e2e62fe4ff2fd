//! Request authentication middleware.
//!
//! Every request passes through [`AccessGate`]. A request whose path matches
//! the public path list goes straight through; any other request must carry a
//! bearer token that resolves to an account, otherwise it is answered with 401
//! (or 500 when the lookup itself fails) before reaching a handler.

use crate::auth::resolver::SessionResolver;
use crate::db::User;
use crate::error::{AppError, AuthError};
use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderMap, AUTHORIZATION};
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest, ResponseError};
use futures::future::LocalBoxFuture;
use regex::Regex;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Ordered list of path patterns exempt from authentication.
#[derive(Debug)]
pub struct PublicPaths {
    patterns: Vec<Regex>,
}

impl PublicPaths {
    /// Compiles the patterns. Each one is anchored at the start of the path,
    /// so `/docs$` matches `/docs` but not `/api/docs`.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| {
                let p = p.as_ref();
                let anchored = p.strip_prefix('^').unwrap_or(p);
                Regex::new(&format!("^(?:{})", anchored))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    /// Index of the first pattern matching `path`.
    pub fn matching(&self, path: &str) -> Option<usize> {
        self.patterns.iter().position(|re| re.is_match(path))
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.matching(path).is_some()
    }
}

/// Attached to the request extensions once the token has been resolved.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user: User,
    pub token: String,
}

/// How the gate settled a request.
#[derive(Debug)]
pub enum GateOutcome {
    PublicBypass,
    Authenticated(Authenticated),
    Rejected(AppError),
}

/// Pulls the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
}

/// Middleware factory. Cheap to clone; all state is shared and immutable.
#[derive(Clone)]
pub struct AccessGate {
    public_paths: Arc<PublicPaths>,
    resolver: Arc<SessionResolver>,
}

impl AccessGate {
    pub fn new(public_paths: Arc<PublicPaths>, resolver: Arc<SessionResolver>) -> Self {
        Self { public_paths, resolver }
    }

    /// Classifies a request by path and headers. Produces exactly one outcome.
    pub async fn classify(&self, path: &str, headers: &HeaderMap) -> GateOutcome {
        if self.public_paths.is_public(path) {
            return GateOutcome::PublicBypass;
        }

        let Some(token) = bearer_token(headers) else {
            warn!("Rejected {}: no bearer token", path);
            return GateOutcome::Rejected(AuthError::NotAuthenticated.into());
        };

        match self.resolver.resolve(token).await {
            Ok(user) => {
                debug!("Authenticated {} for {}", user.email, path);
                GateOutcome::Authenticated(Authenticated { user, token: token.to_string() })
            }
            Err(e) => {
                warn!("Rejected {}: {}", path, e);
                GateOutcome::Rejected(e.into())
            }
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AccessGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AccessGateMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AccessGateMiddleware {
            service: Rc::new(service),
            gate: self.clone(),
        }))
    }
}

pub struct AccessGateMiddleware<S> {
    service: Rc<S>,
    gate: AccessGate,
}

impl<S, B> Service<ServiceRequest> for AccessGateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let gate = self.gate.clone();

        Box::pin(async move {
            let outcome = gate.classify(req.path(), req.headers()).await;
            match outcome {
                GateOutcome::PublicBypass => {
                    service.call(req).await.map(ServiceResponse::map_into_left_body)
                }
                GateOutcome::Authenticated(authenticated) => {
                    req.extensions_mut().insert(authenticated);
                    service.call(req).await.map(ServiceResponse::map_into_left_body)
                }
                GateOutcome::Rejected(err) => {
                    let response = err.error_response();
                    Ok(req.into_response(response).map_into_right_body())
                }
            }
        })
    }
}

/// Handler argument giving the account the gate resolved for this request.
///
/// Reads what the gate stored; it never decodes the token again.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Authenticated);

impl CurrentUser {
    pub fn user(&self) -> &User {
        &self.0.user
    }

    pub fn into_user(self) -> User {
        self.0.user
    }
}

impl FromRequest for CurrentUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Authenticated>()
                .cloned()
                .map(CurrentUser)
                .ok_or(AppError::AuthError(AuthError::NotAuthenticated)),
        )
    }
}
