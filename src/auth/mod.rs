//! Authentication module
//!
//! Password hashing and token signing ([`CredentialCodec`]), token to account
//! resolution ([`SessionResolver`]), the request gate in front of every route
//! ([`AccessGate`]) and the register/login/session handlers.

pub mod codec;
pub mod gate;
pub mod handlers;
pub mod resolver;

pub use codec::{Claims, CodecError, CredentialCodec};
pub use gate::{AccessGate, Authenticated, CurrentUser, GateOutcome, PublicPaths};
pub use resolver::{ResolveError, SessionResolver};
