//! Bearer-token authentication for [`axum`](https://docs.rs/axum) services whose tokens are issued by a third-party
//! identity provider such as Auth0.
//!
//! ## Overview
//!
//! The identity provider's signing keys are never configured statically. Instead, they are fetched from the provider's
//! [JSON Web Key Set (JWKS)](https://datatracker.ietf.org/doc/html/rfc7517) endpoint on first use and cached for the
//! lifetime of the process. Each token is then handled in a fixed pipeline:
//!
//! 1. The unverified header names the signing key via its `kid`.
//! 2. The [`KeySetCache`] supplies the issuer's current key set, fetching it on a cold start. Concurrent first requests
//!    share a single fetch.
//! 3. The matching key record is rebuilt into an RSA [`VerificationKey`].
//! 4. The [`TokenValidator`] checks the RS256 signature, the audience, the issuer and the expiry (with a leeway of
//!    [`EXPIRY_LEEWAY`]).
//! 5. The verified claims are turned into the caller's [`Identity`].
//!
//! Every failure is reported as one of the variants of [`Error`] and is never retried internally.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use jwks_auth::{AuthConfig, AuthorizationLayer, Identity, TokenValidator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads AUTH0_DOMAIN, AUTH0_AUDIENCE and AUTH0_ISSUER.
//!     let config = AuthConfig::from_env()?;
//!     let validator = TokenValidator::from_config(&config)?;
//!
//!     let router = Router::new()
//!         .route("/whoami", get(|identity: Identity| async move { identity.subject }))
//!         .layer(AuthorizationLayer::new(validator));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod authorization;
pub mod claims;
pub mod config;
pub mod identity;
pub mod jwks_cache;
pub mod key;
pub mod key_source;
pub mod validator;

pub use authorization::AuthorizationLayer;
pub use claims::{Audience, TokenClaims};
pub use config::{AuthConfig, ConfigError};
pub use error::{Error, KeyFormatError, KeyRetrievalError, MalformedTokenError, VerificationError};
pub use identity::Identity;
pub use jwks_cache::{KeySet, KeySetCache};
pub use key::VerificationKey;
pub use key_source::KeySource;
pub use remote_jwk_set::{JwkSetRequestService, RemoteJwkSet, RemoteJwkSetBuilder};
pub use validator::{Clock, SystemClock, TokenValidator, EXPIRY_LEEWAY};

mod error;
mod remote_jwk_set;

#[cfg(test)]
mod test_support;
