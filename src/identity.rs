use std::fmt;

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::Serialize;

use crate::{claims::TokenClaims, Error};

/// The authenticated principal of a request.
///
/// `subject` is the identity provider's user id and scopes every record the request may read or write.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub subject: String,
    pub email: Option<String>,
}

impl Identity {
    pub fn from_claims(claims: TokenClaims) -> Self {
        Self {
            subject: claims.sub,
            email: claims.email,
        }
    }
}

impl From<TokenClaims> for Identity {
    fn from(claims: TokenClaims) -> Self {
        Self::from_claims(claims)
    }
}

// Keeps email addresses out of logs.
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("subject", &self.subject)
            .field("email", &self.email.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Hands the identity established by [`AuthorizationLayer`](crate::AuthorizationLayer) to handlers.
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(Error::MissingIdentity)
    }
}
