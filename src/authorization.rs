use std::task::{Context, Poll};

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use axum::RequestPartsExt;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use futures::future::BoxFuture;
use tower::Layer;
use tower_service::Service;
use tracing::warn;

use crate::identity::Identity;
use crate::jwks_cache::KeySet;
use crate::remote_jwk_set::RemoteJwkSet;
use crate::validator::TokenValidator;
use crate::Error;

/// Authenticates every request by its bearer token and rejects the rest with `401 Unauthorized`.
///
/// Handlers behind the layer receive the caller's [`Identity`] as an extractor.
#[derive(Clone)]
pub struct AuthorizationLayer {
    validator: TokenValidator,
}

impl AuthorizationLayer {
    pub fn new(validator: TokenValidator) -> Self {
        Self { validator }
    }

    pub fn with_remote_jwk_set(remote_jwk_set: RemoteJwkSet, issuer: &str, audience: &str) -> Self {
        Self::new(TokenValidator::new(remote_jwk_set, issuer, audience))
    }

    pub fn with_local_jwk_set(key_set: KeySet, issuer: &str, audience: &str) -> Self {
        Self::new(TokenValidator::new(key_set, issuer, audience))
    }
}

impl<S> Layer<S> for AuthorizationLayer {
    type Service = AuthorizationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizationService {
            inner,
            validator: self.validator.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthorizationService<S> {
    inner: S,
    validator: TokenValidator,
}

impl<S> Service<Request> for AuthorizationService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        // Move the original service into the closure instead of its clone. This makes sure that the original service is
        // `call`ed instead of the cloned one, which might not be ready yet (`poll_ready` hasn't been called on the
        // clone yet).
        // See [docs](https://docs.rs/tower/latest/tower/trait.Service.html#be-careful-when-cloning-inner-services).
        let inner_clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner_clone);

        let validator = self.validator.clone();
        Box::pin(async move {
            match authorize_request(req, &validator).await {
                Ok(req) => inner.call(req).await,
                Err(auth_error) => {
                    warn!(error = %auth_error, reason = ?auth_error, "rejecting unauthenticated request");
                    Ok(auth_error.into_response())
                }
            }
        })
    }
}

async fn authorize_request(req: Request, validator: &TokenValidator) -> Result<Request, Error> {
    let (mut parts, body) = req.into_parts();

    // Extract the token from the authorization header
    let TypedHeader(Authorization(bearer)) = parts
        .extract::<TypedHeader<Authorization<Bearer>>>()
        .await?;

    let identity: Identity = validator.authenticate(bearer.token()).await?;
    parts.extensions.insert(identity);
    Ok(Request::from_parts(parts, body))
}
