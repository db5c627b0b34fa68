use std::{
    task::{Context, Poll},
    time::Duration,
};

use futures::future::BoxFuture;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use reqwest::Client;
use tower::Service;
use tracing::debug;
use url::Url;

use crate::{
    error::KeyRetrievalError,
    jwks_cache::{KeySet, KeySetCache, DEFAULT_MIN_REFRESH_INTERVAL},
    Error,
};

/// Default upper bound for a single JWK set request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Builder for configuring a `RemoteJwkSet`.
pub struct RemoteJwkSetBuilder {
    url: Url,
    time_to_live: Option<Duration>,
    fetch_timeout: Duration,
    refresh_on_unknown_kid: bool,
    min_refresh_interval: Duration,
}

impl RemoteJwkSetBuilder {
    /// Creates a new builder with the given JWKS URL.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            time_to_live: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            refresh_on_unknown_kid: false,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
        }
    }

    /// Expires the cached JWK set after `time_to_live`. Without it, the JWK set is fetched once and kept.
    pub fn with_cache(mut self, time_to_live: Duration) -> Self {
        self.time_to_live = Some(time_to_live);
        self
    }

    /// Upper bound for a single request to the JWKS endpoint.
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Re-fetches the JWK set once when a token names a `kid` the cached set doesn't contain, e.g. after the issuer
    /// rotated its keys. Re-fetches happen at most once per `min_refresh_interval`.
    pub fn with_refresh_on_unknown_kid(mut self, min_refresh_interval: Duration) -> Self {
        self.refresh_on_unknown_kid = true;
        self.min_refresh_interval = min_refresh_interval;
        self
    }

    /// Builds the `RemoteJwkSet` with the configured options.
    pub fn build(self) -> RemoteJwkSet {
        let request_service = JwkSetRequestService::new(Client::new(), self.url, self.fetch_timeout);

        let mut cache =
            KeySetCache::new(request_service).with_min_refresh_interval(self.min_refresh_interval);
        if let Some(time_to_live) = self.time_to_live {
            cache = cache.with_time_to_live(time_to_live);
        }

        RemoteJwkSet {
            cache,
            refresh_on_unknown_kid: self.refresh_on_unknown_kid,
        }
    }
}

/// A JWK set published by a remote issuer, fetched on first use and cached afterwards.
#[derive(Clone)]
pub struct RemoteJwkSet {
    cache: KeySetCache,
    refresh_on_unknown_kid: bool,
}

impl RemoteJwkSet {
    /// Creates a builder for configuring a `RemoteJwkSet`.
    pub fn builder(url: Url) -> RemoteJwkSetBuilder {
        RemoteJwkSetBuilder::new(url)
    }

    /// Wraps an existing cache, e.g. one fed by a custom fetch service.
    pub fn from_cache(cache: KeySetCache) -> Self {
        Self {
            cache,
            refresh_on_unknown_kid: false,
        }
    }

    pub async fn jwk_set(&self) -> Result<KeySet, Error> {
        self.cache.get().await
    }

    /// Drops the cached JWK set so that the next lookup fetches it again.
    pub async fn invalidate(&self) {
        self.cache.invalidate().await;
    }

    pub async fn find(&self, kid: &str) -> Result<Option<Jwk>, Error> {
        let key_set = self.cache.get().await?;
        if let Some(jwk) = key_set.find(kid) {
            return Ok(Some(jwk.clone()));
        }
        if !self.refresh_on_unknown_kid {
            return Ok(None);
        }

        debug!(kid, "kid not in cached JWK set, refreshing");
        let key_set = self.cache.refresh(&key_set).await?;
        Ok(key_set.find(kid).cloned())
    }
}

/// Helper service wrapping a `reqwest::Client` to fetch a JWK Set from a given URL.
#[derive(Clone)]
pub struct JwkSetRequestService {
    http_client: Client,
    url: Url,
    timeout: Duration,
}

impl JwkSetRequestService {
    pub fn new(http_client: Client, url: Url, timeout: Duration) -> Self {
        Self {
            http_client,
            url,
            timeout,
        }
    }
}

impl Service<()> for JwkSetRequestService {
    type Response = JwkSet;
    type Error = KeyRetrievalError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: ()) -> Self::Future {
        let http_client = self.http_client.clone();
        let url = self.url.clone();
        let timeout = self.timeout;
        Box::pin(async move {
            debug!(%url, "fetching JWK set");
            tokio::time::timeout(timeout, fetch_jwk_set(http_client, url))
                .await
                .map_err(|_| KeyRetrievalError::Timeout { after: timeout })?
        })
    }
}

async fn fetch_jwk_set(http_client: Client, url: Url) -> Result<JwkSet, KeyRetrievalError> {
    let response = http_client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(KeyRetrievalError::ErrorResponse {
            status_code: response.status(),
        });
    }

    let body = response.bytes().await?;
    let jwk_set: JwkSet = serde_json::from_slice(&body)?;
    Ok(jwk_set)
}
