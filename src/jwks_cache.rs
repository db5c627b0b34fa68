use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

use jsonwebtoken::jwk::{Jwk, JwkSet};
use moka::future::Cache;
use tokio::sync::Mutex;
use tower::{util::BoxCloneSyncService, Service, ServiceExt};
use tracing::{debug, warn};

use crate::{error::KeyRetrievalError, Error};

const KEY_SET_ENTRY: &str = "jwk_set";

/// Default minimum age of a cached JWK set before an unknown `kid` may trigger a re-fetch.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Service fetching the issuer's current JWK set.
pub type FetchService = BoxCloneSyncService<(), JwkSet, KeyRetrievalError>;

/// Snapshot of the issuer's published keys, as returned by one fetch.
///
/// Key identifiers are unique within a snapshot. Cloning is cheap, all clones share the fetched document.
#[derive(Clone, Debug)]
pub struct KeySet {
    jwks: Arc<JwkSet>,
    fetched_at: Instant,
}

impl KeySet {
    pub fn new(jwks: JwkSet) -> Result<Self, KeyRetrievalError> {
        let mut seen = HashSet::new();
        for kid in jwks.keys.iter().filter_map(|jwk| jwk.common.key_id.as_deref()) {
            if !seen.insert(kid) {
                return Err(KeyRetrievalError::DuplicateKid {
                    kid: kid.to_string(),
                });
            }
        }

        Ok(Self {
            jwks: Arc::new(jwks),
            fetched_at: Instant::now(),
        })
    }

    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.jwks.find(kid)
    }

    pub fn keys(&self) -> &[Jwk] {
        &self.jwks.keys
    }

    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    /// Whether both values stem from the same fetch.
    pub fn same_snapshot(&self, other: &KeySet) -> bool {
        Arc::ptr_eq(&self.jwks, &other.jwks)
    }
}

/// Process-wide cache of the issuer's JWK set, populated lazily on first use.
///
/// Population is single-flight: concurrent callers racing on an empty cache share one in-flight fetch and all observe
/// its outcome. Failed fetches are not cached, so the next caller tries again. Without a time-to-live the key set is
/// kept until [`invalidate`](Self::invalidate) or [`refresh`](Self::refresh) replaces it.
///
/// Can safely be cloned and shared across threads since moka internally uses an Arc.
#[derive(Clone)]
pub struct KeySetCache {
    cache: Cache<&'static str, KeySet>,
    fetcher: FetchService,
    refresh_gate: Arc<Mutex<()>>,
    min_refresh_interval: Duration,
}

impl KeySetCache {
    pub fn new<S>(fetcher: S) -> Self
    where
        S: Service<(), Response = JwkSet, Error = KeyRetrievalError> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
    {
        Self {
            cache: build_cache(None),
            fetcher: BoxCloneSyncService::new(fetcher),
            refresh_gate: Arc::new(Mutex::new(())),
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
        }
    }

    /// Expires the cached key set after `time_to_live`, so it's re-fetched on the next lookup.
    pub fn with_time_to_live(mut self, time_to_live: Duration) -> Self {
        self.cache = build_cache(Some(time_to_live));
        self
    }

    /// Minimum age of the cached key set before [`refresh`](Self::refresh) fetches again.
    pub fn with_min_refresh_interval(mut self, min_refresh_interval: Duration) -> Self {
        self.min_refresh_interval = min_refresh_interval;
        self
    }

    /// Returns the cached key set, fetching it first if the cache is empty.
    pub async fn get(&self) -> Result<KeySet, Error> {
        let fetcher = self.fetcher.clone();
        self.cache
            .try_get_with(KEY_SET_ENTRY, fetch_key_set(fetcher))
            .await
            .map_err(Error::from)
    }

    /// Drops the cached key set.
    pub async fn invalidate(&self) {
        self.cache.invalidate(&KEY_SET_ENTRY).await;
    }

    /// Re-fetches the key set after a lookup in `stale` came up empty.
    ///
    /// Refreshes are serialized: a caller that finds the cache already replaced since `stale` was read gets the newer
    /// key set without fetching. A key set younger than the minimum refresh interval is returned as is.
    pub async fn refresh(&self, stale: &KeySet) -> Result<KeySet, Error> {
        let _guard = self.refresh_gate.lock().await;

        if let Some(current) = self.cache.get(&KEY_SET_ENTRY).await {
            if !current.same_snapshot(stale) {
                return Ok(current);
            }
            if current.fetched_at().elapsed() < self.min_refresh_interval {
                debug!("skipping JWK set refresh, cached set is too recent");
                return Ok(current);
            }
            self.cache.invalidate(&KEY_SET_ENTRY).await;
        }

        debug!("refreshing JWK set");
        self.get().await
    }
}

fn build_cache(time_to_live: Option<Duration>) -> Cache<&'static str, KeySet> {
    let builder = Cache::<&'static str, KeySet>::builder().max_capacity(1);
    match time_to_live {
        Some(time_to_live) => builder.time_to_live(time_to_live).build(),
        None => builder.build(),
    }
}

async fn fetch_key_set(mut fetcher: FetchService) -> Result<KeySet, KeyRetrievalError> {
    let jwks = match fetcher.ready().await?.call(()).await {
        Ok(jwks) => jwks,
        Err(err) => {
            warn!(error = %err, "failed to fetch JWK set");
            return Err(err);
        }
    };

    let key_set = KeySet::new(jwks)?;
    debug!(keys = key_set.keys().len(), "populated JWK set cache");
    Ok(key_set)
}
