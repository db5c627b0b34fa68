use jsonwebtoken::jwk::{Jwk, JwkSet};

use crate::{error::KeyRetrievalError, jwks_cache::KeySet, remote_jwk_set::RemoteJwkSet, Error};

/// Where a [`TokenValidator`](crate::TokenValidator) looks up verification keys.
#[derive(Clone)]
pub enum KeySource {
    /// A key set supplied up front, never refreshed.
    Static(KeySet),
    /// The issuer's published JWK set, fetched on first use.
    Remote(RemoteJwkSet),
}

impl KeySource {
    /// Uses `jwks` as a fixed key set. Fails like a fetch would if a `kid` occurs twice.
    pub fn from_jwks(jwks: JwkSet) -> Result<Self, KeyRetrievalError> {
        KeySet::new(jwks).map(KeySource::Static)
    }

    /// The key set currently in use.
    pub async fn key_set(&self) -> Result<KeySet, Error> {
        match self {
            KeySource::Static(key_set) => Ok(key_set.clone()),
            KeySource::Remote(remote_jwk_set) => remote_jwk_set.jwk_set().await,
        }
    }

    pub async fn find(&self, kid: &str) -> Result<Option<Jwk>, Error> {
        match self {
            KeySource::Static(key_set) => Ok(key_set.find(kid).cloned()),
            KeySource::Remote(remote_jwk_set) => remote_jwk_set.find(kid).await,
        }
    }
}

impl From<KeySet> for KeySource {
    fn from(key_set: KeySet) -> Self {
        KeySource::Static(key_set)
    }
}

impl From<RemoteJwkSet> for KeySource {
    fn from(remote_jwk_set: RemoteJwkSet) -> Self {
        KeySource::Remote(remote_jwk_set)
    }
}
