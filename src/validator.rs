use std::{sync::Arc, time::Duration};

use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use tracing::debug;

use crate::{
    claims::TokenClaims,
    config::{AuthConfig, ConfigError},
    error::{MalformedTokenError, VerificationError},
    identity::Identity,
    jwks_cache::DEFAULT_MIN_REFRESH_INTERVAL,
    key::VerificationKey,
    key_source::KeySource,
    remote_jwk_set::RemoteJwkSet,
    Error,
};

/// Tolerance added to a token's `exp` claim before it counts as expired (15 days).
///
/// Tokens are cached for long periods by clients of the record-keeping service, so expired tokens stay acceptable for
/// this long. The same tolerance applies to `nbf`. Tightening it is a deployment decision, see
/// [`TokenValidator::with_leeway`].
pub const EXPIRY_LEEWAY: Duration = Duration::from_secs(1_296_000);

/// Source of the current time for expiry checks.
pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        jsonwebtoken::get_current_timestamp()
    }
}

/// Validates RS256 bearer tokens against the issuer's JWK set.
///
/// Cloning is cheap; clones share the JWK set cache.
#[derive(Clone)]
pub struct TokenValidator {
    keys: KeySource,
    validation: Validation,
    leeway: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenValidator {
    pub fn new(keys: impl Into<KeySource>, issuer: &str, audience: &str) -> Self {
        let mut validation = Validation::new(Algorithm::RS256);
        // `exp` and `nbf` are checked in `check_time_claims`, against our own clock and leeway.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.set_audience(&[audience]);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        Self {
            keys: keys.into(),
            validation,
            leeway: EXPIRY_LEEWAY,
            clock: Arc::new(SystemClock),
        }
    }

    /// Builds a validator fetching keys from the issuer domain named in `config`.
    pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigError> {
        let mut remote_jwk_set =
            RemoteJwkSet::builder(config.jwks_url()?).with_fetch_timeout(config.fetch_timeout);
        if config.refresh_on_unknown_kid {
            remote_jwk_set = remote_jwk_set.with_refresh_on_unknown_kid(DEFAULT_MIN_REFRESH_INTERVAL);
        }

        Ok(Self::new(
            remote_jwk_set.build(),
            &config.issuer,
            &config.audience,
        ))
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Replaces [`EXPIRY_LEEWAY`].
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Verifies `token` and returns its claims.
    ///
    /// The `kid` from the unverified header selects the verification key. The signature, audience and issuer are
    /// checked by `jsonwebtoken`; `exp` and `nbf` are checked here with the configured leeway.
    pub async fn validate(&self, token: &str) -> Result<TokenClaims, Error> {
        // First, just decode the header part of the token, without validating the token, to get the kid.
        let header = decode_header(token).map_err(MalformedTokenError::Header)?;
        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or(MalformedTokenError::MissingKid)?;

        let Some(jwk) = self.keys.find(&kid).await? else {
            debug!(kid = %kid, "no JWK found for kid");
            return Err(Error::KeyNotFound { kid });
        };
        let key = VerificationKey::reconstruct(&jwk)?;

        let mut claims = decode::<TokenClaims>(token, key.decoding_key(), &self.validation)?.claims;
        if claims.sub.is_empty() {
            return Err(MalformedTokenError::MissingClaim("sub".to_string()).into());
        }
        self.check_time_claims(&claims)?;

        claims.kid = kid;
        Ok(claims)
    }

    /// Verifies `token` and returns the identity it was issued to.
    pub async fn authenticate(&self, token: &str) -> Result<Identity, Error> {
        self.validate(token).await.map(Identity::from_claims)
    }

    fn check_time_claims(&self, claims: &TokenClaims) -> Result<(), VerificationError> {
        let now = self.clock.now();
        let leeway = self.leeway.as_secs();

        if now > claims.exp.saturating_add(leeway) {
            return Err(VerificationError::Expired {
                expired_at: claims.exp,
            });
        }
        match claims.nbf {
            Some(not_before) if not_before > now.saturating_add(leeway) => {
                Err(VerificationError::NotYetValid { not_before })
            }
            _ => Ok(()),
        }
    }
}
