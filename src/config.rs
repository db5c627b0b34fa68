//! Settings identifying the identity provider whose tokens are accepted.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::remote_jwk_set::DEFAULT_FETCH_TIMEOUT;

/// Path of the JWK set below the issuer domain.
pub const JWKS_PATH: &str = ".well-known/jwks.json";

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("environment variable `{name}` is not set")]
    MissingVariable {
        name: &'static str,
        #[source]
        source: std::env::VarError,
    },
    #[error("issuer domain {domain:?} does not form a valid URL")]
    InvalidIssuerDomain {
        domain: String,
        #[source]
        source: url::ParseError,
    },
}

/// Identity provider settings, read once when the validator is built.
///
/// ```
/// use jwks_auth::AuthConfig;
///
/// let config = AuthConfig::new("tenant.eu.auth0.com", "https://records.example.com", "https://tenant.eu.auth0.com/");
/// assert_eq!(
///     config.jwks_url()?.as_str(),
///     "https://tenant.eu.auth0.com/.well-known/jwks.json"
/// );
/// # Ok::<(), jwks_auth::ConfigError>(())
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Domain publishing the JWK set, e.g. `tenant.eu.auth0.com`.
    pub issuer_domain: String,

    /// Audience every accepted token must carry.
    pub audience: String,

    /// Exact `iss` claim every accepted token must carry.
    pub issuer: String,

    /// Upper bound for a single JWK set request.
    #[serde(with = "humantime_serde", default = "default_fetch_timeout")]
    pub fetch_timeout: Duration,

    /// Re-fetch the JWK set once when a token names an unknown `kid`.
    #[serde(default)]
    pub refresh_on_unknown_kid: bool,
}

fn default_fetch_timeout() -> Duration {
    DEFAULT_FETCH_TIMEOUT
}

impl AuthConfig {
    pub fn new(
        issuer_domain: impl Into<String>,
        audience: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            issuer_domain: issuer_domain.into(),
            audience: audience.into(),
            issuer: issuer.into(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            refresh_on_unknown_kid: false,
        }
    }

    /// Reads `AUTH0_DOMAIN`, `AUTH0_AUDIENCE` and `AUTH0_ISSUER`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(
            env_var("AUTH0_DOMAIN")?,
            env_var("AUTH0_AUDIENCE")?,
            env_var("AUTH0_ISSUER")?,
        ))
    }

    /// `https://{issuer_domain}/.well-known/jwks.json`
    pub fn jwks_url(&self) -> Result<Url, ConfigError> {
        let invalid = |source: url::ParseError| ConfigError::InvalidIssuerDomain {
            domain: self.issuer_domain.clone(),
            source,
        };

        let base = Url::parse(&format!("https://{}/", self.issuer_domain)).map_err(invalid)?;
        if base.path() != "/" || base.query().is_some() {
            return Err(invalid(url::ParseError::InvalidDomainCharacter));
        }
        base.join(JWKS_PATH).map_err(invalid)
    }
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|source| ConfigError::MissingVariable { name, source })
}
