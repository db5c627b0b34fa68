use serde::{Deserialize, Serialize};

/// The `aud` claim, which the JWT standard allows to be either a single string or an array of strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == audience,
            Audience::Multiple(auds) => auds.iter().any(|aud| aud == audience),
        }
    }
}

/// Claims of a verified bearer token.
///
/// Only the claims this crate relies on are decoded; anything else in the payload is ignored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Key identifier from the token header, not part of the payload.
    #[serde(skip)]
    pub kid: String,
    /// Empty when the payload has no `sub`; such tokens never pass validation.
    #[serde(default)]
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub aud: Audience,
    pub iss: String,
    #[serde(
        default,
        deserialize_with = "numeric_date::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub iat: Option<u64>,
    #[serde(
        default,
        deserialize_with = "numeric_date::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub nbf: Option<u64>,
    #[serde(deserialize_with = "numeric_date::deserialize")]
    pub exp: u64,
}

/// NumericDate claims in whole seconds. Fractional values are allowed in JWTs, the fraction is dropped.
mod numeric_date {
    use serde::{de::Error, Deserialize, Deserializer};
    use serde_json::Number;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        to_seconds(Number::deserialize(deserializer)?).map_err(D::Error::custom)
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<Number>::deserialize(deserializer)?
            .map(to_seconds)
            .transpose()
            .map_err(D::Error::custom)
    }

    fn to_seconds(number: Number) -> Result<u64, String> {
        if let Some(seconds) = number.as_u64() {
            return Ok(seconds);
        }
        match number.as_f64() {
            Some(seconds) if seconds.is_finite() && seconds >= 0.0 && seconds < u64::MAX as f64 => {
                Ok(seconds.trunc() as u64)
            }
            _ => Err(format!("{number} is not a valid NumericDate")),
        }
    }
}
