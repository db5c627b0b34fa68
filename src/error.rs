use std::{sync::Arc, time::Duration};

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::typed_header::TypedHeaderRejection;
use http::StatusCode;
use serde_json::json;

/// Reasons a validation call can fail.
///
/// Every variant is terminal for the call that produced it. The top-level messages are deliberately generic since they
/// end up in `401` response bodies; the structured detail lives in the nested error and its source chain.
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("malformed token")]
    MalformedToken(#[from] MalformedTokenError),
    #[error("failed to retrieve JWK set")]
    KeyRetrieval(#[source] Arc<KeyRetrievalError>),
    #[error("no JWK found for kid {kid:?}")]
    KeyNotFound { kid: String },
    #[error("failed to decode JWK into key")]
    KeyFormat(#[from] KeyFormatError),
    #[error("JWT validation failed")]
    TokenVerification(#[from] VerificationError),
    #[error(transparent)]
    InvalidAuthorizationHeader(#[from] TypedHeaderRejection),
    #[error("request has not been authenticated")]
    MissingIdentity,
}

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum MalformedTokenError {
    #[error("token header could not be decoded")]
    Header(#[source] jsonwebtoken::errors::Error),
    #[error("missing kid in token header")]
    MissingKid,
    #[error("token claims could not be decoded")]
    Claims(#[source] jsonwebtoken::errors::Error),
    #[error("token is missing the required `{0}` claim")]
    MissingClaim(String),
}

/// Failures while fetching the JWK set. Shared behind an `Arc` so that every caller waiting on the same fetch observes
/// the same error.
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum KeyRetrievalError {
    #[error("failed to fetch JWK set")]
    Request(#[from] reqwest::Error),
    #[error("received error response when fetching JWK set: {status_code}")]
    ErrorResponse { status_code: StatusCode },
    #[error("response body is not a JWK set")]
    InvalidBody(#[from] serde_json::Error),
    #[error("JWK set contains kid {kid:?} more than once")]
    DuplicateKid { kid: String },
    #[error("fetching JWK set timed out after {after:?}")]
    Timeout { after: Duration },
}

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum KeyFormatError {
    #[error("JWK {kid:?} is not an RSA key")]
    UnsupportedKeyType { kid: Option<String> },
    #[error("JWK {kid:?} is not an RS256 key")]
    UnsupportedAlgorithm { kid: Option<String> },
    #[error("JWK component `{component}` is not valid base64url")]
    Encoding {
        component: &'static str,
        #[source]
        source: base64::DecodeError,
    },
    #[error("JWK component `{component}` is empty")]
    EmptyComponent { component: &'static str },
    #[error("RSA modulus of {bits} bits is below the accepted minimum")]
    ModulusTooSmall { bits: usize },
    #[error("RSA components were rejected")]
    Rejected(#[source] rsa::Error),
    #[error("RSA public key could not be encoded")]
    Encode(#[source] rsa::pkcs8::spki::Error),
    #[error("RSA public key could not be loaded for verification")]
    Decoding(#[source] jsonwebtoken::errors::Error),
}

#[non_exhaustive]
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("invalid signature")]
    Signature,
    #[error("token audience does not contain the expected audience")]
    Audience,
    #[error("token issuer does not match the expected issuer")]
    Issuer,
    #[error("token expired at {expired_at}")]
    Expired { expired_at: u64 },
    #[error("token is not valid before {not_before}")]
    NotYetValid { not_before: u64 },
    #[error("token algorithm is not accepted")]
    Algorithm,
}

impl From<Arc<KeyRetrievalError>> for Error {
    fn from(err: Arc<KeyRetrievalError>) -> Self {
        Error::KeyRetrieval(err)
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    /// Sorts failures of `jsonwebtoken::decode` into the verification and malformed-token taxonomy.
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        let classified: Option<Error> = match err.kind() {
            ErrorKind::InvalidSignature | ErrorKind::Crypto(_) => {
                Some(VerificationError::Signature.into())
            }
            ErrorKind::InvalidAudience => Some(VerificationError::Audience.into()),
            ErrorKind::InvalidIssuer => Some(VerificationError::Issuer.into()),
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                Some(VerificationError::Algorithm.into())
            }
            ErrorKind::MissingRequiredClaim(claim) => {
                Some(MalformedTokenError::MissingClaim(claim.clone()).into())
            }
            _ => None,
        };
        classified.unwrap_or_else(|| MalformedTokenError::Claims(err).into())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.to_string(),
        }));
        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

#[cfg(test)]
mod test {
    use std::error::Error as _;

    use jsonwebtoken::errors::ErrorKind;

    use super::*;

    #[test]
    fn test_jsonwebtoken_errors_are_classified() {
        let err: Error = jsonwebtoken::errors::Error::from(ErrorKind::InvalidSignature).into();
        assert!(matches!(
            err,
            Error::TokenVerification(VerificationError::Signature)
        ));

        let err: Error = jsonwebtoken::errors::Error::from(ErrorKind::InvalidAudience).into();
        assert!(matches!(
            err,
            Error::TokenVerification(VerificationError::Audience)
        ));

        let err: Error = jsonwebtoken::errors::Error::from(ErrorKind::InvalidIssuer).into();
        assert!(matches!(err, Error::TokenVerification(VerificationError::Issuer)));

        let err: Error =
            jsonwebtoken::errors::Error::from(ErrorKind::MissingRequiredClaim("exp".into())).into();
        assert!(matches!(
            err,
            Error::MalformedToken(MalformedTokenError::MissingClaim(ref claim)) if claim == "exp"
        ));

        let err: Error = jsonwebtoken::errors::Error::from(ErrorKind::InvalidToken).into();
        assert!(matches!(
            err,
            Error::MalformedToken(MalformedTokenError::Claims(_))
        ));
    }

    #[test]
    fn test_retrieval_error_keeps_source_chain() {
        let err = Error::from(Arc::new(KeyRetrievalError::ErrorResponse {
            status_code: StatusCode::SERVICE_UNAVAILABLE,
        }));
        assert_eq!(err.to_string(), "failed to retrieve JWK set");
        assert_eq!(
            err.source().expect("source").to_string(),
            "received error response when fetching JWK set: 503 Service Unavailable"
        );
    }

    #[tokio::test]
    async fn test_error_response_hides_detail() {
        let response = Error::KeyNotFound {
            kid: "xyz".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = Error::TokenVerification(VerificationError::Expired { expired_at: 42 })
            .into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&body).unwrap(),
            json!({"error": "JWT validation failed"})
        );
    }
}
