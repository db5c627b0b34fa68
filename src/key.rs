//! Reconstruction of RSA verification keys from JWK records.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE, Engine};
use jsonwebtoken::{
    jwk::{AlgorithmParameters, Jwk, KeyAlgorithm},
    DecodingKey,
};
use rsa::{
    pkcs8::{EncodePublicKey, LineEnding},
    BigUint, RsaPublicKey,
};

use crate::error::KeyFormatError;

/// Smallest RSA modulus accepted for signature verification.
pub const MIN_MODULUS_BITS: usize = 2048;

/// An RSA public key rebuilt from a JWK's `n` and `e` components.
///
/// Reconstruction is deterministic: the same components always yield the same PEM text and thus a key that verifies
/// exactly the same signatures.
#[derive(Clone)]
pub struct VerificationKey {
    kid: Option<String>,
    pem: String,
    decoding_key: DecodingKey,
}

impl VerificationKey {
    /// Rebuilds the public key described by `jwk`.
    ///
    /// Only RSA keys are accepted, and a key that declares an algorithm must declare RS256. Moduli shorter than
    /// [`MIN_MODULUS_BITS`] are refused rather than accepted as weaker keys.
    pub fn reconstruct(jwk: &Jwk) -> Result<Self, KeyFormatError> {
        let kid = jwk.common.key_id.clone();

        let AlgorithmParameters::RSA(ref rsa) = jwk.algorithm else {
            return Err(KeyFormatError::UnsupportedKeyType { kid });
        };
        if matches!(jwk.common.key_algorithm, Some(alg) if alg != KeyAlgorithm::RS256) {
            return Err(KeyFormatError::UnsupportedAlgorithm { kid });
        }

        let e = decode_component("e", &rsa.e)?;
        let n = decode_component("n", &rsa.n)?;

        let bits = n.bits();
        if bits < MIN_MODULUS_BITS {
            return Err(KeyFormatError::ModulusTooSmall { bits });
        }

        let public_key = RsaPublicKey::new(n, e).map_err(KeyFormatError::Rejected)?;
        let pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(KeyFormatError::Encode)?;
        let decoding_key =
            DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(KeyFormatError::Decoding)?;

        Ok(Self {
            kid,
            pem,
            decoding_key,
        })
    }

    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    /// The key as SubjectPublicKeyInfo PEM.
    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

/// Decodes an unpadded base64url JWK component into a big-endian unsigned integer.
fn decode_component(component: &'static str, value: &str) -> Result<BigUint, KeyFormatError> {
    let unpadded = value.trim_end_matches('=');
    if unpadded.is_empty() {
        return Err(KeyFormatError::EmptyComponent { component });
    }

    let mut padded = String::with_capacity(unpadded.len() + 3);
    padded.push_str(unpadded);
    padded.extend(std::iter::repeat('=').take((4 - unpadded.len() % 4) % 4));

    let bytes = URL_SAFE
        .decode(padded)
        .map_err(|source| KeyFormatError::Encoding { component, source })?;
    Ok(BigUint::from_bytes_be(&bytes))
}
