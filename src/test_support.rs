//! Key fixtures and a mock identity provider shared by the unit tests.

use std::time::{Duration, SystemTime};

use jsonwebtoken::{
    jwk::{AlgorithmParameters, CommonParameters, Jwk, JwkSet, KeyAlgorithm, RSAKeyParameters, RSAKeyType},
    Algorithm, EncodingKey, Header,
};
use tracing_subscriber::EnvFilter;
use url::Url;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

/// Modulus of a 1024-bit RSA key, too short to be accepted for verification.
pub const SMALL_KEY_MODULUS: &str = "6FEhhfzEgKuR26B6UKmwsa2ja8jZxNnvqCnad5Yvz6xMrkd0mbmYbZzqq33GSpqRfqFDXM-4bocg6c51dNZfpLITqfsbUpih-jc9v_uS5D-q5XqH1r2P5V_LJMJ9W8n_5dRxVa3nxrzkqAmym7BgaayLJOnPXLWo8K0cvEscke8";

pub const AUDIENCE: &str = "expected-aud";

#[derive(Clone, Copy, Debug)]
pub enum TestKey {
    A,
    B,
}

impl TestKey {
    pub fn private_key_pem(self) -> &'static str {
        match self {
            TestKey::A => include_str!("testdata/rsa_key_a.pem"),
            TestKey::B => include_str!("testdata/rsa_key_b.pem"),
        }
    }

    /// Unpadded base64url modulus of the key's public half.
    pub fn modulus(self) -> &'static str {
        match self {
            TestKey::A => "uKlJttD5Aq_Aus-9Wv-XY183Wzm605iAV8KEADdfmFkcRfRzh0mCv6-510vaCtLoksAHdVo8OlRjv1N9STYMFjcTKlWxmNKbVF9e-KpGxuJTlU-jySKIbZPZNqY9wUSoOhfPvYXB01MPWxEoBZpSjSreksTygM74Wz7Dr2OfcHu2NmFrB5brpBZbZEBuYRo_rCEOsCoqwEBIhaM32gJ-F7CRZjrhawQ2_EeUj8ywJOv-vZ8IMhNn5fqH99cOWog7Qnz_sq0etpBYrWjQuztgx87fxt6T-lQ1X1PZT3bxXHZ1xTW_MjSrqZxVhwsPfmbfBzqm4L8nl1zk_p6-tpZduw",
            TestKey::B => "mMfKm8eSE5WkHtKmSdMs3EpmfToIfaFeIpCjArz_YqFVa5RXU1zvLoStmmeyew7DWloRW-Mt3Y8YPCkgSkRYdWiXHleFJh651j5ficu6mOvIL3PTV2xePTovr4TcU9wEsGsE1q6enquJM-YhcIfe65zdgDURCEDQM6G_4WnQ_D8cYY1i6x39ImIYSHshE4vBsCdb0wJWCeBwKgab7NF9uIBYTmbc4TtgFdami3NUommJTFyZCgLTPA09ZpbigAN2qYsGgB_bz9DhkD3Vicej3L-syNJ-_kdUgImcgYqYIqc65IX_dvm6fSeM1XiMFquf4lcI358K5ssgNTO6A4oHNw",
        }
    }
}

pub fn rsa_jwk(kid: &str, key: TestKey) -> Jwk {
    Jwk {
        common: CommonParameters {
            key_algorithm: Some(KeyAlgorithm::RS256),
            key_id: Some(kid.to_string()),
            ..CommonParameters::default()
        },
        algorithm: AlgorithmParameters::RSA(RSAKeyParameters {
            key_type: RSAKeyType::RSA,
            n: key.modulus().to_string(),
            e: "AQAB".to_string(),
        }),
    }
}

pub fn sign_token(key: TestKey, kid: Option<&str>, claims: &serde_json::Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    jsonwebtoken::encode(
        &header,
        claims,
        &EncodingKey::from_rsa_pem(key.private_key_pem().as_bytes()).unwrap(),
    )
    .unwrap()
}

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Routes log output of the crate to the test harness, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A wiremock server publishing a JWK set with a single key (`kid` "abc", [`TestKey::A`]) at
/// `/.well-known/jwks.json`.
pub struct MockAuthServer {
    _inner_server: MockServer,
    issuer: Url,
}

impl MockAuthServer {
    pub async fn new() -> MockAuthServer {
        Self::with_jwk_set(JwkSet {
            keys: vec![rsa_jwk("abc", TestKey::A)],
        })
        .await
    }

    pub async fn with_jwk_set(jwks: JwkSet) -> MockAuthServer {
        let inner_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks))
            .mount(&inner_server)
            .await;

        Self::without_mocks(inner_server)
    }

    /// Wraps a server whose mocks the test mounts itself.
    pub fn without_mocks(inner_server: MockServer) -> MockAuthServer {
        init_tracing();
        let issuer = Url::parse(&format!("{}/", inner_server.uri())).unwrap();
        MockAuthServer {
            _inner_server: inner_server,
            issuer,
        }
    }

    pub fn issuer(&self) -> &str {
        self.issuer.as_str()
    }

    pub fn jwks_url(&self) -> Url {
        self.issuer.join(".well-known/jwks.json").unwrap()
    }

    /// A token for `sub` signed by `key` that expires in an hour.
    pub fn token(&self, key: TestKey, kid: &str, sub: &str) -> String {
        let issued_at = now();
        let expires_at = issued_at + Duration::from_secs(3600).as_secs();
        sign_token(
            key,
            Some(kid),
            &serde_json::json!({
                "sub": sub,
                "aud": AUDIENCE,
                "iss": self.issuer(),
                "iat": issued_at,
                "exp": expires_at,
            }),
        )
    }
}
