//! Signing of issued tokens.
//!
//! A single static ES256 key is used for the lifetime of a process.
//! [`SignerProvider`] imports the key on first use and keeps it; there is no
//! rotation nor revocation.

use base64::{
    Engine as _,
    engine::general_purpose::{URL_SAFE_NO_PAD as base64url},
};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use ring::{
    rand::SystemRandom,
    signature::{EcdsaKeyPair, KeyPair as _, ECDSA_P256_SHA256_FIXED_SIGNING},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::error::Error;
use crate::jwt::ALGORITHM;
use crate::parameters::load_signing_jwk;

// PKCS #8 v1 framing of a P-256 private key with its public point.
const PKCS8_PREFIX: &[u8] = &[
    0x30, 0x81, 0x87, 0x02, 0x01, 0x00, 0x30, 0x13, 0x06, 0x07, 0x2a, 0x86,
    0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d,
    0x03, 0x01, 0x07, 0x04, 0x6d, 0x30, 0x6b, 0x02, 0x01, 0x01, 0x04, 0x20,
];
const PKCS8_PUBLIC_KEY_TAG: &[u8] = &[0xa1, 0x44, 0x03, 0x42, 0x00];

/// Key ID used when the JWK does not carry one.
pub const DEFAULT_KEY_ID: &str = "B-QMUxdJOJ8ubkmArc4i1SGmfZnNNlM-va9h0HJ0jCo";

/// Private EC JWK.
#[derive(Clone, Deserialize)]
pub struct Jwk {
    /// Key type. Must be `"EC"`.
    pub kty: String,
    /// Curve. Must be `"P-256"`.
    pub crv: String,
    /// X coordinate of the public point.
    pub x: String,
    /// Y coordinate of the public point.
    pub y: String,
    /// Private scalar.
    pub d: Option<String>,
    /// Key ID.
    pub kid: Option<String>,
}

impl Jwk {
    /// Parses a JWK.
    ///
    /// The JWK may also be a JSON string that encodes the JWK.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(text)
            .or(Err(Error::KeyUnavailable("JWK is not JSON".into())))?;
        let value = match value {
            Value::String(inner) => serde_json::from_str(&inner)
                .or(Err(Error::KeyUnavailable("JWK is not JSON".into())))?,
            value => value,
        };
        serde_json::from_value(value)
            .map_err(|e| Error::KeyUnavailable(format!("malformed JWK: {e}")))
    }
}

impl std::fmt::Debug for Jwk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Jwk")
            .field("kty", &self.kty)
            .field("crv", &self.crv)
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

/// Public JWK published in the JWKS.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PublicJwk {
    /// Key type.
    pub kty: String,
    /// Intended use.
    #[serde(rename = "use")]
    pub use_: String,
    /// Curve.
    pub crv: String,
    /// Key ID.
    pub kid: String,
    /// X coordinate.
    pub x: String,
    /// Y coordinate.
    pub y: String,
    /// Algorithm.
    pub alg: String,
}

/// JSON Web Key Set.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct JwkSet {
    /// Keys.
    pub keys: Vec<PublicJwk>,
}

/// Imported signing key.
pub struct SigningKey {
    kid: String,
    encoding_key: EncodingKey,
    public_key: Vec<u8>,
}

impl SigningKey {
    /// Imports a private JWK.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, Error> {
        if jwk.kty != "EC" || jwk.crv != "P-256" {
            return Err(Error::KeyUnavailable(format!(
                "unsupported key type: {} {}",
                jwk.kty,
                jwk.crv,
            )));
        }
        let d = jwk.d.as_deref()
            .ok_or_else(|| Error::KeyUnavailable("JWK has no private part".into()))?;
        let d = decode_coordinate(d, "d")?;
        let mut public_key = vec![0x04];
        public_key.extend(decode_coordinate(&jwk.x, "x")?);
        public_key.extend(decode_coordinate(&jwk.y, "y")?);
        let pkcs8 = [PKCS8_PREFIX, d.as_slice(), PKCS8_PUBLIC_KEY_TAG, public_key.as_slice()].concat();
        // rejects a public point that does not match `d`
        let key_pair = EcdsaKeyPair::from_pkcs8(
            &ECDSA_P256_SHA256_FIXED_SIGNING,
            &pkcs8,
            &SystemRandom::new(),
        ).map_err(|e| Error::KeyUnavailable(format!("key rejected: {e}")))?;
        Ok(Self {
            kid: jwk.kid.clone().unwrap_or_else(|| DEFAULT_KEY_ID.to_string()),
            encoding_key: EncodingKey::from_ec_der(&pkcs8),
            public_key: key_pair.public_key().as_ref().to_vec(),
        })
    }

    /// Signs claims and returns a compact JWS.
    ///
    /// The header is `{"alg":"ES256","kid":<kid>}`.
    pub fn sign<C: Serialize>(&self, claims: &C) -> Result<String, Error> {
        let header = Header {
            typ: None,
            kid: Some(self.kid.clone()),
            ..Header::new(Algorithm::ES256)
        };
        Ok(encode(&header, claims, &self.encoding_key)?)
    }

    /// Uncompressed public point.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Public half as a JWK.
    pub fn public_jwk(&self) -> PublicJwk {
        // skips the leading 0x04
        let (x, y) = self.public_key()[1..].split_at(32);
        PublicJwk {
            kty: "EC".into(),
            use_: "sig".into(),
            crv: "P-256".into(),
            kid: self.kid.clone(),
            x: base64url.encode(x),
            y: base64url.encode(y),
            alg: ALGORITHM.into(),
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

fn decode_coordinate(value: &str, name: &str) -> Result<Vec<u8>, Error> {
    let bytes = base64url.decode(value.trim_end_matches('='))
        .map_err(|_| Error::KeyUnavailable(format!("JWK {name} is not base64url")))?;
    if bytes.len() != 32 {
        return Err(Error::KeyUnavailable(format!("JWK {name} must be 32 bytes")));
    }
    Ok(bytes)
}

/// Where the private JWK comes from.
#[derive(Clone, Debug)]
pub enum SigningKeySource {
    /// SecureString parameter in Parameter Store on AWS Systems Manager.
    Parameter {
        /// Client.
        ssm: aws_sdk_ssm::Client,
        /// Parameter path.
        name: String,
    },
    /// JWK given as is.
    Inline(String),
}

impl SigningKeySource {
    /// Determines the source from the environment.
    ///
    /// Exactly one of `SIGNING_KEY_PARAMETER_PATH` and `JWK_KEY_SECRET` must
    /// be set.
    pub fn from_env(config: &aws_config::SdkConfig) -> Result<Self, Error> {
        Self::from_vars(
            config,
            env::var("SIGNING_KEY_PARAMETER_PATH").ok(),
            env::var("JWK_KEY_SECRET").ok(),
        )
    }

    fn from_vars(
        config: &aws_config::SdkConfig,
        parameter_path: Option<String>,
        jwk: Option<String>,
    ) -> Result<Self, Error> {
        match (parameter_path, jwk) {
            (Some(name), None) => Ok(Self::Parameter {
                ssm: aws_sdk_ssm::Client::new(config),
                name,
            }),
            (None, Some(jwk)) => Ok(Self::Inline(jwk)),
            (Some(_), Some(_)) => Err(Error::ConflictingParameters(
                "SIGNING_KEY_PARAMETER_PATH",
                "JWK_KEY_SECRET",
            )),
            (None, None) => Err(Error::ParameterNotFound(
                "SIGNING_KEY_PARAMETER_PATH or JWK_KEY_SECRET",
            )),
        }
    }

    async fn load(&self) -> Result<String, Error> {
        match self {
            Self::Parameter { ssm, name } => load_signing_jwk(ssm, name).await,
            Self::Inline(jwk) => Ok(jwk.clone()),
        }
    }
}

/// Lazily imported signing key shared by all the invocations of a process.
#[derive(Debug)]
pub struct SignerProvider {
    source: SigningKeySource,
    key: OnceCell<SigningKey>,
}

impl SignerProvider {
    /// Creates a provider that imports the key from a given source on first
    /// use.
    pub fn new(source: SigningKeySource) -> Self {
        Self {
            source,
            key: OnceCell::new(),
        }
    }

    /// Returns the signing key, importing it if necessary.
    ///
    /// A failed import is not cached; the next call tries again.
    pub async fn signing_key(&self) -> Result<&SigningKey, Error> {
        self.key.get_or_try_init(|| async {
            info!("importing signing key");
            let jwk = Jwk::parse(&self.source.load().await?)?;
            SigningKey::from_jwk(&jwk).map_err(|e| {
                error!("{e}");
                e
            })
        }).await
    }

    /// Signs claims with the signing key.
    pub async fn sign<C: Serialize>(&self, claims: &C) -> Result<String, Error> {
        self.signing_key().await?.sign(claims)
    }

    /// Returns the JWKS that verifies issued tokens.
    pub async fn jwks(&self) -> Result<JwkSet, Error> {
        Ok(JwkSet {
            keys: vec![self.signing_key().await?.public_jwk()],
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};

    pub(crate) const TEST_JWK: &str = r#"{"kty":"EC","d":"Ob4_qMu1nkkBLEw97u--PHVsShP3xOKOJ6z0WsdU0Xw","use":"sig","crv":"P-256","kid":"B-QMUxdJOJ8ubkmArc4i1SGmfZnNNlM-va9h0HJ0jCo","x":"YrTTzbuUwQhWyaj11w33k-K8bFydLfQssVqr8mx6AVE","y":"8UQcw-6Wp0bp8iIIkRw8PW2RSSjmj1I_8euyKEDtWRk","alg":"ES256"}"#;

    pub(crate) fn new_signer() -> SignerProvider {
        SignerProvider::new(SigningKeySource::Inline(TEST_JWK.into()))
    }

    #[tokio::test]
    async fn sign_should_produce_es256_token_verifiable_with_jwks() {
        let signer = new_signer();
        let token = signer.sign(&serde_json::json!({ "nonce": "N1" })).await.unwrap();
        let header = decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::ES256);
        assert_eq!(header.kid.as_deref(), Some(DEFAULT_KEY_ID));
        assert_eq!(header.typ, None);

        let jwks = signer.jwks().await.unwrap();
        let key = DecodingKey::from_ec_components(&jwks.keys[0].x, &jwks.keys[0].y).unwrap();
        let mut validation = Validation::new(Algorithm::ES256);
        validation.required_spec_claims.clear();
        let claims = decode::<Value>(&token, &key, &validation).unwrap().claims;
        assert_eq!(claims["nonce"], "N1");
    }

    #[tokio::test]
    async fn sign_should_not_verify_with_other_key() {
        let token = new_signer().sign(&serde_json::json!({ "nonce": "N1" })).await.unwrap();
        // public point of the ES256 key in RFC 7515 A.3
        let key = DecodingKey::from_ec_components(
            "f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU",
            "x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0",
        ).unwrap();
        let mut validation = Validation::new(Algorithm::ES256);
        validation.required_spec_claims.clear();
        assert!(decode::<Value>(&token, &key, &validation).is_err());
    }

    #[tokio::test]
    async fn jwks_should_publish_public_coordinates() {
        let jwks = new_signer().jwks().await.unwrap();
        assert_eq!(jwks.keys.len(), 1);
        let key = &jwks.keys[0];
        assert_eq!(key.kid, DEFAULT_KEY_ID);
        assert_eq!(key.x, "YrTTzbuUwQhWyaj11w33k-K8bFydLfQssVqr8mx6AVE");
        assert_eq!(key.y, "8UQcw-6Wp0bp8iIIkRw8PW2RSSjmj1I_8euyKEDtWRk");
        assert_eq!(key.alg, "ES256");
        assert_eq!(key.use_, "sig");
    }

    #[test]
    fn signing_key_source_should_require_exactly_one_variable() {
        let config = aws_config::SdkConfig::builder().build();
        assert!(matches!(
            SigningKeySource::from_vars(&config, None, Some(TEST_JWK.into())),
            Ok(SigningKeySource::Inline(jwk)) if jwk == TEST_JWK,
        ));
        assert!(matches!(
            SigningKeySource::from_vars(
                &config,
                Some("/oidc-stub/signing-key".into()),
                Some(TEST_JWK.into()),
            ),
            Err(Error::ConflictingParameters(..)),
        ));
        assert!(matches!(
            SigningKeySource::from_vars(&config, None, None),
            Err(Error::ParameterNotFound(_)),
        ));
    }

    #[tokio::test]
    async fn signing_key_should_accept_double_encoded_jwk() {
        let encoded = serde_json::to_string(TEST_JWK).unwrap();
        let signer = SignerProvider::new(SigningKeySource::Inline(encoded));
        assert!(signer.signing_key().await.is_ok());
    }

    #[tokio::test]
    async fn signing_key_should_be_imported_once() {
        let signer = new_signer();
        let first = signer.signing_key().await.unwrap() as *const SigningKey;
        let second = signer.signing_key().await.unwrap() as *const SigningKey;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn signing_key_should_fail_for_malformed_jwk() {
        let signer = SignerProvider::new(SigningKeySource::Inline("not json".into()));
        assert!(matches!(signer.signing_key().await, Err(Error::KeyUnavailable(_))));

        // public part only
        let signer = SignerProvider::new(SigningKeySource::Inline(
            r#"{"kty":"EC","crv":"P-256","x":"YrTTzbuUwQhWyaj11w33k-K8bFydLfQssVqr8mx6AVE","y":"8UQcw-6Wp0bp8iIIkRw8PW2RSSjmj1I_8euyKEDtWRk"}"#.into(),
        ));
        assert!(matches!(signer.signing_key().await, Err(Error::KeyUnavailable(_))));

        // RSA
        let signer = SignerProvider::new(SigningKeySource::Inline(
            r#"{"kty":"RSA","crv":"","x":"","y":"","d":""}"#.into(),
        ));
        assert!(matches!(signer.signing_key().await, Err(Error::KeyUnavailable(_))));
    }

    #[tokio::test]
    async fn signing_key_should_reject_mismatched_public_point() {
        // y of a different key
        let jwk = TEST_JWK.replace(
            "8UQcw-6Wp0bp8iIIkRw8PW2RSSjmj1I_8euyKEDtWRk",
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
        );
        let signer = SignerProvider::new(SigningKeySource::Inline(jwk));
        assert!(matches!(signer.signing_key().await, Err(Error::KeyUnavailable(_))));
    }
}
