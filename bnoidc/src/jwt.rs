//! ID-token verification against the provider's signing keys

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A single JWK as published by the provider. Only RSA signing keys are used.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
}

/// JWKS document envelope
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// A public key usable for RS256 signature checks
pub struct SigningKey {
    pub kid: Option<String>,
    key: DecodingKey,
}

impl SigningKey {
    fn from_jwk(jwk: &Jwk) -> Option<Self> {
        if jwk.kty != "RSA" || jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
            return None;
        }
        if jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
            return None;
        }
        let (n, e) = (jwk.n.as_deref()?, jwk.e.as_deref()?);
        match DecodingKey::from_rsa_components(n, e) {
            Ok(key) => Some(Self {
                kid: jwk.kid.clone(),
                key,
            }),
            Err(e) => {
                tracing::warn!("skipping unusable JWK {:?}: {e}", jwk.kid);
                None
            }
        }
    }
}

/// Ordered set of signing keys, read-only once loaded
#[derive(Default)]
pub struct SigningKeySet {
    keys: Vec<SigningKey>,
}

impl std::fmt::Debug for SigningKeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.keys.iter().map(|k| k.kid.as_deref().unwrap_or("(no kid)")))
            .finish()
    }
}

impl SigningKeySet {
    /// Keep the RSA signature keys of `jwks`, in document order
    pub fn from_jwks(jwks: &JwkSet) -> Self {
        Self {
            keys: jwks.keys.iter().filter_map(SigningKey::from_jwk).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Expected issuer and audience of an ID token
#[derive(Debug, Clone, Copy)]
pub struct VerifyOptions<'a> {
    pub issuer: &'a str,
    pub audience: &'a str,
}

/// Audience can be either a string or an array of strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

/// Claims carried by an ID token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Entitlements granted to the user; absent or null means none
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ent: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Claims without a dedicated field
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Claims that passed signature, issuer and audience verification.
///
/// Only this module (and the trusted-header path of the gate) can construct
/// one, so holding a `VerifiedClaims` is proof the token was checked.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedClaims(IdTokenClaims);

impl VerifiedClaims {
    pub(crate) fn trusted(claims: IdTokenClaims) -> Self {
        Self(claims)
    }

    pub fn into_inner(self) -> IdTokenClaims {
        self.0
    }
}

impl std::ops::Deref for VerifiedClaims {
    type Target = IdTokenClaims;

    fn deref(&self) -> &IdTokenClaims {
        &self.0
    }
}

fn validation(opts: VerifyOptions<'_>) -> Validation {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_issuer(&[opts.issuer]);
    validation.set_audience(&[opts.audience]);
    validation.leeway = 0;
    validation
}

/// Decode `token` with the first key that validates it
fn verified<T: DeserializeOwned>(
    token: &str,
    keys: &SigningKeySet,
    opts: VerifyOptions<'_>,
) -> Option<T> {
    let validation = validation(opts);
    keys.keys
        .iter()
        .find_map(|key| decode::<T>(token, &key.key, &validation).ok())
        .map(|data| data.claims)
}

/// Check the signature (RS256 only), issuer, audience and expiry of `token`
/// against every key in order. Individual key failures are not reported.
pub fn verify(token: &str, keys: &SigningKeySet, opts: VerifyOptions<'_>) -> bool {
    verified::<Value>(token, keys, opts).is_some()
}

/// Return the token's claims only if it verifies and carries a subject
pub fn decode_id_token(
    token: &str,
    keys: &SigningKeySet,
    opts: VerifyOptions<'_>,
) -> Option<VerifiedClaims> {
    let claims = verified::<Value>(token, keys, opts)?;
    serde_json::from_value::<IdTokenClaims>(claims)
        .inspect_err(|e| tracing::debug!("verified ID token has unusable claims: {e}"))
        .ok()
        .map(VerifiedClaims)
}
