//! ID-token verification over signing key sets

mod test_utils;

use bnoidc::jwt::{JwkSet, SigningKeySet, VerifyOptions, decode_id_token, verify};
use serde_json::json;
use test_utils::*;

const ISSUER: &str = "https://oidc.test";

fn key_set(keys: &[&TestKeyPair]) -> SigningKeySet {
    let jwks: JwkSet = serde_json::from_value(jwks_document(keys)).expect("valid JWKS");
    SigningKeySet::from_jwks(&jwks)
}

fn options() -> VerifyOptions<'static> {
    VerifyOptions {
        issuer: ISSUER,
        audience: CLIENT_ID,
    }
}

fn claims(overrides: serde_json::Value) -> serde_json::Value {
    let now = chrono::Utc::now().timestamp();
    let mut claims = json!({
        "iss": ISSUER,
        "aud": CLIENT_ID,
        "sub": "user-1",
        "email": "user-1@example.com",
        "ent": ["ent1"],
        "iat": now,
        "exp": now + 3600,
    });
    for (key, value) in overrides.as_object().expect("object").iter() {
        claims[key] = value.clone();
    }
    claims
}

#[test]
fn test_valid_token() {
    let keys = key_set(&[&*PROVIDER_KEYS]);
    let token = PROVIDER_KEYS.sign(&claims(json!({})));

    assert!(verify(&token, &keys, options()));
    let verified = decode_id_token(&token, &keys, options()).expect("claims");
    assert_eq!(verified.sub, "user-1");
    assert_eq!(verified.email.as_deref(), Some("user-1@example.com"));
    assert_eq!(verified.ent, vec!["ent1"]);
}

#[test]
fn test_any_matching_key_is_enough() {
    let keys = key_set(&[&*ROGUE_KEYS, &*PROVIDER_KEYS]);
    assert_eq!(keys.len(), 2);
    let token = PROVIDER_KEYS.sign(&claims(json!({})));
    assert!(verify(&token, &keys, options()));
}

#[test]
fn test_no_matching_key() {
    let token = PROVIDER_KEYS.sign(&claims(json!({})));
    assert!(!verify(&token, &key_set(&[&*ROGUE_KEYS]), options()));
    assert!(!verify(&token, &SigningKeySet::default(), options()));
    assert!(decode_id_token(&token, &key_set(&[&*ROGUE_KEYS]), options()).is_none());
}

#[test]
fn test_wrong_issuer() {
    let keys = key_set(&[&*PROVIDER_KEYS]);
    let token = PROVIDER_KEYS.sign(&claims(json!({"iss": "https://evil.test"})));
    assert!(!verify(&token, &keys, options()));
}

#[test]
fn test_wrong_audience() {
    let keys = key_set(&[&*PROVIDER_KEYS]);
    let token = PROVIDER_KEYS.sign(&claims(json!({"aud": "another-client"})));
    assert!(!verify(&token, &keys, options()));

    let token = PROVIDER_KEYS.sign(&claims(json!({"aud": ["another-client", CLIENT_ID]})));
    assert!(verify(&token, &keys, options()));
}

#[test]
fn test_expired_token() {
    let keys = key_set(&[&*PROVIDER_KEYS]);
    let now = chrono::Utc::now().timestamp();
    let token = PROVIDER_KEYS.sign(&claims(json!({"iat": now - 7200, "exp": now - 60})));
    assert!(!verify(&token, &keys, options()));
}

#[test]
fn test_garbage_token() {
    let keys = key_set(&[&*PROVIDER_KEYS]);
    assert!(!verify("not-a-jwt", &keys, options()));
    assert!(!verify("", &keys, options()));
}

#[test]
fn test_signature_valid_but_subject_missing() {
    let keys = key_set(&[&*PROVIDER_KEYS]);
    let mut payload = claims(json!({}));
    payload.as_object_mut().expect("object").remove("sub");
    let token = PROVIDER_KEYS.sign(&payload);

    assert!(verify(&token, &keys, options()));
    assert!(decode_id_token(&token, &keys, options()).is_none());
}

#[test]
fn test_null_entitlements_decode_as_empty() {
    let keys = key_set(&[&*PROVIDER_KEYS]);
    let token = PROVIDER_KEYS.sign(&claims(json!({"ent": null})));

    assert!(verify(&token, &keys, options()));
    let verified = decode_id_token(&token, &keys, options()).expect("claims");
    assert_eq!(verified.sub, "user-1");
    assert!(verified.ent.is_empty());
}
