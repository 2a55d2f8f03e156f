//! Random values and PKCE derivation for the authorization-code flow

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

const STATE_BYTES: usize = 16;
const NONCE_BYTES: usize = 16;
const CODE_VERIFIER_BYTES: usize = 32;

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Generate a random `state` value (16 bytes, hex encoded)
pub fn generate_state() -> String {
    hex::encode(random_bytes::<STATE_BYTES>())
}

/// Generate a random `nonce` value (16 bytes, hex encoded)
pub fn generate_nonce() -> String {
    hex::encode(random_bytes::<NONCE_BYTES>())
}

/// Generate a PKCE code verifier (32 bytes, base64url encoded, 43 characters)
pub fn generate_code_verifier() -> String {
    URL_SAFE_NO_PAD.encode(random_bytes::<CODE_VERIFIER_BYTES>())
}

/// Derive the S256 code challenge: `BASE64URL(SHA256(verifier))`
pub fn generate_code_challenge(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}
