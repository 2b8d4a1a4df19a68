//! PKCE (RFC 7636) and nonce generation

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// A PKCE verifier/challenge pair for one authorization-code flow.
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

/// Generate a fresh verifier (64 random bytes, base64url: 86 characters,
/// within the RFC's 43..=128 range) and its S256 challenge.
pub fn generate_pair() -> PkcePair {
    let mut bytes = [0u8; 64];
    rand::thread_rng().fill_bytes(&mut bytes);
    let verifier = URL_SAFE_NO_PAD.encode(bytes);
    let challenge = challenge_for(&verifier);
    PkcePair {
        verifier,
        challenge,
    }
}

/// `BASE64URL(SHA-256(verifier))`, unpadded.
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// A random URL-safe token with `bytes` bytes of entropy. Used for OAuth
/// `state`, `nonce` and the loopback redirect path.
pub fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}
