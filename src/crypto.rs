//! Shared cryptographic primitives: the HMAC type alias used throughout
//! the crate and a generic HKDF-expand helper for the per-purpose keys
//! DSSS tiers and anti-replay challenges derive from a session's master
//! key.

use hkdf::Hkdf;
use hmac::Hmac;
use sha2::{Digest, Sha256};

pub type HmacSha256 = Hmac<Sha256>;

/// `HKDF-Expand(master_key, info)` truncated to 32 bytes. Every derived
/// key in the crate (DSSS tier keys, the anti-replay response key) is an
/// instance of this with a different `info` tag.
pub fn hkdf_expand(master_key: &[u8], info: &[u8]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, master_key);
    let mut out = [0u8; 32];
    hk.expand(info, &mut out)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    out
}

pub fn derive_hmac_key(priv_key_seed: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(b"witnessd-hmac-key-v1");
    hasher.update(priv_key_seed);
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hkdf_expand_is_deterministic_and_tag_separated() {
        let key = [1u8; 32];
        let a = hkdf_expand(&key, b"tag-a");
        let b = hkdf_expand(&key, b"tag-b");
        let a_again = hkdf_expand(&key, b"tag-a");
        assert_eq!(a, a_again);
        assert_ne!(a, b);
    }
}
