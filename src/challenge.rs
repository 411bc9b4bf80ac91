//! Verifier-issued anti-replay challenges: a session folds the nonce
//! into its next VDF input and answers with an HMAC under a key the
//! verifier can independently derive.

use chrono::{DateTime, Utc};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Result, WitnessError};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub verifier_id: String,
    pub purpose: String,
    pub nonce: [u8; 32],
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Challenge {
    pub fn new(id: String, verifier_id: String, purpose: String, nonce: [u8; 32], ttl: chrono::Duration) -> Self {
        let issued_at = Utc::now();
        Self {
            id,
            verifier_id,
            purpose,
            nonce,
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    pub fn check_not_expired(&self) -> Result<()> {
        if Utc::now() > self.expires_at {
            return Err(WitnessError::ChallengeExpired {
                id: self.id.clone(),
                expires_at: self.expires_at.to_rfc3339(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub challenge_id: String,
    pub hmac: [u8; 32],
}

/// `session_response_key = HKDF(master_key, "anti-replay")`.
pub fn session_response_key(master_key: &[u8; 32]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, master_key);
    let mut out = [0u8; 32];
    hk.expand(b"anti-replay", &mut out)
        .expect("32 bytes is a valid HKDF output length");
    out
}

/// The value the session folds into its next VDF input: binds the
/// challenge to the current chain tip without revealing the chain tip
/// to the verifier ahead of time.
pub fn fold_into_vdf_input(chain_tip: [u8; 32], challenge: &Challenge) -> [u8; 32] {
    use sha2::Digest;
    let mut hasher = Sha256::new();
    hasher.update(chain_tip);
    hasher.update(challenge.nonce);
    hasher.finalize().into()
}

/// `HMAC(session_response_key, challenge.id ∥ nonce ∥ evidence_root)`.
pub fn respond(master_key: &[u8; 32], challenge: &Challenge, evidence_root: [u8; 32]) -> ChallengeResponse {
    let key = session_response_key(master_key);
    let mut mac = HmacSha256::new_from_slice(&key).expect("HMAC accepts any key length");
    mac.update(challenge.id.as_bytes());
    mac.update(&challenge.nonce);
    mac.update(&evidence_root);
    let hmac = mac.finalize().into_bytes();
    ChallengeResponse {
        challenge_id: challenge.id.clone(),
        hmac: hmac.into(),
    }
}

/// Verifies a response against an independently-derived key. A single-bit
/// tamper on `response.hmac` fails this check.
pub fn verify_response(master_key: &[u8; 32], challenge: &Challenge, evidence_root: [u8; 32], response: &ChallengeResponse) -> Result<()> {
    if response.challenge_id != challenge.id {
        return Err(WitnessError::ChallengeInvalid {
            id: challenge.id.clone(),
            reason: "challenge id mismatch".into(),
        });
    }
    challenge.check_not_expired()?;

    let expected = respond(master_key, challenge, evidence_root);
    use subtle::ConstantTimeEq;
    if expected.hmac.ct_eq(&response.hmac).unwrap_u8() != 1 {
        return Err(WitnessError::ChallengeTampered {
            id: challenge.id.clone(),
        });
    }
    Ok(())
}
