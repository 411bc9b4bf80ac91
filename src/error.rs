use thiserror::Error;

/// Errors surfaced by the witnessing core: chain verification, session
/// lifecycle, temporal anchoring, beacon binding, and anti-replay challenges.
#[derive(Debug, Error)]
pub enum WitnessError {
    #[error("verification of a zero-sample chain")]
    EmptyChain,

    #[error("cryptographic verification requires a seed")]
    NilSeed,

    #[error("sample {index}: hash mismatch")]
    HashMismatch { index: usize },

    #[error("sample {index}: previous-hash does not match prior sample's hash")]
    ChainLinkBroken { index: usize },

    #[error("first sample's previous-hash is non-zero")]
    FirstSampleInvalid,

    #[error("sample {index}: timestamp not monotonically increasing")]
    TimestampNotMonotonic { index: usize },

    #[error("sample {index}: duplicate timestamp")]
    DuplicateTimestamp { index: usize },

    #[error("sample {index}: keystroke count not monotonically increasing")]
    KeystrokeCountNotMonotonic { index: usize },

    #[error("sample {index}: jitter mismatch (expected {expected}, got {actual})")]
    JitterMismatch {
        index: usize,
        expected: u32,
        actual: u32,
    },

    #[error("challenge {id} expired at {expires_at}")]
    ChallengeExpired { id: String, expires_at: String },

    #[error("challenge {id} is invalid: {reason}")]
    ChallengeInvalid { id: String, reason: String },

    #[error("challenge response for {id} failed HMAC verification")]
    ChallengeTampered { id: String },

    #[error("VDF proof failed self-verification")]
    VdfProofInvalid,

    #[error("VDF chain: proof {index} does not link to the previous proof's output")]
    VdfChainBroken { index: usize },

    #[error("beacon unavailable: {0}")]
    BeaconUnavailable(String),

    #[error("beacon signature verification failed")]
    BeaconSignatureInvalid,

    #[error("session {id} is already running")]
    SessionAlreadyRunning { id: String },

    #[error("session {id} not found")]
    SessionNotFound { id: String },

    #[error("document {path} already has an active session")]
    DuplicateDocument { path: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, WitnessError>;
