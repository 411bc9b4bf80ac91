//! Zone-committed jitter engine: turns keystroke events into a hash-linked
//! chain of samples, each binding a secret session seed to the evolving
//! document hash, a monotonic counter, a wall-clock timestamp, and the
//! keyboard zone transition and inter-key interval — without ever recording
//! which character was typed.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::zone::{self, ZoneTransition};

pub const MIN_JITTER: u32 = 500; // microseconds
pub const MAX_JITTER: u32 = 3000; // microseconds
pub const JITTER_RANGE: u32 = MAX_JITTER - MIN_JITTER;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Parameters {
    pub min_jitter_micros: u32,
    pub max_jitter_micros: u32,
    pub sample_interval: u64,
    pub inject_enabled: bool,
}

pub fn default_parameters() -> Parameters {
    Parameters {
        min_jitter_micros: MIN_JITTER,
        max_jitter_micros: MAX_JITTER,
        sample_interval: 50,
        inject_enabled: true,
    }
}

/// A single chain link. `sample_hash` commits ordinal, timestamp,
/// document hash, zone transition, interval bucket, and jitter; it does
/// not fold in `previous_hash` — the chain link is a separate invariant
/// checked independently by the verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub ordinal: u64,
    pub timestamp: DateTime<Utc>,
    pub keystroke_count: u64,
    pub document_hash: [u8; 32],
    pub zone_transition: u8,
    pub interval_bucket: u8,
    pub jitter_micros: u32,
    pub sample_hash: [u8; 32],
    pub previous_hash: [u8; 32],
}

impl Sample {
    pub fn compute_hash(&self) -> [u8; 32] {
        compute_sample_hash(
            self.ordinal,
            self.timestamp,
            self.document_hash,
            self.zone_transition,
            self.interval_bucket,
            self.jitter_micros,
        )
    }
}

pub fn compute_sample_hash(
    ordinal: u64,
    timestamp: DateTime<Utc>,
    document_hash: [u8; 32],
    zone_transition: u8,
    interval_bucket: u8,
    jitter_micros: u32,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(ordinal.to_be_bytes());
    hasher.update(timestamp.timestamp_nanos_opt().unwrap_or(0).to_be_bytes());
    hasher.update(document_hash);
    hasher.update([zone_transition, interval_bucket]);
    hasher.update(jitter_micros.to_be_bytes());
    hasher.finalize().into()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TypingProfile {
    pub same_finger_hist: [u32; 10],
    pub same_hand_hist: [u32; 10],
    pub alternating_hist: [u32; 10],
    pub hand_alternation: f32,
    pub total_transitions: u64,
    #[serde(skip)]
    alternating_count: u64,
}

impl TypingProfile {
    fn record(&mut self, transition: ZoneTransition, bucket: u8) {
        let bucket = (bucket as usize).min(9);
        if transition.is_same_finger() {
            self.same_finger_hist[bucket] += 1;
        } else if transition.is_same_hand() {
            self.same_hand_hist[bucket] += 1;
        } else {
            self.alternating_hist[bucket] += 1;
            self.alternating_count += 1;
        }
        self.total_transitions += 1;
        if self.total_transitions > 0 {
            self.hand_alternation = self.alternating_count as f32 / self.total_transitions as f32;
        }
    }
}

/// Consumes keystroke events and produces jitter samples. One engine per
/// [`crate::session::Session`]; the seed never leaves the engine.
pub struct JitterEngine {
    secret: [u8; 32],
    ordinal: u64,
    prev_jitter: u32,
    prev_sample_hash: [u8; 32],
    prev_zone: i32,
    prev_time: DateTime<Utc>,
    profile: TypingProfile,
}

impl JitterEngine {
    pub fn new(secret: [u8; 32]) -> Self {
        Self {
            secret,
            ordinal: 0,
            prev_jitter: 0,
            prev_sample_hash: [0u8; 32],
            prev_zone: -1,
            prev_time: Utc::now(),
            profile: TypingProfile::default(),
        }
    }

    /// Feeds one keystroke to the engine. `keystroke_count` is the caller's
    /// own monotonic counter (distinct from the engine's internal
    /// `ordinal`, which only advances on zone-qualifying keystrokes).
    /// Returns `(0, None)` for non-zone keys — they do not advance the
    /// chain.
    pub fn on_keystroke(
        &mut self,
        key_code: u16,
        document_hash: [u8; 32],
        keystroke_count: u64,
    ) -> (u32, Option<Sample>) {
        let now = Utc::now();
        let zone = zone::keycode_to_zone(key_code);
        if zone < 0 {
            return (0, None);
        }

        let mut zone_transition = zone::NO_TRANSITION;
        let mut interval_bucket = 0u8;

        if self.prev_zone >= 0 {
            zone_transition = zone::encode_transition(self.prev_zone, zone);
            let interval = now.signed_duration_since(self.prev_time);
            interval_bucket = zone::interval_to_bucket(
                interval.to_std().unwrap_or(Duration::from_secs(0)),
            );
            self.profile.record(
                ZoneTransition {
                    from: self.prev_zone,
                    to: zone,
                },
                interval_bucket,
            );
        }

        let jitter = self.compute_jitter(document_hash, zone_transition, interval_bucket, now);
        self.ordinal += 1;

        let mut sample = Sample {
            ordinal: self.ordinal,
            timestamp: now,
            keystroke_count,
            document_hash,
            zone_transition,
            interval_bucket,
            jitter_micros: jitter,
            sample_hash: [0u8; 32],
            previous_hash: self.prev_sample_hash,
        };
        sample.sample_hash = sample.compute_hash();

        self.prev_zone = zone;
        self.prev_time = now;
        self.prev_jitter = jitter;
        self.prev_sample_hash = sample.sample_hash;

        (jitter, Some(sample))
    }

    pub fn profile(&self) -> TypingProfile {
        self.profile.clone()
    }

    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    /// Restores engine state from a previously-recorded sample, so a
    /// session reloaded from disk continues the chain correctly instead
    /// of starting a fresh one at ordinal 0.
    pub fn adopt(&mut self, sample: &Sample) {
        if zone::is_valid_transition(sample.zone_transition) {
            let (from, to) = zone::decode_transition(sample.zone_transition);
            self.profile.record(
                ZoneTransition { from, to },
                sample.interval_bucket,
            );
            self.prev_zone = to;
        }
        self.ordinal = sample.ordinal;
        self.prev_time = sample.timestamp;
        self.prev_jitter = sample.jitter_micros;
        self.prev_sample_hash = sample.sample_hash;
    }

    fn compute_jitter(
        &self,
        document_hash: [u8; 32],
        zone_transition: u8,
        interval_bucket: u8,
        timestamp: DateTime<Utc>,
    ) -> u32 {
        compute_jitter_value(
            &self.secret,
            self.ordinal + 1,
            document_hash,
            timestamp,
            zone_transition,
            interval_bucket,
            self.prev_jitter,
        )
    }
}

/// The HMAC at the heart of the chain: `ordinal` foils reordering,
/// `document_hash` binds content evolution, `timestamp` foils
/// precomputation, `zone_transition`+`interval_bucket` commit the physical
/// typing pattern without content, `prev_jitter` chains samples.
pub fn compute_jitter_value(
    secret: &[u8; 32],
    ordinal: u64,
    document_hash: [u8; 32],
    timestamp: DateTime<Utc>,
    zone_transition: u8,
    interval_bucket: u8,
    prev_jitter: u32,
) -> u32 {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(&ordinal.to_be_bytes());
    mac.update(&document_hash);
    mac.update(&(timestamp.timestamp_nanos_opt().unwrap_or(0) as u64).to_be_bytes());
    mac.update(&[zone_transition]);
    mac.update(&[interval_bucket]);
    mac.update(&prev_jitter.to_be_bytes());
    let digest = mac.finalize().into_bytes();
    let raw = u32::from_be_bytes(digest[0..4].try_into().unwrap());
    MIN_JITTER + (raw % JITTER_RANGE)
}
