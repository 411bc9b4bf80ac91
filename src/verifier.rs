//! Chain verifier: the two ways a sample chain can be checked. `verify_with_secret`
//! is a cryptographic proof available only to someone holding the session
//! seed; `verify_with_content` is a statistical check anyone can run against
//! the final document, with no secret required.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WitnessError};
use crate::jitter::{compute_jitter_value, Sample};
use crate::zone::{self, ZoneTransition};

const TRANSITION_DIVERGENCE_THRESHOLD: f64 = 0.3;
const HISTOGRAM_BINS: usize = 64;
const DOCUMENT_DEFAULT_BUCKET: u8 = 5;

/// Re-runs the HMAC computation over every sample. Any mismatch is
/// cryptographic proof the chain was not produced with `seed` (or was
/// tampered with after the fact).
pub fn verify_with_secret(samples: &[Sample], seed: &[u8; 32]) -> Result<()> {
    if samples.is_empty() {
        return Err(WitnessError::EmptyChain);
    }

    check_structural_integrity(samples)?;

    let mut prev_jitter = 0u32;
    for (index, sample) in samples.iter().enumerate() {
        let expected = compute_jitter_value(
            seed,
            sample.ordinal,
            sample.document_hash,
            sample.timestamp,
            sample.zone_transition,
            sample.interval_bucket,
            prev_jitter,
        );
        if expected != sample.jitter_micros {
            return Err(WitnessError::JitterMismatch {
                index,
                expected,
                actual: sample.jitter_micros,
            });
        }
        prev_jitter = sample.jitter_micros;
    }
    Ok(())
}

/// Checks hash linkage and monotonicity — the part of verification that
/// needs no secret at all.
fn check_structural_integrity(samples: &[Sample]) -> Result<()> {
    if samples.is_empty() {
        return Err(WitnessError::EmptyChain);
    }
    if samples[0].previous_hash != [0u8; 32] {
        return Err(WitnessError::FirstSampleInvalid);
    }

    for (index, sample) in samples.iter().enumerate() {
        if sample.compute_hash() != sample.sample_hash {
            return Err(WitnessError::HashMismatch { index });
        }
        if index > 0 {
            let prev = &samples[index - 1];
            if sample.previous_hash != prev.sample_hash {
                return Err(WitnessError::ChainLinkBroken { index });
            }
            if sample.timestamp < prev.timestamp {
                return Err(WitnessError::TimestampNotMonotonic { index });
            }
            if sample.timestamp == prev.timestamp {
                return Err(WitnessError::DuplicateTimestamp { index });
            }
            if sample.ordinal <= prev.ordinal {
                return Err(WitnessError::TimestampNotMonotonic { index });
            }
            if sample.keystroke_count <= prev.keystroke_count {
                return Err(WitnessError::KeystrokeCountNotMonotonic { index });
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CategoryHistograms {
    pub same_finger: [u32; 10],
    pub same_hand: [u32; 10],
    pub alternating: [u32; 10],
}

impl CategoryHistograms {
    fn record(&mut self, transition: ZoneTransition, bucket: u8) {
        let bucket = (bucket as usize).min(9);
        if transition.is_same_finger() {
            self.same_finger[bucket] += 1;
        } else if transition.is_same_hand() {
            self.same_hand[bucket] += 1;
        } else {
            self.alternating[bucket] += 1;
        }
    }

    fn totals(&self) -> (u64, u64, u64) {
        (
            self.same_finger.iter().map(|&v| v as u64).sum(),
            self.same_hand.iter().map(|&v| v as u64).sum(),
            self.alternating.iter().map(|&v| v as u64).sum(),
        )
    }
}

/// The observed or expected distribution of zone behavior: a 64-bin
/// transition histogram plus the three-class breakdown it folds into.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneProfile {
    pub transition_histogram: [u32; HISTOGRAM_BINS],
    pub categories: CategoryHistograms,
    pub hand_alternation: f64,
    pub same_finger_ratio: f64,
    pub total_transitions: u64,
}

impl ZoneProfile {
    fn finalize(&mut self) {
        let (sf, sh, alt) = self.categories.totals();
        self.total_transitions = sf + sh + alt;
        if self.total_transitions > 0 {
            self.hand_alternation = alt as f64 / self.total_transitions as f64;
            self.same_finger_ratio = sf as f64 / self.total_transitions as f64;
        }
    }
}

/// Builds the profile a faithful typist of `text` would have produced.
/// Timing bears no relation to content, so every synthesized transition
/// is assigned the default bucket.
pub fn analyze_document_zones(text: &str) -> ZoneProfile {
    let mut profile = ZoneProfile::default();
    for transition in zone::text_to_zone_sequence(text) {
        let encoded = zone::encode_transition(transition.from, transition.to);
        profile.transition_histogram[encoded as usize] += 1;
        profile.categories.record(transition, DOCUMENT_DEFAULT_BUCKET);
    }
    profile.finalize();
    profile
}

/// Builds the profile actually recorded in a sample chain.
pub fn analyze_recorded_zones(samples: &[Sample]) -> ZoneProfile {
    let mut profile = ZoneProfile::default();
    for sample in samples {
        if !zone::is_valid_transition(sample.zone_transition) {
            continue;
        }
        let (from, to) = zone::decode_transition(sample.zone_transition);
        profile.transition_histogram[sample.zone_transition as usize] += 1;
        profile
            .categories
            .record(ZoneTransition { from, to }, sample.interval_bucket);
    }
    profile.finalize();
    profile
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlausibilityFailure {
    HandAlternationOutOfRange,
    SameFingerRatioTooHigh,
    TooFewIntervalBucketsPopulated,
    SingleBucketDominates,
}

/// §4.3.1: a human-plausible recorded profile, checked only once there is
/// enough data to be meaningful.
pub fn check_plausibility(profile: &ZoneProfile) -> Vec<PlausibilityFailure> {
    let mut failures = Vec::new();
    if profile.total_transitions < 10 {
        return failures;
    }
    if !(0.15..=0.85).contains(&profile.hand_alternation) {
        failures.push(PlausibilityFailure::HandAlternationOutOfRange);
    }
    if profile.same_finger_ratio > 0.30 {
        failures.push(PlausibilityFailure::SameFingerRatioTooHigh);
    }
    if profile.total_transitions > 100 {
        let populated_buckets = bucket_totals(profile).iter().filter(|&&c| c > 0).count();
        if populated_buckets < 3 {
            failures.push(PlausibilityFailure::TooFewIntervalBucketsPopulated);
        }
    }
    if profile.total_transitions > 50 {
        let totals = bucket_totals(profile);
        let max = totals.iter().copied().max().unwrap_or(0);
        if max as f64 > 0.80 * profile.total_transitions as f64 {
            failures.push(PlausibilityFailure::SingleBucketDominates);
        }
    }
    failures
}

fn bucket_totals(profile: &ZoneProfile) -> [u64; 10] {
    let mut totals = [0u64; 10];
    for i in 0..10 {
        totals[i] = profile.categories.same_finger[i] as u64
            + profile.categories.same_hand[i] as u64
            + profile.categories.alternating[i] as u64;
    }
    totals
}

/// Normalizes a histogram into a probability distribution with Laplace
/// smoothing so zero-count bins never produce a zero probability.
fn smoothed_distribution(counts: &[u32], epsilon: f64) -> Vec<f64> {
    let total: f64 = counts.iter().map(|&c| c as f64).sum::<f64>() + epsilon * counts.len() as f64;
    counts
        .iter()
        .map(|&c| (c as f64 + epsilon) / total)
        .collect()
}

fn kl_divergence(p: &[f64], q: &[f64]) -> f64 {
    p.iter()
        .zip(q.iter())
        .map(|(&pi, &qi)| if pi <= 0.0 { 0.0 } else { pi * (pi / qi).ln() })
        .sum()
}

/// Jensen-Shannon divergence: symmetric, bounded in `[0, ln 2]`, defined
/// via the average distribution `m = (p+q)/2`.
pub fn jensen_shannon_divergence(p: &[f64], q: &[f64]) -> f64 {
    let m: Vec<f64> = p.iter().zip(q.iter()).map(|(&a, &b)| (a + b) / 2.0).collect();
    0.5 * kl_divergence(p, &m) + 0.5 * kl_divergence(q, &m)
}

fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|&x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|&x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentVerificationResult {
    pub valid: bool,
    pub structural_error: Option<String>,
    pub expected_profile: ZoneProfile,
    pub recorded_profile: ZoneProfile,
    pub transition_divergence: f64,
    pub category_divergence: f64,
    pub similarity: f64,
    pub plausibility_failures: Vec<PlausibilityFailure>,
    pub paste_burst_suspected: bool,
}

impl ContentVerificationResult {
    pub fn is_plausible(&self) -> bool {
        self.plausibility_failures.is_empty()
    }
}

/// Heuristic from §4.3.2: characters added per keystroke over a window
/// exceeding 2.0 suggests a paste, not typing. Reported, not gating.
fn paste_burst_suspected(samples: &[Sample], claimed_document_len: usize) -> bool {
    if samples.is_empty() {
        return false;
    }
    let keystrokes = samples.last().map(|s| s.keystroke_count).unwrap_or(0).max(1);
    claimed_document_len as f64 / keystrokes as f64 > 2.0
}

/// Content-aware statistical verification: requires the claimed final
/// document, never the secret. Detects replay across documents (each
/// sample's document-hash locks content state), one-handed fabrication,
/// and robotic timing, without being able to prove authorship the way
/// [`verify_with_secret`] can.
pub fn verify_with_content(
    samples: &[Sample],
    claimed_document_bytes: &[u8],
) -> ContentVerificationResult {
    let structural_error = check_structural_integrity(samples).err().map(|e| e.to_string());

    let claimed_text = String::from_utf8_lossy(claimed_document_bytes);
    let expected_profile = analyze_document_zones(&claimed_text);
    let recorded_profile = analyze_recorded_zones(samples);

    let expected_dist = smoothed_distribution(&expected_profile.transition_histogram, 0.001 / 64.0);
    let recorded_dist = smoothed_distribution(&recorded_profile.transition_histogram, 0.001 / 64.0);
    let transition_divergence = jensen_shannon_divergence(&recorded_dist, &expected_dist);

    let expected_categories = [
        expected_profile.categories.same_finger.iter().sum::<u32>(),
        expected_profile.categories.same_hand.iter().sum::<u32>(),
        expected_profile.categories.alternating.iter().sum::<u32>(),
    ];
    let recorded_categories = [
        recorded_profile.categories.same_finger.iter().sum::<u32>(),
        recorded_profile.categories.same_hand.iter().sum::<u32>(),
        recorded_profile.categories.alternating.iter().sum::<u32>(),
    ];
    let expected_cat_dist = smoothed_distribution(&expected_categories, 0.001);
    let recorded_cat_dist = smoothed_distribution(&recorded_categories, 0.001);
    let category_divergence = kl_divergence(&recorded_cat_dist, &expected_cat_dist);

    let sim_transition = cosine_similarity(&recorded_dist, &expected_dist);
    let sim_same_finger = cosine_similarity(
        &recorded_profile.categories.same_finger.map(|v| v as f64),
        &expected_profile.categories.same_finger.map(|v| v as f64),
    );
    let sim_same_hand = cosine_similarity(
        &recorded_profile.categories.same_hand.map(|v| v as f64),
        &expected_profile.categories.same_hand.map(|v| v as f64),
    );
    let hand_alternation_term =
        1.0 - (recorded_profile.hand_alternation - expected_profile.hand_alternation).abs();
    let similarity = 0.3 * sim_transition + 0.3 * sim_same_finger + 0.3 * sim_same_hand
        + 0.1 * hand_alternation_term;

    let plausibility_failures = check_plausibility(&recorded_profile);
    let valid = structural_error.is_none() && transition_divergence <= TRANSITION_DIVERGENCE_THRESHOLD;

    ContentVerificationResult {
        valid,
        structural_error,
        expected_profile,
        recorded_profile,
        transition_divergence,
        category_divergence,
        similarity,
        plausibility_failures,
        paste_burst_suspected: paste_burst_suspected(samples, claimed_document_bytes.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jitter::JitterEngine;
    use chrono::{DateTime, Utc};
    use sha2::{Digest, Sha256};

    fn hash_of(text: &str) -> [u8; 32] {
        Sha256::digest(text.as_bytes()).into()
    }

    fn type_text(engine: &mut JitterEngine, text: &str, doc_hash: [u8; 32]) -> Vec<Sample> {
        let mut samples = Vec::new();
        for (i, c) in text.chars().enumerate() {
            let keycode = char_to_keycode(c);
            let (_, sample) = engine.on_keystroke(keycode, doc_hash, i as u64 + 1);
            if let Some(sample) = sample {
                samples.push(sample);
            }
        }
        samples
    }

    fn char_to_keycode(c: char) -> u16 {
        match c.to_ascii_lowercase() {
            'q' => 0x0C,
            'w' => 0x0D,
            'e' => 0x0E,
            'r' => 0x0F,
            't' => 0x11,
            'a' => 0x00,
            's' => 0x01,
            'd' => 0x02,
            'f' => 0x03,
            'g' => 0x05,
            'z' => 0x06,
            'x' => 0x07,
            'c' => 0x08,
            ' ' => 0xFFFF,
            _ => 0x00,
        }
    }

    #[test]
    fn golden_chain_verifies_with_correct_seed_and_not_with_wrong() {
        let mut seed = [0u8; 32];
        for (i, b) in seed.iter_mut().enumerate() {
            *b = (i + 1) as u8;
        }
        let mut engine = JitterEngine::new(seed);
        let doc_hash = [0xAAu8; 32];
        let samples = type_text(&mut engine, "qwerasdf", doc_hash);

        assert!(verify_with_secret(&samples, &seed).is_ok());
        let wrong_seed = [0xFFu8; 32];
        assert!(verify_with_secret(&samples, &wrong_seed).is_err());
    }

    #[test]
    fn empty_chain_fails_secret_verification() {
        let err = verify_with_secret(&[], &[0u8; 32]).unwrap_err();
        assert!(matches!(err, WitnessError::EmptyChain));
    }

    #[test]
    fn reordering_breaks_chain_link() {
        let mut engine = JitterEngine::new([3u8; 32]);
        let mut samples = type_text(&mut engine, "qwertasdfg", [1u8; 32]);
        samples.swap(1, 2);
        let err = verify_with_secret(&samples, &[3u8; 32]).unwrap_err();
        assert!(matches!(err, WitnessError::ChainLinkBroken { .. }));
    }

    #[test]
    fn timestamp_tamper_without_rehash_breaks_hash() {
        let mut engine = JitterEngine::new([9u8; 32]);
        let mut samples = type_text(&mut engine, "qwertasdfg", [2u8; 32]);
        samples[2].timestamp = samples[2].timestamp - chrono::Duration::days(365);
        let err = verify_with_secret(&samples, &[9u8; 32]).unwrap_err();
        assert!(matches!(err, WitnessError::HashMismatch { .. }));
    }

    #[test]
    fn timestamp_tamper_with_rehash_fails_jitter_not_structure() {
        let mut engine = JitterEngine::new([9u8; 32]);
        let mut samples = type_text(&mut engine, "qwertasdfg", [2u8; 32]);
        for sample in samples.iter_mut() {
            sample.timestamp = sample.timestamp - chrono::Duration::days(365);
        }
        relink(&mut samples);
        assert!(check_structural_integrity(&samples).is_ok());
        let err = verify_with_secret(&samples, &[9u8; 32]).unwrap_err();
        assert!(matches!(err, WitnessError::JitterMismatch { .. }));
    }

    fn relink(samples: &mut [Sample]) {
        let mut prev_hash = [0u8; 32];
        for sample in samples.iter_mut() {
            sample.previous_hash = prev_hash;
            sample.sample_hash = sample.compute_hash();
            prev_hash = sample.sample_hash;
        }
    }

    #[test]
    fn replay_across_documents_is_invalid() {
        let mut engine = JitterEngine::new([7u8; 32]);
        let doc_hash_a = hash_of("the quick brown fox");
        let samples = type_text(&mut engine, "the quick brown fox", doc_hash_a);

        let doc_b = "completely different document content";
        let result = verify_with_content(&samples, doc_b.as_bytes());
        assert!(!result.valid);
    }

    #[test]
    fn one_handed_fabrication_fails_plausibility() {
        let mut samples = Vec::new();
        let mut prev_hash = [0u8; 32];
        let ts_base = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        for i in 0..200u64 {
            let from = (i % 4) as i32;
            let to = ((i + 1) % 4) as i32;
            let transition = zone::encode_transition(from, to);
            let timestamp = ts_base + chrono::Duration::milliseconds(i as i64 * 80);
            let mut sample = Sample {
                ordinal: i + 1,
                timestamp,
                keystroke_count: i + 1,
                document_hash: [0u8; 32],
                zone_transition: transition,
                interval_bucket: 1,
                jitter_micros: 1000,
                sample_hash: [0u8; 32],
                previous_hash: prev_hash,
            };
            sample.sample_hash = sample.compute_hash();
            prev_hash = sample.sample_hash;
            samples.push(sample);
        }
        let recorded = analyze_recorded_zones(&samples);
        assert!(recorded.hand_alternation < 0.05);
        let failures = check_plausibility(&recorded);
        assert!(failures.contains(&PlausibilityFailure::HandAlternationOutOfRange));
    }

    #[test]
    fn jensen_shannon_divergence_is_bounded_and_symmetric() {
        let p = smoothed_distribution(&[10, 0, 0, 0], 0.001);
        let q = smoothed_distribution(&[0, 10, 0, 0], 0.001);
        let d_pq = jensen_shannon_divergence(&p, &q);
        let d_qp = jensen_shannon_divergence(&q, &p);
        assert!((d_pq - d_qp).abs() < 1e-9);
        assert!(d_pq <= std::f64::consts::LN_2 + 1e-9);
        assert!(d_pq >= 0.0);
    }

    #[test]
    fn identical_distributions_have_zero_divergence() {
        let p = smoothed_distribution(&[3, 3, 3, 3], 0.001);
        assert!(jensen_shannon_divergence(&p, &p) < 1e-9);
    }
}
