//! Canonical binary and JSON encoding for sample chains, plus the signing
//! preimage external signers attach over a single sample. The binary form
//! is fixed-size per sample so truncation is a length check, not a parse
//! failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WitnessError};
use crate::jitter::{Parameters, Sample};

pub const BINARY_VERSION: u8 = 1;
pub const HEADER_LEN: usize = 18;
pub const SAMPLE_LEN: usize = 116;
const SIGNING_TAG: &[u8] = b"witnessd-sample-v1\n";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainData {
    pub version: u8,
    pub params: Parameters,
    pub samples: Vec<Sample>,
    pub created_at: DateTime<Utc>,
}

pub fn encode_json(samples: &[Sample], params: Parameters) -> Result<Vec<u8>> {
    let data = ChainData {
        version: BINARY_VERSION,
        params,
        samples: samples.to_vec(),
        created_at: Utc::now(),
    };
    Ok(serde_json::to_vec(&data)?)
}

pub fn decode_json(bytes: &[u8]) -> Result<(Vec<Sample>, Parameters)> {
    let data: ChainData = serde_json::from_slice(bytes)?;
    Ok((data.samples, data.params))
}

/// Binary header: `{ version: u8, min_jitter: u32, max_jitter: u32,
/// sample_interval: u32, inject_enabled: u8, sample_count: u32 }`, all
/// big-endian, followed by `sample_count` fixed 116-byte sample records.
pub fn encode_binary(samples: &[Sample], params: Parameters) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + samples.len() * SAMPLE_LEN);
    buf.push(BINARY_VERSION);
    buf.extend_from_slice(&params.min_jitter_micros.to_be_bytes());
    buf.extend_from_slice(&params.max_jitter_micros.to_be_bytes());
    buf.extend_from_slice(&(params.sample_interval as u32).to_be_bytes());
    buf.push(params.inject_enabled as u8);
    buf.extend_from_slice(&(samples.len() as u32).to_be_bytes());
    debug_assert_eq!(buf.len(), HEADER_LEN);

    for sample in samples {
        encode_sample_binary(sample, &mut buf);
    }
    buf
}

fn encode_sample_binary(sample: &Sample, buf: &mut Vec<u8>) {
    buf.extend_from_slice(
        &(sample.timestamp.timestamp_nanos_opt().unwrap_or(0) as u64).to_be_bytes(),
    );
    buf.extend_from_slice(&sample.keystroke_count.to_be_bytes());
    buf.extend_from_slice(&sample.document_hash);
    buf.extend_from_slice(&sample.jitter_micros.to_be_bytes());
    buf.extend_from_slice(&sample.sample_hash);
    buf.extend_from_slice(&sample.previous_hash);
}

pub fn decode_binary(bytes: &[u8]) -> Result<(Vec<Sample>, Parameters)> {
    if bytes.len() < HEADER_LEN {
        return Err(WitnessError::Other("binary chain: header truncated".into()));
    }
    let version = bytes[0];
    if version != BINARY_VERSION {
        return Err(WitnessError::Other(format!(
            "binary chain: unsupported version {version}"
        )));
    }
    let min_jitter = u32::from_be_bytes(bytes[1..5].try_into().unwrap());
    let max_jitter = u32::from_be_bytes(bytes[5..9].try_into().unwrap());
    let sample_interval = u32::from_be_bytes(bytes[9..13].try_into().unwrap());
    let inject_enabled = bytes[13] != 0;
    let sample_count = u32::from_be_bytes(bytes[14..18].try_into().unwrap()) as usize;

    let expected_len = HEADER_LEN + sample_count * SAMPLE_LEN;
    if bytes.len() != expected_len {
        return Err(WitnessError::Other(format!(
            "binary chain: expected {expected_len} bytes, got {} (truncated or padded)",
            bytes.len()
        )));
    }

    let mut samples = Vec::with_capacity(sample_count);
    let mut offset = HEADER_LEN;
    for ordinal in 0..sample_count {
        let chunk = &bytes[offset..offset + SAMPLE_LEN];
        samples.push(decode_sample_binary(ordinal as u64 + 1, chunk)?);
        offset += SAMPLE_LEN;
    }

    let params = Parameters {
        min_jitter_micros: min_jitter,
        max_jitter_micros: max_jitter,
        sample_interval: sample_interval as u64,
        inject_enabled,
    };
    Ok((samples, params))
}

fn decode_sample_binary(ordinal: u64, chunk: &[u8]) -> Result<Sample> {
    let timestamp_ns = u64::from_be_bytes(chunk[0..8].try_into().unwrap());
    let keystroke_count = u64::from_be_bytes(chunk[8..16].try_into().unwrap());
    let mut document_hash = [0u8; 32];
    document_hash.copy_from_slice(&chunk[16..48]);
    let jitter_micros = u32::from_be_bytes(chunk[48..52].try_into().unwrap());
    let mut sample_hash = [0u8; 32];
    sample_hash.copy_from_slice(&chunk[52..84]);
    let mut previous_hash = [0u8; 32];
    previous_hash.copy_from_slice(&chunk[84..116]);

    let timestamp = DateTime::<Utc>::from_timestamp(
        (timestamp_ns / 1_000_000_000) as i64,
        (timestamp_ns % 1_000_000_000) as u32,
    )
    .unwrap_or_else(Utc::now);

    // The binary form drops zone_transition/interval_bucket; they are
    // not needed for the fixed-size wire format's intended use (external
    // signature verification and archival), only for statistical review.
    Ok(Sample {
        ordinal,
        timestamp,
        keystroke_count,
        document_hash,
        zone_transition: crate::zone::NO_TRANSITION,
        interval_bucket: 0,
        jitter_micros,
        sample_hash,
        previous_hash,
    })
}

/// Domain-separated preimage for an external signature over a single
/// sample: `"witnessd-sample-v1\n" ∥ timestamp_ns ∥ count ∥ document_hash
/// ∥ jitter_micros ∥ previous_hash ∥ sample_hash`.
pub fn signing_preimage(sample: &Sample) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SIGNING_TAG.len() + SAMPLE_LEN);
    buf.extend_from_slice(SIGNING_TAG);
    buf.extend_from_slice(
        &(sample.timestamp.timestamp_nanos_opt().unwrap_or(0) as u64).to_be_bytes(),
    );
    buf.extend_from_slice(&sample.keystroke_count.to_be_bytes());
    buf.extend_from_slice(&sample.document_hash);
    buf.extend_from_slice(&sample.jitter_micros.to_be_bytes());
    buf.extend_from_slice(&sample.previous_hash);
    buf.extend_from_slice(&sample.sample_hash);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jitter::{default_parameters, JitterEngine};

    fn sample_chain() -> Vec<Sample> {
        let mut engine = JitterEngine::new([5u8; 32]);
        let mut samples = Vec::new();
        for i in 0..5u16 {
            let (_, s) = engine.on_keystroke(0x0C + (i % 4), [i as u8; 32], i as u64);
            if let Some(s) = s {
                samples.push(s);
            }
        }
        samples
    }

    #[test]
    fn json_round_trip_preserves_samples() {
        let samples = sample_chain();
        let params = default_parameters();
        let encoded = encode_json(&samples, params).unwrap();
        let (decoded, decoded_params) = decode_json(&encoded).unwrap();
        assert_eq!(decoded.len(), samples.len());
        assert_eq!(decoded[0].sample_hash, samples[0].sample_hash);
        assert_eq!(decoded_params.min_jitter_micros, params.min_jitter_micros);
    }

    #[test]
    fn binary_round_trip_preserves_hash_chain() {
        let samples = sample_chain();
        let params = default_parameters();
        let encoded = encode_binary(&samples, params);
        assert_eq!(encoded.len(), HEADER_LEN + samples.len() * SAMPLE_LEN);
        let (decoded, decoded_params) = decode_binary(&encoded).unwrap();
        assert_eq!(decoded.len(), samples.len());
        for (a, b) in samples.iter().zip(decoded.iter()) {
            assert_eq!(a.sample_hash, b.sample_hash);
            assert_eq!(a.previous_hash, b.previous_hash);
            assert_eq!(a.jitter_micros, b.jitter_micros);
        }
        assert_eq!(decoded_params.sample_interval, params.sample_interval);
    }

    #[test]
    fn binary_decode_rejects_truncated_input() {
        let samples = sample_chain();
        let encoded = encode_binary(&samples, default_parameters());
        let truncated = &encoded[..encoded.len() - 1];
        assert!(decode_binary(truncated).is_err());
    }

    #[test]
    fn signing_preimage_is_deterministic_and_domain_separated() {
        let samples = sample_chain();
        let preimage = signing_preimage(&samples[0]);
        let preimage_again = signing_preimage(&samples[0]);
        assert_eq!(preimage, preimage_again);
        assert!(preimage.starts_with(SIGNING_TAG));
    }
}
