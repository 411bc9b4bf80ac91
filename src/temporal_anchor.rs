//! Chains [`VdfProof`]s to give a session's chain tip a hard lower bound
//! on elapsed wall-time: advancing the chain requires running a
//! sequential function that cannot be sped up by parallel hardware.

use sha2::{Digest, Sha256};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WitnessError};
use crate::vdf::{Parameters, VdfProof};

/// One link in the chain: a VDF proof plus the backlink it was computed
/// against, and the beacon binding (if any) folded into its input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorStep {
    pub proof: VdfProof,
    pub previous_output: [u8; 32],
    pub beacon_commitment: Option<[u8; 32]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalAnchor {
    pub steps: Vec<AnchorStep>,
    params: Parameters,
}

/// `input = H("witnessd-vdf-v1" ∥ previous_vdf_output ∥ chain_tip ∥
/// optional_beacon)`.
fn anchor_input(previous_output: [u8; 32], chain_tip: [u8; 32], beacon: Option<[u8; 32]>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"witnessd-vdf-v1");
    hasher.update(previous_output);
    hasher.update(chain_tip);
    if let Some(b) = beacon {
        hasher.update(b);
    }
    hasher.finalize().into()
}

impl TemporalAnchor {
    pub fn new(params: Parameters) -> Self {
        Self {
            steps: Vec::new(),
            params,
        }
    }

    fn tip_output(&self) -> [u8; 32] {
        self.steps
            .last()
            .map(|s| s.proof.output)
            .unwrap_or([0u8; 32])
    }

    /// Advances the chain by one step, binding `chain_tip` (typically the
    /// session's latest sample hash) and an optional beacon commitment
    /// into the VDF input, then running the VDF for `target_duration`.
    pub fn advance(&mut self, chain_tip: [u8; 32], beacon_commitment: Option<[u8; 32]>, target_duration: Duration) -> Result<()> {
        let previous_output = self.tip_output();
        let input = anchor_input(previous_output, chain_tip, beacon_commitment);
        let proof = VdfProof::compute(input, target_duration, self.params)
            .map_err(WitnessError::Other)?;
        self.steps.push(AnchorStep {
            proof,
            previous_output,
            beacon_commitment,
        });
        Ok(())
    }

    pub fn chain_tip_hash(&self) -> Option<[u8; 32]> {
        self.steps.last().map(|s| s.proof.output)
    }
}

/// Verifies every step's proof and backlink, returning a lower bound on
/// the total elapsed wall-time spanned by the anchor. Does not (and
/// cannot) prove an upper bound: the true elapsed time is only ever
/// greater than or equal to the returned duration.
pub fn verify_temporal_anchor(anchor: &TemporalAnchor, params: Parameters) -> Result<Duration> {
    if anchor.steps.is_empty() {
        return Ok(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut expected_previous = [0u8; 32];

    for (index, step) in anchor.steps.iter().enumerate() {
        if step.previous_output != expected_previous {
            return Err(WitnessError::VdfChainBroken { index });
        }
        if !(params.min_iterations..=params.max_iterations).contains(&step.proof.iterations) {
            return Err(WitnessError::Other(format!(
                "anchor step {index}: iteration count {} out of bounds [{}, {}]",
                step.proof.iterations, params.min_iterations, params.max_iterations
            )));
        }
        if !step.proof.verify() {
            return Err(WitnessError::VdfProofInvalid);
        }
        total += step.proof.min_elapsed_time(params);
        expected_previous = step.proof.output;
    }

    Ok(total)
}
