//! The exportable, seed-free evidence bundle: a session's chain plus
//! whichever optional subsystems were engaged — a temporal anchor, a
//! beacon binding, a watermark descriptor, layered-DSSS evidence.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::beacon::{Beacon, BeaconSourceTag};
use crate::dsss::{DisclosureTier, LayeredSignal};
use crate::session::SessionExport;
use crate::temporal_anchor::TemporalAnchor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconBinding {
    pub source: BeaconSourceTag,
    pub round: u64,
    pub commitment: [u8; 32],
}

impl BeaconBinding {
    pub fn from_beacon(master_key: &[u8; 32], beacon: &Beacon) -> Self {
        Self {
            source: beacon.source,
            round: beacon.round,
            commitment: crate::beacon::binding_commitment(master_key, beacon),
        }
    }
}

/// A generic descriptor for whatever out-of-band watermark (e.g. a
/// steganographic carrier in the document itself) accompanies this
/// evidence. Left deliberately thin: the watermarking scheme itself is
/// an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkDescriptor {
    pub scheme: String,
    pub descriptor_hex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsssEvidence {
    pub tier: DisclosureTier,
    pub signal: LayeredSignal,
}

/// The complete exportable artifact: a session's export plus whatever
/// optional subsystems produced corroborating evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub session: SessionExport,
    pub temporal_anchor: Option<TemporalAnchor>,
    pub beacon_bindings: Vec<BeaconBinding>,
    pub watermark: Option<WatermarkDescriptor>,
    pub dsss: Option<DsssEvidence>,
}

impl Evidence {
    pub fn new(session: SessionExport) -> Self {
        Self {
            session,
            temporal_anchor: None,
            beacon_bindings: Vec::new(),
            watermark: None,
            dsss: None,
        }
    }

    pub fn with_temporal_anchor(mut self, anchor: TemporalAnchor) -> Self {
        self.temporal_anchor = Some(anchor);
        self
    }

    pub fn with_beacon_binding(mut self, binding: BeaconBinding) -> Self {
        self.beacon_bindings.push(binding);
        self
    }

    pub fn with_watermark(mut self, watermark: WatermarkDescriptor) -> Self {
        self.watermark = Some(watermark);
        self
    }

    pub fn with_dsss(mut self, dsss: DsssEvidence) -> Self {
        self.dsss = Some(dsss);
        self
    }

    /// Canonical hash over everything exported, used as the
    /// `evidence_root` an anti-replay [`crate::challenge::ChallengeResponse`]
    /// is computed over. Order is fixed so two identical bundles hash
    /// identically regardless of how they were built.
    pub fn evidence_root(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"witnessd-evidence-root-v1");
        hasher.update(self.session.session_id.as_bytes());
        for sample in &self.session.chain {
            hasher.update(sample.sample_hash);
        }
        if let Some(anchor) = &self.temporal_anchor {
            if let Some(tip) = anchor.chain_tip_hash() {
                hasher.update(tip);
            }
        }
        for binding in &self.beacon_bindings {
            hasher.update(binding.commitment);
        }
        if let Some(watermark) = &self.watermark {
            hasher.update(watermark.descriptor_hex.as_bytes());
        }
        hasher.finalize().into()
    }
}
