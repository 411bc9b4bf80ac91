//! Layered direct-sequence spread-spectrum (DSSS) encoder: embeds a single
//! inter-keystroke delay into one transmitted signal at four disclosure
//! tiers (Public, Basic, Standard, Full), each under its own derived key.
//! A holder of a tier's key can extract that tier without being able to
//! extract anything finer.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

pub const DEFAULT_NUM_BINS: usize = 64;
pub const DEFAULT_SEQUENCE_LEN: usize = 64;
pub const DEFAULT_EMBED_STRENGTH: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisclosureTier {
    /// Coarse 100ms bin only, unencrypted — open question in §9: how to
    /// authenticate this claim without disclosing the PN sequence remains
    /// unresolved here; see DESIGN.md.
    Public,
    /// Only whether a keystroke occurred, no magnitude.
    Basic,
    /// 50ms bin — matches [`crate::zone::interval_to_bucket`] granularity.
    Standard,
    /// Raw delta, continuous.
    Full,
}

impl DisclosureTier {
    pub const ALL: [DisclosureTier; 4] = [
        DisclosureTier::Public,
        DisclosureTier::Basic,
        DisclosureTier::Standard,
        DisclosureTier::Full,
    ];

    fn index(self) -> u8 {
        match self {
            DisclosureTier::Public => 0,
            DisclosureTier::Basic => 1,
            DisclosureTier::Standard => 2,
            DisclosureTier::Full => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DsssConfig {
    pub num_bins: usize,
    pub sequence_len: usize,
    pub embed_strength: f64,
}

impl Default for DsssConfig {
    fn default() -> Self {
        Self {
            num_bins: DEFAULT_NUM_BINS,
            sequence_len: DEFAULT_SEQUENCE_LEN,
            embed_strength: DEFAULT_EMBED_STRENGTH,
        }
    }
}

/// Complex sample as a plain (re, im) pair — a full complex-number crate
/// is unwarranted for a handful of arithmetic operations across a fixed
/// bin count.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    fn mul(self, other: Complex) -> Complex {
        Complex {
            re: self.re * other.re - self.im * other.im,
            im: self.re * other.im + self.im * other.re,
        }
    }

    fn scale(self, s: f64) -> Complex {
        Complex {
            re: self.re * s,
            im: self.im * s,
        }
    }

    fn add(self, other: Complex) -> Complex {
        Complex {
            re: self.re + other.re,
            im: self.im + other.im,
        }
    }

    fn conj(self) -> Complex {
        Complex {
            re: self.re,
            im: -self.im,
        }
    }
}

/// The observable transmitted signal: all four tiers summed, plus a
/// wideband noise floor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayeredSignal {
    pub bins: Vec<Complex>,
}

/// `K_i = HKDF(master_key, "dsss-layer-" || i)`.
pub fn derive_tier_key(master_key: &[u8; 32], tier: DisclosureTier) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, master_key);
    let mut out = [0u8; 32];
    let info = format!("dsss-layer-{}", tier.index());
    hk.expand(info.as_bytes(), &mut out)
        .expect("32 bytes is a valid HKDF output length");
    out
}

/// Bundles the keys for `tier` and every coarser tier — the "selective
/// disclosure" unit actually handed to an auditor or a court. Holding
/// [`DisclosureTier::Standard`]'s bundle lets a recipient decode Standard,
/// Basic, and Public, but never [`DisclosureTier::Full`].
pub fn disclosure_bundle(master_key: &[u8; 32], tier: DisclosureTier) -> Vec<(DisclosureTier, [u8; 32])> {
    DisclosureTier::ALL
        .into_iter()
        .filter(|t| t.index() <= tier.index())
        .map(|t| (t, derive_tier_key(master_key, t)))
        .collect()
}

/// HMAC-based DRBG: `pn[k] = +1` if `HMAC(key, k)[0]` is even, else `-1`.
/// Gold-code cross-correlation properties aren't needed — only that
/// different keys produce ~uncorrelated sequences.
fn generate_pn(key: &[u8; 32], length: usize) -> Vec<f64> {
    (0..length)
        .map(|k| {
            let mut mac = Hmac::<Sha256>::new_from_slice(key).unwrap();
            mac.update(b"dsss-pn");
            mac.update(&(k as u64).to_be_bytes());
            let digest = mac.finalize().into_bytes();
            if digest[0] & 1 == 0 {
                1.0
            } else {
                -1.0
            }
        })
        .collect()
}

/// Per-bin carrier phase on the unit circle, deterministic under `key`.
fn generate_carrier(key: &[u8; 32], num_bins: usize) -> Vec<Complex> {
    (0..num_bins)
        .map(|b| {
            let mut mac = Hmac::<Sha256>::new_from_slice(key).unwrap();
            mac.update(b"dsss-carrier");
            mac.update(&(b as u64).to_be_bytes());
            let digest = mac.finalize().into_bytes();
            let raw = u64::from_be_bytes(digest[0..8].try_into().unwrap());
            let angle = (raw as f64 / u64::MAX as f64) * std::f64::consts::TAU;
            Complex {
                re: angle.cos(),
                im: angle.sin(),
            }
        })
        .collect()
}

fn tier_chip_value(tier: DisclosureTier, delta_ms: f64) -> f64 {
    let clamped = delta_ms.clamp(0.0, 500.0);
    match tier {
        DisclosureTier::Public => {
            let bucket = (clamped / 100.0).floor().min(4.0);
            (bucket / 4.0) * 2.0 - 1.0
        }
        DisclosureTier::Basic => 1.0,
        DisclosureTier::Standard => {
            let bucket = (clamped / 50.0).floor().min(9.0);
            (bucket / 9.0) * 2.0 - 1.0
        }
        DisclosureTier::Full => ((delta_ms - 200.0) / 200.0).clamp(-1.0, 1.0),
    }
}

fn tier_delta_from_value(tier: DisclosureTier, value: f64) -> f64 {
    let value = value.clamp(-1.0, 1.0);
    match tier {
        DisclosureTier::Public => {
            let bucket = (((value + 1.0) / 2.0) * 4.0).round();
            bucket * 100.0 + 50.0
        }
        DisclosureTier::Basic => 200.0,
        DisclosureTier::Standard => {
            let bucket = (((value + 1.0) / 2.0) * 9.0).round();
            bucket * 50.0 + 25.0
        }
        DisclosureTier::Full => value * 200.0 + 200.0,
    }
}

/// Encodes one inter-keystroke delay at all four disclosure tiers into a
/// single observable signal.
pub fn encode_timing(master_key: &[u8; 32], delta_ms: f64, config: &DsssConfig) -> LayeredSignal {
    let mut bins = vec![Complex::default(); config.num_bins];

    for tier in DisclosureTier::ALL {
        let key = derive_tier_key(master_key, tier);
        let pn = generate_pn(&key, config.sequence_len);
        let carrier = generate_carrier(&key, config.num_bins);
        let value = tier_chip_value(tier, delta_ms);

        for b in 0..config.num_bins {
            let chip = value * pn[b % config.sequence_len];
            let amplitude = chip * config.embed_strength;
            bins[b] = bins[b].add(carrier[b].scale(amplitude));
        }
    }

    let mut rng = rand::rng();
    for bin in bins.iter_mut() {
        let noise_re = (rng.next_u32() as f64 / u32::MAX as f64 - 0.5) * 2.0 * config.embed_strength;
        let noise_im = (rng.next_u32() as f64 / u32::MAX as f64 - 0.5) * 2.0 * config.embed_strength;
        *bin = bin.add(Complex {
            re: noise_re,
            im: noise_im,
        });
    }

    LayeredSignal { bins }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DecodedTiming {
    pub delta_ms: f64,
    pub confidence: f64,
}

/// Decodes the signal at `tier` using that tier's key. A wrong key (wrong
/// tier, or unrelated random key) reconstructs an uncorrelated PN/carrier
/// pair and returns near-zero confidence.
pub fn decode_timing(key: &[u8; 32], signal: &LayeredSignal, tier: DisclosureTier, config: &DsssConfig) -> DecodedTiming {
    let pn = generate_pn(key, config.sequence_len);
    let carrier = generate_carrier(key, config.num_bins);

    let mut correlator_real = 0.0;
    let mut correlator_imag = 0.0;
    for b in 0..config.num_bins.min(signal.bins.len()) {
        let baseband = signal.bins[b].mul(carrier[b].conj());
        let chip = pn[b % config.sequence_len];
        correlator_real += baseband.re * chip;
        correlator_imag += baseband.im * chip;
    }

    let n = config.num_bins as f64;
    let normalized = correlator_real / (n * config.embed_strength);
    let confidence = (correlator_real.abs()
        / (correlator_real.abs() + correlator_imag.abs() + 1e-9))
        .clamp(0.0, 1.0);

    DecodedTiming {
        delta_ms: tier_delta_from_value(tier, normalized),
        confidence,
    }
}
