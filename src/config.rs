//! Process-wide configuration: tracking directory, beacon endpoints,
//! VDF calibration bounds, DSSS embed strength, and audit rotation
//! limits. Follows the source's `WitnessdConfig::load_or_default()` /
//! `persist()` idiom, but persists TOML rather than JSON and drops every
//! config block outside what the environment/process surface needs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::vdf::params::Parameters as VdfParameters;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WitnessConfig {
    #[serde(default = "default_tracking_dir")]
    pub tracking_dir: PathBuf,

    #[serde(default)]
    pub beacon: BeaconConfig,

    #[serde(default)]
    pub vdf: VdfConfig,

    #[serde(default)]
    pub dsss: DsssConfig,

    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconConfig {
    /// Candidate drand endpoints, tried in order until one succeeds.
    #[serde(default = "default_beacon_endpoints")]
    pub endpoints: Vec<String>,

    #[serde(default = "default_chain_hash")]
    pub chain_hash: String,

    #[serde(default = "default_beacon_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            endpoints: default_beacon_endpoints(),
            chain_hash: default_chain_hash(),
            timeout_secs: default_beacon_timeout_secs(),
        }
    }
}

fn default_beacon_endpoints() -> Vec<String> {
    vec![
        "https://api.drand.sh".to_string(),
        "https://api2.drand.sh".to_string(),
        "https://api3.drand.sh".to_string(),
    ]
}
fn default_chain_hash() -> String {
    "8990e7a9aaed2ffed73dbd7092123d6f289930540d7651336225dc172e51b2a".to_string()
}
fn default_beacon_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VdfConfig {
    #[serde(default = "default_iterations_per_second")]
    pub iterations_per_second: u64,

    #[serde(default = "default_min_iterations")]
    pub min_iterations: u64,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: u64,

    #[serde(default = "default_anchor_interval_secs")]
    pub anchor_interval_secs: u64,
}

impl Default for VdfConfig {
    fn default() -> Self {
        Self {
            iterations_per_second: default_iterations_per_second(),
            min_iterations: default_min_iterations(),
            max_iterations: default_max_iterations(),
            anchor_interval_secs: default_anchor_interval_secs(),
        }
    }
}

fn default_iterations_per_second() -> u64 {
    1_000_000
}
fn default_min_iterations() -> u64 {
    100_000
}
fn default_max_iterations() -> u64 {
    3_600_000_000
}
fn default_anchor_interval_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsssConfig {
    #[serde(default = "default_embed_strength")]
    pub embed_strength: f64,

    #[serde(default = "default_num_bins")]
    pub num_bins: usize,

    #[serde(default = "default_sequence_len")]
    pub sequence_len: usize,
}

impl Default for DsssConfig {
    fn default() -> Self {
        Self {
            embed_strength: default_embed_strength(),
            num_bins: default_num_bins(),
            sequence_len: default_sequence_len(),
        }
    }
}

fn default_embed_strength() -> f64 {
    0.1
}
fn default_num_bins() -> usize {
    64
}
fn default_sequence_len() -> usize {
    64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_max_size_bytes")]
    pub max_size_bytes: u64,

    #[serde(default = "default_audit_max_age_days")]
    pub max_age_days: i64,

    #[serde(default = "default_audit_dir")]
    pub rotation_dir: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: default_audit_max_size_bytes(),
            max_age_days: default_audit_max_age_days(),
            rotation_dir: default_audit_dir(),
        }
    }
}

fn default_audit_max_size_bytes() -> u64 {
    10 * 1024 * 1024
}
fn default_audit_max_age_days() -> i64 {
    90
}
fn default_audit_dir() -> PathBuf {
    PathBuf::from(".witnessd/audit")
}

fn default_tracking_dir() -> PathBuf {
    PathBuf::from(".witnessd/sessions")
}

impl WitnessConfig {
    /// Loads `<dir>/witnessd.toml` if present, otherwise builds and
    /// persists the default configuration rooted at `dir`.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = dir.join("witnessd.toml");

        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)?;
            let mut config: WitnessConfig = toml::from_str(&raw)?;
            config.tracking_dir = dir.join("sessions");
            return Ok(config);
        }

        let config = Self::default_with_dir(dir);
        config.persist(&config_path)?;
        Ok(config)
    }

    pub fn default_with_dir(dir: &Path) -> Self {
        Self {
            tracking_dir: dir.join("sessions"),
            beacon: BeaconConfig::default(),
            vdf: VdfConfig::default(),
            dsss: DsssConfig::default(),
            audit: AuditConfig {
                rotation_dir: dir.join("audit"),
                ..AuditConfig::default()
            },
        }
    }

    pub fn persist(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = toml::to_string_pretty(self)?;
        fs::write(config_path, raw)?;
        Ok(())
    }
}

impl From<WitnessConfig> for VdfParameters {
    fn from(cfg: WitnessConfig) -> Self {
        Self {
            iterations_per_second: cfg.vdf.iterations_per_second,
            min_iterations: cfg.vdf.min_iterations,
            max_iterations: cfg.vdf.max_iterations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_rooted_at_dir() {
        let dir = tempdir().unwrap();
        let config = WitnessConfig::default_with_dir(dir.path());
        assert_eq!(config.tracking_dir, dir.path().join("sessions"));
        assert_eq!(config.dsss.embed_strength, 0.1);
        assert_eq!(config.vdf.iterations_per_second, 1_000_000);
    }

    #[test]
    fn load_or_default_persists_then_reloads() {
        let dir = tempdir().unwrap();
        let config = WitnessConfig::load_or_default(dir.path()).expect("load failed");
        assert!(dir.path().join("witnessd.toml").exists());

        let reloaded = WitnessConfig::load_or_default(dir.path()).expect("reload failed");
        assert_eq!(reloaded.vdf.iterations_per_second, config.vdf.iterations_per_second);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("witnessd.toml");
        fs::write(&config_path, "[dsss]\nembed_strength = 0.2\n").unwrap();

        let loaded: WitnessConfig = toml::from_str(&fs::read_to_string(&config_path).unwrap()).unwrap();
        assert_eq!(loaded.dsss.embed_strength, 0.2);
        assert_eq!(loaded.dsss.num_bins, 64);
        assert_eq!(loaded.vdf.iterations_per_second, 1_000_000);
    }
}
