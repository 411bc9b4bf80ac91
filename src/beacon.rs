//! External randomness binding: drand over HTTP, with a local-entropy
//! fallback when no network is available. Both sources are reached
//! through one capability trait so the temporal anchor never needs to
//! know which one supplied a beacon.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, WitnessError};

const RECENT_BEACON_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BeaconSourceTag {
    Drand,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Beacon {
    pub source: BeaconSourceTag,
    pub round: u64,
    pub randomness: [u8; 32],
    pub expected_time: DateTime<Utc>,
}

/// A source of external randomness the temporal anchor can bind to.
/// Implemented by [`DrandClient`] and [`LocalEntropySource`].
#[async_trait]
pub trait BeaconCapability: Send + Sync {
    async fn fetch_latest(&self) -> Result<Beacon>;
    fn round_expected_time(&self, round: u64) -> DateTime<Utc>;
    fn randomness_bytes(&self, beacon: &Beacon) -> [u8; 32] {
        beacon.randomness
    }
}

#[derive(Debug, Clone)]
pub struct DrandChainConfig {
    /// Candidate drand HTTP API endpoints, tried in order until one
    /// succeeds — mirrors the way this crate's forebear tries multiple
    /// timestamping calendars before giving up.
    pub endpoints: Vec<String>,
    pub chain_hash: String,
    pub genesis_time: DateTime<Utc>,
    pub period_seconds: i64,
    pub timeout: Duration,
}

pub struct DrandClient {
    config: DrandChainConfig,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct DrandRoundResponse {
    round: u64,
    randomness: String,
    #[allow(dead_code)]
    signature: String,
}

impl DrandClient {
    pub fn new(config: DrandChainConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| WitnessError::BeaconUnavailable(e.to_string()))?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl BeaconCapability for DrandClient {
    async fn fetch_latest(&self) -> Result<Beacon> {
        if self.config.endpoints.is_empty() {
            return Err(WitnessError::BeaconUnavailable(
                "no drand endpoints configured".into(),
            ));
        }

        let mut last_error = String::new();
        for endpoint in &self.config.endpoints {
            let url = format!(
                "{}/{}/public/latest",
                endpoint.trim_end_matches('/'),
                self.config.chain_hash
            );

            let response = match self.http.get(&url).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = format!("{endpoint}: {e}");
                    continue;
                }
            };
            let parsed = match response.json::<DrandRoundResponse>().await {
                Ok(p) => p,
                Err(e) => {
                    last_error = format!("{endpoint}: {e}");
                    continue;
                }
            };
            let randomness_bytes = match hex::decode(&parsed.randomness) {
                Ok(b) if b.len() == 32 => b,
                Ok(_) => {
                    last_error = format!("{endpoint}: randomness field is not 32 bytes");
                    continue;
                }
                Err(e) => {
                    last_error = format!("{endpoint}: invalid randomness hex: {e}");
                    continue;
                }
            };
            let mut randomness = [0u8; 32];
            randomness.copy_from_slice(&randomness_bytes);

            return Ok(Beacon {
                source: BeaconSourceTag::Drand,
                round: parsed.round,
                randomness,
                expected_time: self.round_expected_time(parsed.round),
            });
        }

        Err(WitnessError::BeaconUnavailable(format!(
            "all drand endpoints failed, last error: {last_error}"
        )))
    }

    fn round_expected_time(&self, round: u64) -> DateTime<Utc> {
        self.config.genesis_time
            + chrono::Duration::seconds(self.config.period_seconds * round as i64)
    }
}

/// Fallback when drand is unreachable. Aggregates OS randomness with the
/// wall clock; the source tag on the resulting [`Beacon`] tells verifiers
/// not to treat `expected_time` as externally attested.
pub struct LocalEntropySource;

#[async_trait]
impl BeaconCapability for LocalEntropySource {
    async fn fetch_latest(&self) -> Result<Beacon> {
        let mut crypto_rand = [0u8; 32];
        rand::rng().fill_bytes(&mut crypto_rand);
        let now = Utc::now();

        let mut hasher = Sha256::new();
        hasher.update(b"witnessd-local-beacon-v1");
        hasher.update(crypto_rand);
        hasher.update(now.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true).as_bytes());
        hasher.update(now.timestamp_nanos_opt().unwrap_or(0).to_be_bytes());
        let randomness: [u8; 32] = hasher.finalize().into();

        Ok(Beacon {
            source: BeaconSourceTag::Local,
            round: now.timestamp() as u64,
            randomness,
            expected_time: now,
        })
    }

    fn round_expected_time(&self, round: u64) -> DateTime<Utc> {
        DateTime::from_timestamp(round as i64, 0).unwrap_or_else(Utc::now)
    }
}

/// `H(master_key ∥ randomness)`, stored as the binding commitment.
pub fn binding_commitment(master_key: &[u8; 32], beacon: &Beacon) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"witnessd-beacon-binding-v1");
    hasher.update(master_key);
    hasher.update(beacon.randomness);
    hasher.finalize().into()
}

/// Bounded history of recently-fetched beacons, oldest evicted first.
pub struct RecentBeacons {
    entries: VecDeque<Beacon>,
    capacity: usize,
}

impl Default for RecentBeacons {
    fn default() -> Self {
        Self::new(RECENT_BEACON_CAPACITY)
    }
}

impl RecentBeacons {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, beacon: Beacon) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(beacon);
    }

    pub fn latest(&self) -> Option<&Beacon> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_entropy_source_produces_distinct_beacons() {
        let source = LocalEntropySource;
        let a = source.fetch_latest().await.unwrap();
        let b = source.fetch_latest().await.unwrap();
        assert_eq!(a.source, BeaconSourceTag::Local);
        assert_ne!(a.randomness, b.randomness);
    }

    #[test]
    fn binding_commitment_is_deterministic() {
        let key = [3u8; 32];
        let beacon = Beacon {
            source: BeaconSourceTag::Local,
            round: 1,
            randomness: [9u8; 32],
            expected_time: Utc::now(),
        };
        let c1 = binding_commitment(&key, &beacon);
        let c2 = binding_commitment(&key, &beacon);
        assert_eq!(c1, c2);
    }

    #[test]
    fn binding_commitment_differs_per_master_key() {
        let beacon = Beacon {
            source: BeaconSourceTag::Local,
            round: 1,
            randomness: [9u8; 32],
            expected_time: Utc::now(),
        };
        let c1 = binding_commitment(&[1u8; 32], &beacon);
        let c2 = binding_commitment(&[2u8; 32], &beacon);
        assert_ne!(c1, c2);
    }

    #[test]
    fn recent_beacons_evicts_oldest() {
        let mut recent = RecentBeacons::new(2);
        for round in 0..5u64 {
            recent.push(Beacon {
                source: BeaconSourceTag::Local,
                round,
                randomness: [round as u8; 32],
                expected_time: Utc::now(),
            });
        }
        assert_eq!(recent.len(), 2);
        assert_eq!(recent.latest().unwrap().round, 4);
    }

    #[test]
    fn drand_round_expected_time_advances_with_period() {
        let config = DrandChainConfig {
            endpoints: vec!["https://api.drand.sh".into()],
            chain_hash: "dead".into(),
            genesis_time: DateTime::from_timestamp(0, 0).unwrap(),
            period_seconds: 30,
            timeout: Duration::from_secs(5),
        };
        let client = DrandClient::new(config).unwrap();
        let t0 = client.round_expected_time(0);
        let t10 = client.round_expected_time(10);
        assert_eq!((t10 - t0).num_seconds(), 300);
    }

    #[tokio::test]
    async fn drand_client_tries_endpoints_in_order_until_one_succeeds() {
        let config = DrandChainConfig {
            endpoints: vec![
                "http://127.0.0.1:1".into(),
                "http://127.0.0.1:2".into(),
            ],
            chain_hash: "dead".into(),
            genesis_time: DateTime::from_timestamp(0, 0).unwrap(),
            period_seconds: 30,
            timeout: Duration::from_millis(200),
        };
        let client = DrandClient::new(config).unwrap();
        let err = client.fetch_latest().await.unwrap_err();
        // Both unreachable endpoints must have been attempted, not just the first.
        assert!(format!("{err}").contains("127.0.0.1:2"));
    }

    #[tokio::test]
    async fn drand_client_rejects_empty_endpoint_list() {
        let config = DrandChainConfig {
            endpoints: vec![],
            chain_hash: "dead".into(),
            genesis_time: DateTime::from_timestamp(0, 0).unwrap(),
            period_seconds: 30,
            timeout: Duration::from_secs(1),
        };
        let client = DrandClient::new(config).unwrap();
        assert!(client.fetch_latest().await.is_err());
    }
}
