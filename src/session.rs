//! A session owns the secret seed, the keystroke counter, and the growing
//! sample chain for one tracked document. It is the only thing that ever
//! sees the seed; everything exported from it has the seed stripped.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::{Result, WitnessError};
use crate::jitter::{self, JitterEngine, Parameters, Sample, TypingProfile};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// A tracked document's writable session state, guarded by a single
/// reader-writer lock so `record_keystroke` (writer) never blocks
/// `status`/`export`/`save` against each other, only against itself.
pub struct Session {
    pub id: Uuid,
    pub document_path: PathBuf,
    pub params: Parameters,
    pub started_at: DateTime<Utc>,
    state: RwLock<SessionState>,
}

struct SessionState {
    seed: Zeroizing<[u8; 32]>,
    engine: JitterEngine,
    chain: Vec<Sample>,
    keystroke_count: u64,
    running: bool,
    ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub id: String,
    pub document_path: PathBuf,
    pub running: bool,
    pub keystroke_count: u64,
    pub sample_count: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// On-disk form of a session: `<tracking_dir>/<id>.json`, directory 0700
/// and file 0600, since it carries the secret seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFile {
    pub id: String,
    pub seed_hex: String,
    pub document_path: PathBuf,
    pub params: Parameters,
    pub chain: Vec<Sample>,
    pub keystroke_count: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Statistics derived for export; never requires the seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatistics {
    pub total_samples: usize,
    pub total_keystrokes: u64,
    pub keystrokes_per_minute: f64,
    pub unique_document_hashes: usize,
    pub chain_valid: bool,
    pub typing_profile: TypingProfile,
}

/// The exportable artifact: identical to the session file but with the
/// seed stripped and derived statistics attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionExport {
    pub session_id: String,
    pub document_path: PathBuf,
    pub params: Parameters,
    pub chain: Vec<Sample>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub statistics: SessionStatistics,
}

impl Session {
    /// Generates a session id and a fresh 32-byte seed from a
    /// cryptographic RNG. The seed never leaves this struct except
    /// through [`Session::save`], which writes it to owner-only storage.
    pub fn new(document_path: impl Into<PathBuf>, params: Parameters) -> Self {
        let mut seed = [0u8; 32];
        rand::rng().fill_bytes(&mut seed);
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            document_path: document_path.into(),
            params,
            started_at: now,
            state: RwLock::new(SessionState {
                seed: Zeroizing::new(seed),
                engine: JitterEngine::new(seed),
                chain: Vec::new(),
                keystroke_count: 0,
                running: false,
                ended_at: None,
            }),
        }
    }

    /// One-shot guarded start; returns [`WitnessError::SessionAlreadyRunning`]
    /// if called twice.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.running {
            return Err(WitnessError::SessionAlreadyRunning {
                id: self.id.to_string(),
            });
        }
        state.running = true;
        log::info!("session {} started for {:?}", self.id, self.document_path);
        Ok(())
    }

    /// Advances the keystroke counter; samples only every `sample_interval`
    /// keystrokes. A document read/hash failure is recoverable — the
    /// sample is skipped, but the counter still advances so the next
    /// sample naturally links to the previous chain tip.
    ///
    /// Returns the jitter microseconds to inject, or `0` if this call did
    /// not produce a sample (off-interval, or a non-zone key).
    pub fn record_keystroke(&self, key_code: u16) -> Result<u32> {
        let mut state = self.state.write().unwrap();
        if !state.running {
            return Err(WitnessError::SessionNotFound {
                id: self.id.to_string(),
            });
        }
        state.keystroke_count += 1;
        let count = state.keystroke_count;
        if count % self.params.sample_interval.max(1) != 0 {
            return Ok(0);
        }

        let document_hash = match hash_document(&self.document_path) {
            Ok(h) => h,
            Err(err) => {
                log::warn!(
                    "session {}: document hash failed, skipping sample: {err}",
                    self.id
                );
                return Ok(0);
            }
        };

        let (jitter, sample) = state.engine.on_keystroke(key_code, document_hash, count);
        if let Some(sample) = sample {
            state.chain.push(sample);
        }
        Ok(jitter)
    }

    /// Freezes the chain: no further samples may be recorded.
    pub fn end(&self) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.running = false;
        state.ended_at = Some(Utc::now());
        log::info!("session {} ended", self.id);
        Ok(())
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.state.read().unwrap();
        SessionStatus {
            id: self.id.to_string(),
            document_path: self.document_path.clone(),
            running: state.running,
            keystroke_count: state.keystroke_count,
            sample_count: state.chain.len(),
            started_at: self.started_at,
            ended_at: state.ended_at,
        }
    }

    pub fn chain_snapshot(&self) -> Vec<Sample> {
        self.state.read().unwrap().chain.clone()
    }

    /// The chain root: the last sample's hash, or all-zero for an empty
    /// chain.
    pub fn chain_root(&self) -> [u8; 32] {
        self.state
            .read()
            .unwrap()
            .chain
            .last()
            .map(|s| s.sample_hash)
            .unwrap_or([0u8; 32])
    }

    pub fn seed(&self) -> [u8; 32] {
        *self.state.read().unwrap().seed
    }

    /// Persists the session (including the secret seed) to
    /// `<tracking_dir>/<id>.json`, creating the directory 0700 and the
    /// file 0600 on unix platforms.
    pub fn save(&self, tracking_dir: &Path) -> Result<()> {
        fs::create_dir_all(tracking_dir)?;
        #[cfg(unix)]
        fs::set_permissions(tracking_dir, fs::Permissions::from_mode(0o700))?;

        let state = self.state.read().unwrap();
        let file = SessionFile {
            id: self.id.to_string(),
            seed_hex: hex::encode(*state.seed),
            document_path: self.document_path.clone(),
            params: self.params,
            chain: state.chain.clone(),
            keystroke_count: state.keystroke_count,
            started_at: self.started_at,
            ended_at: state.ended_at,
        };
        drop(state);

        let path = tracking_dir.join(format!("{}.json", self.id));
        let raw = serde_json::to_vec_pretty(&file)?;
        let mut handle = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        handle.write_all(&raw)?;
        #[cfg(unix)]
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        Ok(())
    }

    /// Restores a session (with seed) from its persisted file.
    pub fn load(tracking_dir: &Path, id: Uuid) -> Result<Self> {
        let path = tracking_dir.join(format!("{id}.json"));
        let raw = fs::read(&path)?;
        let file: SessionFile = serde_json::from_slice(&raw)?;
        let mut seed = [0u8; 32];
        let decoded = hex::decode(&file.seed_hex)
            .map_err(|e| WitnessError::Other(format!("invalid seed hex: {e}")))?;
        if decoded.len() != 32 {
            return Err(WitnessError::Other("seed must be 32 bytes".into()));
        }
        seed.copy_from_slice(&decoded);

        let mut engine = JitterEngine::new(seed);
        // Replay state so a restored engine continues the chain correctly.
        for sample in &file.chain {
            engine.adopt(sample);
        }

        Ok(Self {
            id,
            document_path: file.document_path,
            params: file.params,
            started_at: file.started_at,
            state: RwLock::new(SessionState {
                seed: Zeroizing::new(seed),
                engine,
                chain: file.chain,
                keystroke_count: file.keystroke_count,
                running: file.ended_at.is_none(),
                ended_at: file.ended_at,
            }),
        })
    }

    /// Strips the seed and attaches derived statistics.
    pub fn export(&self) -> SessionExport {
        let state = self.state.read().unwrap();
        let chain_valid = verify_chain_structurally(&state.chain);
        let duration_minutes = (Utc::now() - self.started_at).num_seconds() as f64 / 60.0;
        let unique_hashes = state
            .chain
            .iter()
            .map(|s| s.document_hash)
            .collect::<std::collections::HashSet<_>>()
            .len();

        let statistics = SessionStatistics {
            total_samples: state.chain.len(),
            total_keystrokes: state.keystroke_count,
            keystrokes_per_minute: if duration_minutes > 0.0 {
                state.keystroke_count as f64 / duration_minutes
            } else {
                0.0
            },
            unique_document_hashes: unique_hashes,
            chain_valid,
            typing_profile: state.engine.profile(),
        };

        SessionExport {
            session_id: self.id.to_string(),
            document_path: self.document_path.clone(),
            params: self.params,
            chain: state.chain.clone(),
            started_at: self.started_at,
            ended_at: state.ended_at,
            statistics,
        }
    }
}

/// Chain-valid for export purposes means hash-linked and monotonic, not
/// cryptographically verified (that needs the seed, which export never
/// has). A `JitterMismatch` from [`crate::verifier::verify_with_secret`]
/// run with a dummy key is therefore not itself a structural failure;
/// any other error is.
fn verify_chain_structurally(samples: &[Sample]) -> bool {
    if samples.is_empty() {
        return true;
    }
    match crate::verifier::verify_with_secret(samples, &[0u8; 32]) {
        Ok(()) => true,
        Err(WitnessError::JitterMismatch { .. }) => true,
        Err(_) => false,
    }
}

fn hash_document(path: &Path) -> std::io::Result<[u8; 32]> {
    let bytes = fs::read(path)?;
    Ok(Sha256::digest(&bytes).into())
}

pub fn default_params() -> Parameters {
    jitter::default_parameters()
}
