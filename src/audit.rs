//! Append-only JSON-lines audit trail, kept separate from operational
//! logging. Rotated by size (gzipping the rotated file) and by age
//! (deleting rotated files past a retention window).

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::error::Result;

const SENSITIVE_KEYS: &[&str] = &[
    "password", "secret", "token", "key", "credential", "private", "auth", "session", "cookie",
    "bearer",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    SessionStart,
    SessionEnd,
    Checkpoint,
    KeyGenerated,
    Verification,
    Anchor,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Success,
    Failure,
    Denied,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DetailValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Bytes(#[serde(with = "hex_bytes")] Vec<u8>),
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub component: String,
    pub session_id: Option<String>,
    pub action: String,
    pub resource: Option<String>,
    pub result: AuditResult,
    pub details: BTreeMap<String, DetailValue>,
}

/// Redacts any key in [`SENSITIVE_KEYS`] (case-insensitive substring
/// match) before the event is ever serialized.
fn redact(details: &BTreeMap<String, DetailValue>) -> BTreeMap<String, DetailValue> {
    details
        .iter()
        .map(|(k, v)| {
            let lower = k.to_lowercase();
            if SENSITIVE_KEYS.iter().any(|s| lower.contains(s)) {
                (k.clone(), DetailValue::String("[REDACTED]".into()))
            } else {
                (k.clone(), v.clone())
            }
        })
        .collect()
}

pub struct AuditLogConfig {
    pub path: PathBuf,
    pub max_size_bytes: u64,
    pub max_age_days: i64,
}

impl Default for AuditLogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("audit.log.jsonl"),
            max_size_bytes: 10 * 1024 * 1024,
            max_age_days: 90,
        }
    }
}

pub struct AuditLog {
    config: AuditLogConfig,
    writer: Mutex<()>,
}

impl AuditLog {
    pub fn new(config: AuditLogConfig) -> Self {
        Self {
            config,
            writer: Mutex::new(()),
        }
    }

    /// Appends one JSON line, redacting sensitive detail keys first, then
    /// rotates if the file now exceeds the configured size.
    pub fn record(&self, mut event: AuditEvent) -> Result<()> {
        event.details = redact(&event.details);
        let line = serde_json::to_string(&event)?;

        let _guard = self.writer.lock().unwrap();
        if let Some(parent) = self.config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.path)?;
        writeln!(file, "{line}")?;
        drop(file);

        self.rotate_if_needed()?;
        Ok(())
    }

    fn rotate_if_needed(&self) -> Result<()> {
        let metadata = match fs::metadata(&self.config.path) {
            Ok(m) => m,
            Err(_) => return Ok(()),
        };
        if metadata.len() < self.config.max_size_bytes {
            return Ok(());
        }

        let rotated_name = format!(
            "{}.{}.gz",
            self.config.path.display(),
            Utc::now().format("%Y%m%dT%H%M%S")
        );
        let rotated_path = PathBuf::from(&rotated_name);

        let raw = fs::read(&self.config.path)?;
        let gz_file = File::create(&rotated_path)?;
        let mut encoder = GzEncoder::new(gz_file, Compression::default());
        encoder.write_all(&raw)?;
        encoder.finish()?;

        fs::write(&self.config.path, b"")?;
        self.prune_aged_rotations()?;
        Ok(())
    }

    fn prune_aged_rotations(&self) -> Result<()> {
        let parent = self
            .config
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let prefix = self
            .config
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let cutoff = Utc::now() - chrono::Duration::days(self.config.max_age_days);
        for entry in fs::read_dir(parent)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(&prefix) || !name.ends_with(".gz") {
                continue;
            }
            if let Ok(metadata) = entry.metadata() {
                if let Ok(modified) = metadata.modified() {
                    let modified: DateTime<Utc> = modified.into();
                    if modified < cutoff {
                        let _ = fs::remove_file(entry.path());
                    }
                }
            }
        }
        Ok(())
    }

    /// Reads back every event currently in the live (unrotated) log file.
    pub fn read_all(&self) -> Result<Vec<AuditEvent>> {
        let file = match File::open(&self.config.path) {
            Ok(f) => f,
            Err(_) => return Ok(Vec::new()),
        };
        let reader = BufReader::new(file);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }
        Ok(events)
    }
}
