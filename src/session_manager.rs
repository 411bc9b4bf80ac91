//! Owns the set of live sessions and enforces one active session per
//! absolute document path. The map lock is never held across a `Session`
//! operation: it is taken only to look up or insert/remove a handle.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::error::{Result, WitnessError};
use crate::jitter::Parameters;
use crate::session::{Session, SessionStatus};

pub struct SessionManager {
    tracking_dir: PathBuf,
    active: RwLock<Vec<Arc<Session>>>,
}

impl SessionManager {
    pub fn new(tracking_dir: impl Into<PathBuf>) -> Self {
        Self {
            tracking_dir: tracking_dir.into(),
            active: RwLock::new(Vec::new()),
        }
    }

    fn canonicalize(&self, document_path: &Path) -> Result<PathBuf> {
        if document_path.exists() {
            Ok(document_path.canonicalize()?)
        } else {
            // Allow starting a session for a document that doesn't exist
            // yet (the first keystroke creates it); fall back to an
            // absolute, non-canonicalized path.
            let absolute = if document_path.is_absolute() {
                document_path.to_path_buf()
            } else {
                std::env::current_dir()?.join(document_path)
            };
            Ok(absolute)
        }
    }

    /// Canonicalizes `document_path`, rejects a second session over the
    /// same document, and creates + starts a new one.
    pub fn start_session(&self, document_path: &Path, params: Parameters) -> Result<Arc<Session>> {
        let canonical = self.canonicalize(document_path)?;

        {
            let active = self.active.read().unwrap();
            if active.iter().any(|s| s.document_path == canonical) {
                return Err(WitnessError::DuplicateDocument {
                    path: canonical.display().to_string(),
                });
            }
        }

        let session = Arc::new(Session::new(canonical, params));
        session.start()?;

        let mut active = self.active.write().unwrap();
        if active.iter().any(|s| s.document_path == session.document_path) {
            // Lost a race between the read check and this write lock.
            return Err(WitnessError::DuplicateDocument {
                path: session.document_path.display().to_string(),
            });
        }
        active.push(Arc::clone(&session));
        Ok(session)
    }

    fn take_by_id(&self, id: Uuid) -> Option<Arc<Session>> {
        let mut active = self.active.write().unwrap();
        let pos = active.iter().position(|s| s.id == id)?;
        Some(active.remove(pos))
    }

    /// Ends and persists the session, then removes it from the active set.
    pub fn stop_session(&self, id: Uuid) -> Result<()> {
        let session = self
            .take_by_id(id)
            .ok_or(WitnessError::SessionNotFound { id: id.to_string() })?;
        session.end()?;
        session.save(&self.tracking_dir)?;
        Ok(())
    }

    /// Stops every active session, accumulating failures but always
    /// attempting to save each one.
    pub fn stop_all(&self) -> Vec<(Uuid, Result<()>)> {
        let sessions: Vec<Arc<Session>> = {
            let mut active = self.active.write().unwrap();
            active.drain(..).collect()
        };

        sessions
            .into_iter()
            .map(|session| {
                let id = session.id;
                let result = session.end().and_then(|_| session.save(&self.tracking_dir));
                (id, result)
            })
            .collect()
    }

    pub fn status(&self, id: Uuid) -> Result<SessionStatus> {
        let active = self.active.read().unwrap();
        active
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.status())
            .ok_or(WitnessError::SessionNotFound { id: id.to_string() })
    }

    pub fn active_sessions(&self) -> Vec<Arc<Session>> {
        self.active.read().unwrap().clone()
    }

    /// Enumerates `*.json` session files in the tracking directory,
    /// excluding any `.secure.json` export alongside them.
    pub fn list_saved_sessions(&self) -> Result<Vec<Uuid>> {
        if !self.tracking_dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.tracking_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.ends_with(".json") || name.ends_with(".secure.json") {
                continue;
            }
            let stem = name.trim_end_matches(".json");
            if let Ok(id) = Uuid::parse_str(stem) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jitter::default_parameters;
    use tempfile::tempdir;

    #[test]
    fn duplicate_document_is_rejected() {
        let dir = tempdir().unwrap();
        let tracking = dir.path().join("tracking");
        let doc = dir.path().join("doc.txt");
        fs::write(&doc, "hello").unwrap();

        let manager = SessionManager::new(&tracking);
        let first = manager.start_session(&doc, default_parameters()).unwrap();
        let second = manager.start_session(&doc, default_parameters());
        assert!(second.is_err());
        manager.stop_session(first.id).unwrap();
    }

    #[test]
    fn stop_session_persists_and_removes_from_active_set() {
        let dir = tempdir().unwrap();
        let tracking = dir.path().join("tracking");
        let doc = dir.path().join("doc.txt");
        fs::write(&doc, "hello").unwrap();

        let manager = SessionManager::new(&tracking);
        let session = manager.start_session(&doc, default_parameters()).unwrap();
        let id = session.id;
        manager.stop_session(id).unwrap();

        assert!(manager.status(id).is_err());
        let saved = manager.list_saved_sessions().unwrap();
        assert!(saved.contains(&id));
    }

    #[test]
    fn stop_all_drains_active_set() {
        let dir = tempdir().unwrap();
        let tracking = dir.path().join("tracking");
        let manager = SessionManager::new(&tracking);

        for i in 0..3 {
            let doc = dir.path().join(format!("doc{i}.txt"));
            fs::write(&doc, "hello").unwrap();
            manager.start_session(&doc, default_parameters()).unwrap();
        }
        assert_eq!(manager.active_sessions().len(), 3);

        let results = manager.stop_all();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(manager.active_sessions().len(), 0);
    }

    #[test]
    fn stop_unknown_session_errors() {
        let dir = tempdir().unwrap();
        let manager = SessionManager::new(dir.path().join("tracking"));
        let err = manager.stop_session(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, WitnessError::SessionNotFound { .. }));
    }
}
