use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::StoreError;
use crate::util::safe_filename;

use super::store::SessionStore;
use super::ContextSession;

/// File-based session store: one JSON file per account email.
pub struct FileSessionStore {
    sessions_dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(data_dir: &Path) -> Self {
        let sessions_dir = data_dir.join("sessions");
        std::fs::create_dir_all(&sessions_dir).ok();
        Self { sessions_dir }
    }

    fn session_path(&self, email: &str) -> PathBuf {
        self.sessions_dir
            .join(format!("{}.json", safe_filename(email)))
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, email: &str) -> Option<ContextSession> {
        let path = self.session_path(email);
        if !path.exists() {
            return None;
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to read session {}: {}", email, e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("Failed to parse session {}: {}", email, e);
                None
            }
        }
    }

    fn save(&self, session: &ContextSession) -> Result<(), StoreError> {
        let path = self.session_path(&session.email);
        let json = serde_json::to_string_pretty(session)
            .map_err(|e| StoreError::Write(e.to_string()))?;
        std::fs::write(&path, json).map_err(|e| StoreError::Write(e.to_string()))
    }

    fn delete(&self, email: &str) -> bool {
        let path = self.session_path(email);
        if path.exists() {
            std::fs::remove_file(&path).is_ok()
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Stage;
    use serde_json::json;

    #[test]
    fn test_save_and_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(tmp.path());

        let mut session = ContextSession::new("owner@example.com");
        session
            .collected_data
            .insert("business_name".to_string(), json!("Acme"));
        store.save(&session).unwrap();

        let loaded = store.get("owner@example.com").unwrap();
        assert_eq!(loaded.email, "owner@example.com");
        assert_eq!(loaded.stage, Stage::Collecting);
        assert_eq!(loaded.collected_data["business_name"], json!("Acme"));
    }

    #[test]
    fn test_get_missing_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(tmp.path());
        assert!(store.get("nobody@example.com").is_none());
    }

    #[test]
    fn test_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(tmp.path());

        let session = ContextSession::new("owner@example.com");
        store.save(&session).unwrap();
        assert!(store.delete("owner@example.com"));
        assert!(store.get("owner@example.com").is_none());
        assert!(!store.delete("owner@example.com"));
    }

    #[test]
    fn test_save_replaces_prior_row() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(tmp.path());

        let mut session = ContextSession::new("owner@example.com");
        store.save(&session).unwrap();

        session.stage = Stage::Complete;
        store.save(&session).unwrap();

        assert!(store.get("owner@example.com").unwrap().is_complete());
    }
}
