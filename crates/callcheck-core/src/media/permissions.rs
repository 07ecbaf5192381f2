//! Remembered media permission state
//!
//! The last granted or denied outcome of opening a capture device is kept as
//! a single string value so the next session can show it before asking again.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    #[default]
    Unknown,
}

impl PermissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
            PermissionState::Unknown => "unknown",
        }
    }

    /// Parse a stored value; anything unrecognised is `Unknown`
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "granted" => PermissionState::Granted,
            "denied" => PermissionState::Denied,
            _ => PermissionState::Unknown,
        }
    }
}

impl std::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read/write of the single remembered permission value
pub trait PermissionStore: Send + Sync {
    fn load(&self) -> PermissionState;
    fn save(&self, state: PermissionState) -> std::io::Result<()>;
}

/// File-backed store under the application data directory
#[derive(Debug, Clone)]
pub struct FilePermissionStore {
    path: PathBuf,
}

impl FilePermissionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_dir>/callcheck/media_permissions`
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("callcheck")
            .join("media_permissions")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FilePermissionStore {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}

impl PermissionStore for FilePermissionStore {
    fn load(&self) -> PermissionState {
        match std::fs::read_to_string(&self.path) {
            Ok(value) => PermissionState::parse(&value),
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "permission_state_unavailable");
                PermissionState::Unknown
            }
        }
    }

    fn save(&self, state: PermissionState) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, state.as_str())?;
        tracing::debug!(path = %self.path.display(), state = %state, "permission_state_saved");
        Ok(())
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryPermissionStore {
    state: Mutex<PermissionState>,
}

impl MemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PermissionStore for MemoryPermissionStore {
    fn load(&self) -> PermissionState {
        self.state.lock().map(|s| *s).unwrap_or_default()
    }

    fn save(&self, state: PermissionState) -> std::io::Result<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        *guard = state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        for state in [
            PermissionState::Granted,
            PermissionState::Denied,
            PermissionState::Unknown,
        ] {
            assert_eq!(PermissionState::parse(state.as_str()), state);
        }
        assert_eq!(PermissionState::parse("prompt"), PermissionState::Unknown);
        assert_eq!(PermissionState::parse("granted\n"), PermissionState::Granted);
    }

    #[test]
    fn test_file_store_missing_file_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePermissionStore::new(dir.path().join("missing"));
        assert_eq!(store.load(), PermissionState::Unknown);
    }

    #[test]
    fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("media_permissions");
        let store = FilePermissionStore::new(&path);
        store.save(PermissionState::Denied).unwrap();

        let reopened = FilePermissionStore::new(&path);
        assert_eq!(reopened.load(), PermissionState::Denied);
        assert_eq!(std::fs::read_to_string(path).unwrap(), "denied");
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryPermissionStore::new();
        assert_eq!(store.load(), PermissionState::Unknown);
        store.save(PermissionState::Granted).unwrap();
        assert_eq!(store.load(), PermissionState::Granted);
    }
}
