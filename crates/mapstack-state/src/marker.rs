//! MarkerStore — file-backed record of the deployment reflected on disk.
//!
//! The marker is a small text file holding one deployment string. An
//! absent file, an empty file, and a cleared marker all read back as
//! `None`, which callers treat as "unknown, must (re)prepare".

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{StateError, StateResult};

/// File name used when the marker lives inside the data directory.
///
/// Dot-files are skipped by [`crate::is_dir_populated`], so the marker
/// alone never makes a data directory look valid.
pub const DEFAULT_MARKER_FILE: &str = ".mapstack-deployment";

/// Persistent deployment marker for a single service.
#[derive(Debug, Clone)]
pub struct MarkerStore {
    path: PathBuf,
}

impl MarkerStore {
    /// Use the marker file at `path`. Nothing is touched until the first call.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Marker at [`DEFAULT_MARKER_FILE`] inside `data_path`.
    pub fn in_data_dir(data_path: &Path) -> Self {
        Self::new(data_path.join(DEFAULT_MARKER_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the marker. Returns `None` when absent, cleared or empty.
    pub fn get(&self) -> StateResult<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let value = content.trim();
                if value.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(value.to_string()))
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StateError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Record `deployment` as the one reflected on disk.
    ///
    /// The value is written to a sibling temp file and renamed into place,
    /// so a crash mid-write leaves either the old state or the new one.
    pub fn set(&self, deployment: &str) -> StateResult<()> {
        let write_err = |source| StateError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let tmp = self.tmp_path();
        fs::write(&tmp, format!("{deployment}\n")).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)?;

        debug!(path = ?self.path, %deployment, "deployment marker written");
        Ok(())
    }

    /// Forget the recorded deployment. Clearing an absent marker is fine.
    pub fn clear(&self) -> StateResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = ?self.path, "deployment marker cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StateError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Whether the marker currently names `deployment`.
    pub fn matches(&self, deployment: &str) -> StateResult<bool> {
        Ok(self.get()?.as_deref() == Some(deployment))
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, MarkerStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MarkerStore::in_data_dir(dir.path());
        (dir, store)
    }

    #[test]
    fn never_written_reads_absent() {
        let (_dir, store) = store();
        assert_eq!(store.get().unwrap(), None);
        assert!(!store.matches("DE").unwrap());
    }

    #[test]
    fn set_then_get() {
        let (_dir, store) = store();
        store.set("DE").unwrap();
        assert_eq!(store.get().unwrap().as_deref(), Some("DE"));
        assert!(store.matches("DE").unwrap());
        assert!(!store.matches("FR").unwrap());
    }

    #[test]
    fn set_overwrites_previous_value() {
        let (_dir, store) = store();
        store.set("DE").unwrap();
        store.set("europe/france").unwrap();
        assert_eq!(store.get().unwrap().as_deref(), Some("europe/france"));
        assert!(!store.tmp_path().exists());
    }

    #[test]
    fn clear_makes_marker_absent() {
        let (_dir, store) = store();
        store.set("DE").unwrap();
        store.clear().unwrap();
        assert_eq!(store.get().unwrap(), None);

        // Clearing twice is not an error.
        store.clear().unwrap();
    }

    #[test]
    fn empty_file_reads_absent() {
        let (_dir, store) = store();
        fs::write(store.path(), "  \n").unwrap();
        assert_eq!(store.get().unwrap(), None);
    }

    #[test]
    fn survives_reopen() {
        let (dir, store) = store();
        store.set("13.0,52.3,13.8,52.7").unwrap();

        let reopened = MarkerStore::in_data_dir(dir.path());
        assert_eq!(reopened.get().unwrap().as_deref(), Some("13.0,52.3,13.8,52.7"));
    }

    #[test]
    fn set_creates_missing_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = MarkerStore::new(dir.path().join("not/yet/there/marker"));
        store.set("FR").unwrap();
        assert_eq!(store.get().unwrap().as_deref(), Some("FR"));
    }
}
