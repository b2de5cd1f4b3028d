//! Data-directory inspection: validity and disk usage.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{StateError, StateResult};

const UNITS: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];

/// Whether `path` is a directory holding at least one non-hidden entry.
///
/// A missing directory is simply not populated.
pub fn is_dir_populated(path: &Path) -> bool {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() == ErrorKind::NotFound {
                debug!(?path, "data directory does not exist");
            } else {
                debug!(?path, error = %e, "data directory not readable");
            }
            return false;
        }
    };

    let populated = entries
        .filter_map(Result::ok)
        .any(|entry| !entry.file_name().to_string_lossy().starts_with('.'));

    if !populated {
        debug!(?path, "data directory exists but is empty");
    }
    populated
}

/// Total size in bytes of all files below `path`.
pub fn dir_size(path: &Path) -> StateResult<u64> {
    let mut total = 0;
    for entry in WalkDir::new(path) {
        let entry = entry.map_err(|e| StateError::Walk(e.to_string()))?;
        if entry.file_type().is_file() {
            let meta = entry
                .metadata()
                .map_err(|e| StateError::Walk(e.to_string()))?;
            total += meta.len();
        }
    }
    Ok(total)
}

/// Human-readable size of the data directory, or `None` if it is missing.
pub fn disk_usage(path: &Path) -> StateResult<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    dir_size(path).map(|bytes| Some(format_bytes(bytes)))
}

/// Format a byte count in 1024 steps with up to two decimals.
///
/// Trailing zeros are dropped: `0 B`, `1 KB`, `1.5 KB`, `2.34 GB`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let fixed = format!("{value:.2}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_bytes(2_512_555_000), "2.34 GB");
    }

    #[test]
    fn missing_dir_is_not_populated() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_dir_populated(&dir.path().join("missing")));
    }

    #[test]
    fn hidden_files_do_not_count() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_dir_populated(dir.path()));

        fs::write(dir.path().join(".mapstack-deployment"), "DE").unwrap();
        assert!(!is_dir_populated(dir.path()));

        fs::create_dir(dir.path().join("node_1")).unwrap();
        assert!(is_dir_populated(dir.path()));
    }

    #[test]
    fn dir_size_is_recursive() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), vec![0u8; 1000]).unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.bin"), vec![0u8; 24]).unwrap();

        assert_eq!(dir_size(dir.path()).unwrap(), 1024);
        assert_eq!(disk_usage(dir.path()).unwrap().as_deref(), Some("1 KB"));
    }

    #[test]
    fn disk_usage_of_missing_dir_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(disk_usage(&dir.path().join("gone")).unwrap(), None);
    }
}
