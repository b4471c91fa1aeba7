//! Store directory layout and locking.
//!
//! ```text
//! <store>/
//! ├─ LOCK              # Advisory lock, one handle per directory
//! ├─ records.log       # Record log
//! └─ records.log.tmp   # Compaction output, renamed over records.log
//! ```
//!
//! Holding the LOCK is what keeps two reconciliation cycles from running
//! against the same on-disk store through different handles.

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "records.log";
const LOG_TEMP: &str = "records.log.tmp";

/// An opened, exclusively locked store directory.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    // Released when the file handle closes.
    _lock_file: File,
}

impl StoreDir {
    /// Opens (and if allowed, creates) the store directory and takes its lock.
    ///
    /// # Errors
    ///
    /// - [`CoreError::StoreMissing`] if absent and `create_if_missing` is off
    /// - [`CoreError::StoreExists`] if a log exists and `error_if_exists` is on
    /// - [`CoreError::NotADirectory`] if `path` is a file
    /// - [`CoreError::StoreLocked`] if another handle holds the lock
    pub fn open(path: &Path, config: &StoreConfig) -> CoreResult<Self> {
        if !path.exists() {
            if !config.create_if_missing {
                return Err(CoreError::StoreMissing {
                    path: path.to_path_buf(),
                });
            }
            fs::create_dir_all(path)?;
        } else if !path.is_dir() {
            return Err(CoreError::NotADirectory {
                path: path.to_path_buf(),
            });
        } else if config.error_if_exists && Self::is_store(path) {
            return Err(CoreError::StoreExists {
                path: path.to_path_buf(),
            });
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::StoreLocked);
        }

        let dir = Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        };

        // Leftover from a compaction that crashed before the rename.
        let temp = dir.temp_log_path();
        if temp.exists() {
            tracing::warn!(path = %temp.display(), "removing stale compaction file");
            fs::remove_file(&temp)?;
        }

        Ok(dir)
    }

    /// Returns true if `path` holds a record log.
    #[must_use]
    pub fn is_store(path: &Path) -> bool {
        path.join(LOG_FILE).is_file()
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the record log path.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }

    /// Returns the compaction output path.
    #[must_use]
    pub fn temp_log_path(&self) -> PathBuf {
        self.path.join(LOG_TEMP)
    }

    /// Atomically replaces the record log with the compaction output.
    ///
    /// The temp file must already be synced.
    pub fn install_temp_log(&self) -> CoreResult<()> {
        fs::rename(self.temp_log_path(), self.log_path())?;
        self.sync_directory()
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> CoreResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> CoreResult<()> {
        // NTFS journals the rename.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("store");

        let dir = StoreDir::open(&path, &StoreConfig::default()).unwrap();
        assert!(path.is_dir());
        assert_eq!(dir.log_path(), path.join("records.log"));
        assert_eq!(dir.path(), path);
        assert!(!StoreDir::is_store(&path));
    }

    #[test]
    fn missing_without_create_fails() {
        let temp = tempdir().unwrap();
        let config = StoreConfig::new().create_if_missing(false);

        let result = StoreDir::open(&temp.path().join("absent"), &config);
        assert!(matches!(result, Err(CoreError::StoreMissing { .. })));
    }

    #[test]
    fn file_location_is_rejected() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("plain-file");
        fs::write(&path, b"not a store").unwrap();

        let result = StoreDir::open(&path, &StoreConfig::default());
        assert!(matches!(result, Err(CoreError::NotADirectory { .. })));
    }

    #[test]
    fn error_if_exists_checks_for_log() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("store");
        fs::create_dir_all(&path).unwrap();
        let config = StoreConfig::new().error_if_exists(true);

        // Empty directory is not a store yet.
        drop(StoreDir::open(&path, &config).unwrap());

        fs::write(path.join("records.log"), b"").unwrap();
        assert!(matches!(
            StoreDir::open(&path, &config),
            Err(CoreError::StoreExists { .. })
        ));
    }

    #[test]
    fn lock_is_exclusive_until_drop() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("store");

        let first = StoreDir::open(&path, &StoreConfig::default()).unwrap();
        assert!(matches!(
            StoreDir::open(&path, &StoreConfig::default()),
            Err(CoreError::StoreLocked)
        ));

        drop(first);
        StoreDir::open(&path, &StoreConfig::default()).unwrap();
    }

    #[test]
    fn stale_temp_file_is_removed() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("store");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("records.log.tmp"), b"half-written").unwrap();

        let dir = StoreDir::open(&path, &StoreConfig::default()).unwrap();
        assert!(!dir.temp_log_path().exists());
    }

    #[test]
    fn install_replaces_log() {
        let temp = tempdir().unwrap();
        let dir = StoreDir::open(&temp.path().join("store"), &StoreConfig::default()).unwrap();
        fs::write(dir.log_path(), b"old").unwrap();
        fs::write(dir.temp_log_path(), b"new").unwrap();

        dir.install_temp_log().unwrap();
        assert_eq!(fs::read(dir.log_path()).unwrap(), b"new");
        assert!(!dir.temp_log_path().exists());
    }
}
