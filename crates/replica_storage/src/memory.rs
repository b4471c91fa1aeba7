//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// An in-memory storage backend.
///
/// Clones share the same buffer, so a test can keep one clone to observe the
/// bytes while the store owns another.
///
/// Writes can be made to fail on demand with [`fail_after`](Self::fail_after),
/// which is how partial-application paths of the reconciler are exercised.
///
/// # Example
///
/// ```rust
/// use replica_storage::{InMemoryBackend, StorageBackend};
///
/// let observer = InMemoryBackend::new();
/// let mut writer = observer.clone();
/// writer.append(b"abc").unwrap();
/// assert_eq!(observer.data(), b"abc");
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
    // Remaining appends before every write fails. `None` never fails.
    budget: Arc<Mutex<Option<u64>>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend holding `data`, as if it had been appended earlier.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
            budget: Arc::default(),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Lets `appends` more appends succeed, then fails every later write.
    pub fn fail_after(&self, appends: u64) {
        *self.budget.lock() = Some(appends);
    }

    /// Removes any injected fault.
    pub fn heal(&self) {
        *self.budget.lock() = None;
    }

    fn spend_write(&self) -> StorageResult<()> {
        let mut budget = self.budget.lock();
        match budget.as_mut() {
            None => Ok(()),
            Some(0) => Err(StorageError::InjectedFault),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
        }
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        let start = offset as usize;
        Ok(data[start..start + len].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        self.spend_write()?;
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }
        data.truncate(new_size as usize);
        Ok(())
    }
}
