//! The storage backend trait.

use crate::error::StorageResult;

/// An append-only byte store.
///
/// The record log appends whole frames and replays them from offset zero on
/// open; it never rewrites bytes in place. The only destructive operation is
/// [`truncate`](StorageBackend::truncate), used to drop a torn tail frame
/// left behind by a crash.
///
/// # Invariants
///
/// - `append` returns the offset of the first appended byte
/// - `read_at` returns exactly the bytes previously appended at that offset
/// - after `sync` returns, every appended byte survives process termination
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`](crate::StorageError::ReadPastEnd)
    /// if the range extends past the current size.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    fn flush(&mut self) -> StorageResult<()>;

    /// Makes all appended data and file metadata durable.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes.
    fn size(&self) -> StorageResult<u64>;

    /// Discards everything after `new_size`.
    ///
    /// # Errors
    ///
    /// Fails if `new_size` is larger than the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Reads the whole store.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        let len = usize::try_from(size).map_err(|_| crate::StorageError::ReadPastEnd {
            offset: 0,
            len: usize::MAX,
            size,
        })?;
        self.read_at(0, len)
    }
}
