//! Storage port and backends
//!
//! Persistence for the byte blob behind each slot. The port is deliberately
//! tiny: write, read, delete, delete-all, with last-writer-wins as the only
//! data guarantee. Three interchangeable backends cover the common container
//! situations:
//!
//! - [`MemoryStore`] — in-process map, no cross-process visibility
//! - [`FileStore`] — one file per slot, atomic rename on write
//! - [`LockedFileStore`] — file layout plus advisory locks for containers
//!   shared with writers that do not rename atomically

pub mod file;
pub mod locked;
pub mod memory;

pub use file::FileStore;
pub use locked::LockedFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Opaque byte blob persistence keyed by string identifier
///
/// Implementations must make writes atomic from a reader's point of view:
/// a concurrent reader sees either the previous blob or the new one, never
/// a partial write.
#[async_trait]
pub trait Store: Send + Sync {
    /// Write the blob for a key, replacing any previous value
    async fn write(&self, key: &str, value: Bytes) -> Result<()>;

    /// Read the current blob for a key, or None if absent
    async fn read(&self, key: &str) -> Result<Option<Bytes>>;

    /// Delete the blob for a key; an absent key is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every blob in the container
    async fn delete_all(&self) -> Result<()>;
}
