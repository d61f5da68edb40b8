//! Lock-coordinated storage backend
//!
//! Same container layout as [`FileStore`](super::FileStore), but every read
//! and write holds an advisory file lock for its duration. Use this when the
//! container is shared with writers that rewrite blobs in place instead of
//! renaming, where the rename-based store could observe a torn write.
//!
//! Advisory locks are blocking calls, so all I/O here runs on the blocking
//! thread pool.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use fs2::FileExt;

use crate::error::{Error, Result};

use super::file::{blob_path, BLOB_EXT};
use super::Store;

/// Shared-directory store holding advisory locks across each operation
pub struct LockedFileStore {
    dir: PathBuf,
}

impl LockedFileStore {
    /// Open a store over the given container directory, creating it if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::Config(format!("cannot create container {}: {}", dir.display(), e))
        })?;

        Ok(Self { dir })
    }

    /// The container directory this store writes into
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Run a blocking storage operation on the blocking pool
async fn blocking<T, F>(op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| Error::Storage(io::Error::new(io::ErrorKind::Other, e)))?
}

#[async_trait]
impl Store for LockedFileStore {
    async fn write(&self, key: &str, value: Bytes) -> Result<()> {
        let path = blob_path(&self.dir, key);
        blocking(move || {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .open(&path)?;
            file.lock_exclusive()?;
            file.set_len(0)?;
            file.write_all(&value)?;
            file.sync_all()?;
            // Lock releases when the handle closes.
            Ok(())
        })
        .await
    }

    async fn read(&self, key: &str) -> Result<Option<Bytes>> {
        let path = blob_path(&self.dir, key);
        blocking(move || {
            let mut file = match File::open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            file.lock_shared()?;

            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            Ok(Some(Bytes::from(buf)))
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = blob_path(&self.dir, key);
        blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn delete_all(&self) -> Result<()> {
        let dir = self.dir.clone();
        blocking(move || {
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().map(|ext| ext == BLOB_EXT).unwrap_or(false) {
                    match std::fs::remove_file(&path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            Ok(())
        })
        .await
    }
}
