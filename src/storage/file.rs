//! Shared-directory storage backend
//!
//! One file per slot inside the shared container directory. Writes land in
//! a temp file in the same directory followed by a rename, so readers in
//! any process observe either the previous blob or the new one, never a
//! torn write. Key names are hex-encoded into file names so arbitrary key
//! bytes cannot escape the container or collide with path syntax.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};

use super::Store;

/// File name extension for stored blobs
pub(crate) const BLOB_EXT: &str = "blob";

/// Source of unique temp file suffixes within this process
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Hex-encode a key into a container-safe file stem
pub(crate) fn encode_key(key: &str) -> String {
    let mut stem = String::with_capacity(key.len() * 2);
    for byte in key.bytes() {
        stem.push_str(&format!("{:02x}", byte));
    }
    stem
}

/// Path of the blob file for a key inside a container directory
pub(crate) fn blob_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.{}", encode_key(key), BLOB_EXT))
}

/// Unique sibling path used while a write is in flight
pub(crate) fn tmp_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!(
        "{}.tmp.{}.{}",
        encode_key(key),
        std::process::id(),
        TMP_SEQ.fetch_add(1, Ordering::Relaxed)
    ))
}

/// Shared-directory store with atomic rename on write
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store over the given container directory, creating it if needed
    ///
    /// Fails with a configuration error if the directory cannot be created;
    /// that is fatal to initialization and never retried.
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

#[async_trait]
impl Store for FileStore {
    async fn write(&self, key: &str, value: Bytes) -> Result<()> {
        let tmp = tmp_path(&self.dir, key);
        let path = blob_path(&self.dir, key);

        tokio::fs::write(&tmp, &value).await?;
        tokio::fs::rename(&tmp, &path).await?;

        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<Bytes>> {
        match tokio::fs::read(blob_path(&self.dir, key)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(blob_path(&self.dir, key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_all(&self) -> Result<()> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            // Leave in-flight temp files alone; their rename will land or
            // they belong to another writer.
            if path.extension().map(|ext| ext == BLOB_EXT).unwrap_or(false) {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        store.write("counter", Bytes::from_static(b"1")).await.unwrap();
        assert_eq!(
            store.read("counter").await.unwrap(),
            Some(Bytes::from_static(b"1"))
        );
    }

    #[tokio::test]
    async fn test_absent_key_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        assert_eq!(store.read("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite_keeps_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        store.write("counter", Bytes::from_static(b"1")).await.unwrap();
        store.write("counter", Bytes::from_static(b"2")).await.unwrap();

        assert_eq!(
            store.read("counter").await.unwrap(),
            Some(Bytes::from_static(b"2"))
        );
    }

    #[tokio::test]
    async fn test_hostile_key_names_stay_in_container() {
        let dir = tempfile::tempdir().unwrap();
        let container = dir.path().join("container");
        let store = FileStore::new(&container).unwrap();

        for key in ["../escape", "a/b/c", "über schlüssel", ".."] {
            store.write(key, Bytes::from_static(b"x")).await.unwrap();
            assert_eq!(
                store.read(key).await.unwrap(),
                Some(Bytes::from_static(b"x")),
                "key {:?}",
                key
            );
        }

        // Nothing may have landed outside the container directory.
        let outside = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(outside, 1);
    }

    #[tokio::test]
    async fn test_delete_and_delete_all() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        store.write("a", Bytes::from_static(b"1")).await.unwrap();
        store.write("b", Bytes::from_static(b"2")).await.unwrap();

        store.delete("a").await.unwrap();
        assert_eq!(store.read("a").await.unwrap(), None);
        store.delete("a").await.unwrap(); // absent is not an error

        store.delete_all().await.unwrap();
        assert_eq!(store.read("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_two_stores_share_one_container() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FileStore::new(dir.path()).unwrap();
        let reader = FileStore::new(dir.path()).unwrap();

        writer.write("counter", Bytes::from_static(b"42")).await.unwrap();

        assert_eq!(
            reader.read("counter").await.unwrap(),
            Some(Bytes::from_static(b"42"))
        );
    }
}
