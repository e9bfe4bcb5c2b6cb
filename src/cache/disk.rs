//! Local disk durable store
//!
//! Keeps one file per durable key under a cache directory. Writes go through
//! a temp file in the same directory and are persisted atomically, so a
//! reader never sees a half-written object. Nothing here ever expires.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sha1::{Digest, Sha1};
use tracing::{debug, info};

use crate::tier::DurableStore;

/// Durable store writing objects to a local directory
#[derive(Debug, Clone)]
pub struct DiskStore {
    /// Root directory for stored objects
    root: PathBuf,
}

impl DiskStore {
    /// Default store location under the platform cache directory
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("wikistash")
    }

    /// Open a store rooted at `root`, creating it if needed
    pub fn open(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create store directory: {:?}", root))?;

        let store = Self { root };
        store.cleanup();

        info!(root = %store.root.display(), "Disk store initialized");
        Ok(store)
    }

    /// Remove temp files left behind by interrupted writes
    pub fn cleanup(&self) {
        if let Ok(read_dir) = fs::read_dir(&self.root) {
            for entry in read_dir.flatten() {
                let path = entry.path();
                if path.extension().map(|ext| ext == "tmp").unwrap_or(false) {
                    debug!(path = %path.display(), "Removing stale temp file");
                    let _ = fs::remove_file(&path);
                }
            }
        }
    }

    /// Map a durable key to a single file name inside the root.
    ///
    /// The name is the SHA1 of the key: fixed length whatever the title, and
    /// distinct for keys that differ only in case.
    fn key_to_path(&self, key: &str) -> PathBuf {
        let digest = Sha1::digest(key.as_bytes());
        self.root.join(format!("{:x}.json", digest))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("/tmp"));
    let mut tmp = tempfile::Builder::new()
        .suffix(".tmp")
        .tempfile_in(parent)
        .context("Failed to create temp file")?;

    tmp.write_all(data).context("Failed to write object")?;

    tmp.persist(path)
        .with_context(|| format!("Failed to persist object: {:?}", path))?;
    Ok(())
}

#[async_trait]
impl DurableStore for DiskStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.key_to_path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!(key = key, size = bytes.len(), "Read object from disk");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read object: {:?}", path)),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let path = self.key_to_path(key);
        let size = value.len();

        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, &value))
            .await
            .context("Disk write task failed")??;

        debug!(key = key, path = %path.display(), size = size, "Stored object on disk");
        Ok(())
    }
}
