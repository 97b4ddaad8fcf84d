//! Durable namespace storage on the local filesystem.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<namespace>/<sha256(key)>.entry
//! ```
//!
//! Each `.entry` file holds one line of JSON metadata (key, status,
//! headers) followed by the raw body bytes. Files are written to a
//! temporary name and renamed into place, so a reader sees either the old
//! or the new entry. A batch is staged as a complete copy of its namespace
//! in a hidden directory, which then replaces the live one; deleted
//! namespaces are renamed away before removal.
//! Hidden (dot-prefixed) directories are never reported as namespaces.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use super::models::CacheEntry;
use super::store::CacheStore;
use crate::error::{ProxyError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const ENTRY_EXTENSION: &str = "entry";

#[derive(Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    status: u16,
    headers: Vec<(String, String)>,
}

pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Open (or create) a store rooted at `root`, removing leftovers of
    /// interrupted batches and deletions.
    pub async fn open_at(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;

        let mut dir = fs::read_dir(&root).await?;
        while let Some(item) = dir.next_entry().await? {
            let name = item.file_name().to_string_lossy().to_string();
            if name.starts_with('.') && item.file_type().await?.is_dir() {
                debug!("Removing leftover {}", name);
                fs::remove_dir_all(item.path()).await?;
            }
        }

        Ok(Self { root })
    }

    fn namespace_dir(&self, namespace: &str) -> Result<PathBuf> {
        let valid = !namespace.is_empty()
            && !namespace.starts_with('.')
            && namespace
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.');
        if !valid {
            return Err(ProxyError::Storage(format!(
                "invalid namespace name {:?}",
                namespace
            )));
        }
        Ok(self.root.join(namespace))
    }

    fn scratch_path(&self, kind: &str) -> PathBuf {
        self.root
            .join(format!(".{}-{}", kind, uuid::Uuid::new_v4().simple()))
    }

    fn file_name(key: &str) -> String {
        let digest = Sha256::digest(key.as_bytes());
        format!("{}.{}", hex::encode(digest), ENTRY_EXTENSION)
    }

    fn encode(entry: &CacheEntry) -> Result<Vec<u8>> {
        let meta = EntryMeta {
            key: entry.key.clone(),
            status: entry.status,
            headers: entry.headers.clone(),
        };
        let mut buf = serde_json::to_vec(&meta)?;
        buf.push(b'\n');
        buf.extend_from_slice(&entry.body);
        Ok(buf)
    }

    fn decode(raw: Vec<u8>) -> Result<CacheEntry> {
        let split = raw
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| ProxyError::Storage("entry file has no metadata line".to_string()))?;
        let meta: EntryMeta = serde_json::from_slice(&raw[..split])?;
        let body = Bytes::from(raw).slice(split + 1..);
        Ok(CacheEntry {
            key: meta.key,
            status: meta.status,
            headers: meta.headers,
            body,
        })
    }

    /// Replace `dir` with `staging` in two renames. If the second rename
    /// fails the old directory is moved back.
    async fn swap_in(&self, staging: &Path, dir: &Path) -> Result<()> {
        let trash = self.scratch_path("trash");
        let replaced = match fs::rename(dir, &trash).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = fs::rename(staging, dir).await {
            if replaced {
                if let Err(restore) = fs::rename(&trash, dir).await {
                    warn!("Could not restore {}: {}", dir.display(), restore);
                }
            }
            return Err(e.into());
        }

        if replaced {
            if let Err(e) = fs::remove_dir_all(&trash).await {
                warn!("Could not remove replaced namespace {}: {}", trash.display(), e);
            }
        }
        Ok(())
    }

    async fn write_atomic(dir: &Path, file_name: &str, contents: &[u8]) -> Result<()> {
        let tmp = dir.join(format!(".tmp-{}", uuid::Uuid::new_v4().simple()));
        fs::write(&tmp, contents).await?;
        if let Err(e) = fs::rename(&tmp, dir.join(file_name)).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for DiskStore {
    async fn open(&self, namespace: &str) -> Result<()> {
        fs::create_dir_all(self.namespace_dir(namespace)?).await?;
        Ok(())
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.namespace_dir(namespace)?.join(Self::file_name(key));
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry = Self::decode(raw)?;
        if entry.key != key {
            warn!("Hash collision in {}: stored {} for {}", namespace, entry.key, key);
            return Ok(None);
        }
        Ok(Some(entry))
    }

    async fn put(&self, namespace: &str, entry: CacheEntry) -> Result<()> {
        let dir = self.namespace_dir(namespace)?;
        fs::create_dir_all(&dir).await?;
        let contents = Self::encode(&entry)?;
        Self::write_atomic(&dir, &Self::file_name(&entry.key), &contents).await
    }

    async fn put_all(&self, namespace: &str, entries: Vec<CacheEntry>) -> Result<()> {
        let dir = self.namespace_dir(namespace)?;
        let staging = self.scratch_path("staging");
        fs::create_dir_all(&staging).await?;

        // The staging directory becomes the whole namespace: existing
        // entries are copied in first, then the batch is written over them.
        let staged = async {
            match fs::read_dir(&dir).await {
                Ok(mut existing) => {
                    while let Some(item) = existing.next_entry().await? {
                        let path = item.path();
                        if path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION) {
                            fs::copy(&path, staging.join(item.file_name())).await?;
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            for entry in &entries {
                fs::write(staging.join(Self::file_name(&entry.key)), Self::encode(entry)?).await?;
            }
            Ok::<_, ProxyError>(())
        }
        .await;

        let result = match staged {
            Ok(()) => self.swap_in(&staging, &dir).await,
            Err(e) => Err(e),
        };

        if fs::metadata(&staging).await.is_ok() {
            let _ = fs::remove_dir_all(&staging).await;
        }
        result
    }

    async fn delete(&self, namespace: &str) -> Result<bool> {
        let dir = self.namespace_dir(namespace)?;
        let trash = self.scratch_path("trash");
        match fs::rename(&dir, &trash).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        fs::remove_dir_all(&trash).await?;
        Ok(true)
    }

    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(item) = dir.next_entry().await? {
            let name = item.file_name().to_string_lossy().to_string();
            if !name.starts_with('.') && item.file_type().await?.is_dir() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn len(&self, namespace: &str) -> Result<usize> {
        let mut dir = match fs::read_dir(self.namespace_dir(namespace)?).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut count = 0;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION) {
                count += 1;
            }
        }
        Ok(count)
    }

    fn name(&self) -> &'static str {
        "disk"
    }
}
