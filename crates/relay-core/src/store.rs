//! Key-value port backing the topic directory, plus the two stores we ship.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::{errors::Error, Result};

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Insert only when `key` is absent.
    ///
    /// Returns the value already stored when there is one (nothing is written in
    /// that case), `None` when the insert happened.
    async fn put_if_absent(&self, key: &str, value: &str) -> Result<Option<String>>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Open the configured store: a JSON file when a path is given, memory otherwise.
pub async fn open(path: Option<&Path>) -> Result<Arc<dyn KvStore>> {
    match path {
        Some(path) => Ok(Arc::new(FileStore::open(path).await?)),
        None => {
            info!("no store path configured; topic mappings will not survive a restart");
            Ok(Arc::new(MemoryStore::default()))
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.inner
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> Result<Option<String>> {
        let mut map = self.inner.lock().await;
        if let Some(existing) = map.get(key) {
            return Ok(Some(existing.clone()));
        }
        map.insert(key.to_string(), value.to_string());
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.lock().await.remove(key);
        Ok(())
    }
}

/// JSON-object file store.
///
/// The whole map is held in memory and rewritten (temp file + rename) on every
/// mutation while the lock is held, so readers never observe a torn file and the
/// in-memory view only changes once the write has landed.
pub struct FileStore {
    path: PathBuf,
    inner: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let map: BTreeMap<String, String> = match tokio::fs::read_to_string(&path).await {
            Ok(txt) if txt.trim().is_empty() => BTreeMap::new(),
            Ok(txt) => serde_json::from_str(&txt).map_err(|e| {
                Error::Store(format!("corrupt store file {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await?;
                }
                BTreeMap::new()
            }
            Err(e) => return Err(Error::Io(e)),
        };

        info!(path = %path.display(), entries = map.len(), "opened file store");
        Ok(Self {
            path,
            inner: Mutex::new(map),
        })
    }

    async fn persist(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let txt = serde_json::to_string_pretty(map)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, txt).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn mutate(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let mut map = self.inner.lock().await;
        let mut next = map.clone();
        f(&mut next);
        self.persist(&next).await?;
        *map = next;
        Ok(())
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.mutate(|m| {
            m.insert(key.to_string(), value.to_string());
        })
        .await
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> Result<Option<String>> {
        let mut map = self.inner.lock().await;
        if let Some(existing) = map.get(key) {
            return Ok(Some(existing.clone()));
        }
        let mut next = map.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next).await?;
        *map = next;
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.mutate(|m| {
            m.remove(key);
        })
        .await
    }
}
