//! Embedded key-value store backing the fingerprint caches

use crate::Result;
use rocksdb::DB;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Handle to the embedded cache database.
///
/// One database per cache directory; logical sub-stores share the key
/// space through name prefixes, so a job's data and config entries live
/// side by side under `<name>:` and `<name>_config:`.
#[derive(Clone)]
pub struct CacheStore {
    db: Arc<DB>,
}

impl CacheStore {
    /// Open (or create) the cache database at the given directory.
    pub fn open(path: &Path) -> Result<Self> {
        let db = DB::open_default(path)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// A named sub-store sharing this database.
    pub fn sub_store(&self, name: &str) -> SubStore {
        SubStore {
            db: self.db.clone(),
            prefix: format!("{name}:"),
        }
    }

    /// Force buffered writes to disk. Called when a run is torn down.
    pub async fn flush(&self) -> Result<()> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.flush()).await??;
        Ok(())
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore").finish_non_exhaustive()
    }
}

/// One logical key space inside the cache database.
///
/// Values are serialized as JSON. Reads and writes hop through the
/// blocking pool so cache access stays a cooperative suspension point.
#[derive(Clone)]
pub struct SubStore {
    db: Arc<DB>,
    prefix: String,
}

impl SubStore {
    fn full_key(&self, key: &str) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.prefix.len() + key.len());
        full.extend_from_slice(self.prefix.as_bytes());
        full.extend_from_slice(key.as_bytes());
        full
    }

    /// Look up and deserialize a value.
    pub async fn get<T: DeserializeOwned + Send + 'static>(&self, key: &str) -> Result<Option<T>> {
        let db = self.db.clone();
        let full = self.full_key(key);
        let bytes = tokio::task::spawn_blocking(move || db.get(full)).await??;
        match bytes {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Serialize and store a value. Written entries are visible to every
    /// subsequent lookup.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let db = self.db.clone();
        let full = self.full_key(key);
        let bytes = serde_json::to_vec(value)?;
        tokio::task::spawn_blocking(move || db.put(full, bytes)).await??;
        Ok(())
    }
}
