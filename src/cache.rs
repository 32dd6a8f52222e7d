//! Content-keyed memoization of per-file computations

use crate::store::{CacheStore, SubStore};
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// A durable, config-aware memoized computation.
///
/// Each job owns a data sub-store and a parallel `<name>_config` sub-store
/// keyed identically. A cached value counts as a hit only when the config
/// recorded next to it equals the job's current config by canonical
/// serialization; stale entries are recomputed silently.
///
/// Concurrent lookups of the same key are single-flighted: the work runs
/// exactly once and the other callers observe the stored result. The
/// per-key locks are created lazily and evicted once no caller holds them.
pub struct CachedJob<C, R> {
    data: SubStore,
    config_store: SubStore,
    config: C,
    config_fingerprint: String,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    _result: std::marker::PhantomData<fn() -> R>,
}

impl<C, R> CachedJob<C, R>
where
    C: Serialize,
    R: Serialize + DeserializeOwned + Send + 'static,
{
    /// Create a job backed by the named sub-stores of `store`.
    pub fn new(store: &CacheStore, name: &str, config: C) -> Result<Self> {
        let config_fingerprint = serde_json::to_string(&config)?;
        Ok(Self {
            data: store.sub_store(name),
            config_store: store.sub_store(&format!("{name}_config")),
            config,
            config_fingerprint,
            locks: Mutex::new(HashMap::new()),
            _result: std::marker::PhantomData,
        })
    }

    /// The config this job validates entries against.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Return the cached result for `key`, or run `compute` and store it.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> Result<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let lock = self.key_lock(key);
        let guard = lock.lock().await;
        let result = self.compute_under_lock(key, compute).await;
        drop(guard);
        self.release_key_lock(key, lock);
        result
    }

    async fn compute_under_lock<F, Fut>(&self, key: &str, compute: F) -> Result<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        if let Some(value) = self.lookup(key).await? {
            return Ok(value);
        }
        let value = compute().await?;
        self.data.put(key, &value).await?;
        self.config_store.put(key, &self.config_fingerprint).await?;
        Ok(value)
    }

    /// Valid cached value, if any: present and produced under the current
    /// config.
    async fn lookup(&self, key: &str) -> Result<Option<R>> {
        let stored_config: Option<String> = self.config_store.get(key).await?;
        if stored_config.as_deref() != Some(self.config_fingerprint.as_str()) {
            return Ok(None);
        }
        self.data.get(key).await
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock map poisoned");
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the per-key lock once no other caller references it.
    fn release_key_lock(&self, key: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().expect("lock map poisoned");
        // Two owners left means the map entry and our clone: nobody waits
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(key);
        }
    }
}

impl<C: std::fmt::Debug, R> std::fmt::Debug for CachedJob<C, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedJob")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
