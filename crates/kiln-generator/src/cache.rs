//! Memoization store for expensive per-build work.
//!
//! A [`CacheStore`] is owned by a site and handed out as named
//! [`Cache`] namespaces. Values live in memory for the lifetime of the site
//! and, unless disabled, are mirrored to disk under the cache directory as
//! `<namespace>/<hash[..2]>/<hash[2..]>` JSON files, where `hash` is the
//! SHA-256 of the key. The whole store is dropped when the configuration
//! fingerprint differs from the one recorded at the last build.

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::{Mutex, RwLock};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

/// Namespace holding the configuration fingerprint.
pub(crate) const CONFIG_NAMESPACE: &str = "kiln.cache";

/// Key of the configuration fingerprint.
pub(crate) const CONFIG_KEY: &str = "config";

/// Cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO error on a cache path.
    #[error("cache IO error at {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// A value could not be (de)serialized.
    #[error("cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// SHA-256 hex digest of a string.
pub fn digest(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

type Slot = Arc<Mutex<Option<Value>>>;

#[derive(Debug, Default)]
struct Inner {
    disk_dir: RwLock<Option<PathBuf>>,
    namespaces: Mutex<HashMap<String, Arc<Mutex<HashMap<String, Slot>>>>>,
}

/// Site-owned store of cache namespaces.
#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    inner: Arc<Inner>,
}

impl CacheStore {
    /// Create a store; `disk_dir` is `None` when disk persistence is off.
    pub fn new(disk_dir: Option<PathBuf>) -> Self {
        let store = Self::default();
        store.reconfigure(disk_dir);
        store
    }

    /// Change where (and whether) values are persisted.
    pub fn reconfigure(&self, disk_dir: Option<PathBuf>) {
        debug!(dir = ?disk_dir, "cache location");
        *self.inner.disk_dir.write() = disk_dir;
    }

    /// The disk directory, if persistence is enabled.
    pub fn disk_dir(&self) -> Option<PathBuf> {
        self.inner.disk_dir.read().clone()
    }

    /// A handle on one namespace.
    pub fn namespace(&self, name: &str) -> Cache {
        let entries = Arc::clone(
            self.inner
                .namespaces
                .lock()
                .entry(name.to_string())
                .or_default(),
        );
        Cache {
            name: name.to_string(),
            entries,
            store: self.clone(),
        }
    }

    /// Drop every namespace in memory and on disk.
    pub fn clear(&self) -> Result<()> {
        self.inner.namespaces.lock().clear();
        if let Some(dir) = self.disk_dir() {
            remove_dir(&dir)?;
        }
        Ok(())
    }

    /// Drop everything if `fingerprint` differs from the one recorded by
    /// [`Self::record_config`] at the last successful build.
    ///
    /// Returns whether the store was cleared.
    pub fn clear_if_config_changed(&self, fingerprint: &str) -> Result<bool> {
        let meta = self.namespace(CONFIG_NAMESPACE);
        if meta.get::<String>(CONFIG_KEY)?.as_deref() == Some(fingerprint) {
            return Ok(false);
        }
        debug!("configuration changed, clearing cache");
        self.clear()?;
        Ok(true)
    }

    /// Record the configuration fingerprint of a build that finished
    /// writing its output.
    pub fn record_config(&self, fingerprint: &str) -> Result<()> {
        self.namespace(CONFIG_NAMESPACE)
            .set(CONFIG_KEY, &fingerprint.to_string())
    }
}

/// One cache namespace.
#[derive(Debug, Clone)]
pub struct Cache {
    name: String,
    entries: Arc<Mutex<HashMap<String, Slot>>>,
    store: CacheStore,
}

impl Cache {
    /// Namespace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn slot(&self, key: &str) -> Slot {
        Arc::clone(self.entries.lock().entry(key.to_string()).or_default())
    }

    fn disk_path(&self, key: &str) -> Option<PathBuf> {
        let dir = self.store.disk_dir()?;
        let hash = digest(key);
        Some(dir.join(&self.name).join(&hash[..2]).join(&hash[2..]))
    }

    fn load(&self, key: &str) -> Option<Value> {
        let path = self.disk_path(key)?;
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring corrupt cache entry");
                None
            }
        }
    }

    fn persist(&self, key: &str, value: &Value) {
        let Some(path) = self.disk_path(key) else {
            return;
        };
        let result = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| fs::write(&path, value.to_string()));
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to persist cache entry");
        }
    }

    /// Return the cached value for `key`, computing and storing it once.
    ///
    /// Concurrent callers for the same key wait for the first computation.
    pub fn getset<T, E, F>(&self, key: &str, compute: F) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        let slot = self.slot(key);
        let mut guard = slot.lock();

        if guard.is_none() {
            *guard = self.load(key);
        }
        if let Some(value) = guard.as_ref() {
            return Ok(serde_json::from_value(value.clone()).map_err(CacheError::from)?);
        }

        let computed = compute()?;
        let value = serde_json::to_value(&computed).map_err(CacheError::from)?;
        self.persist(key, &value);
        *guard = Some(value);
        Ok(computed)
    }

    /// Look up a value without computing it.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let slot = self.slot(key);
        let mut guard = slot.lock();
        if guard.is_none() {
            *guard = self.load(key);
        }
        guard
            .as_ref()
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(CacheError::from)
    }

    /// Store a value.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.persist(key, &value);
        *self.slot(key).lock() = Some(value);
        Ok(())
    }

    /// Whether a value is cached in memory or on disk.
    pub fn contains(&self, key: &str) -> bool {
        let in_memory = self
            .entries
            .lock()
            .get(key)
            .is_some_and(|slot| slot.lock().is_some());
        in_memory || self.disk_path(key).is_some_and(|p| p.is_file())
    }

    /// Remove one key.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        if let Some(path) = self.disk_path(key) {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(CacheError::Io { path, source }),
            }
        }
        Ok(())
    }

    /// Remove every key of this namespace.
    pub fn clear(&self) -> Result<()> {
        self.entries.lock().clear();
        if let Some(dir) = self.store.disk_dir() {
            remove_dir(&dir.join(&self.name))?;
        }
        Ok(())
    }
}

fn remove_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CacheError::Io {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rayon::prelude::*;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_getset_computes_once() {
        let store = CacheStore::new(None);
        let cache = store.namespace("markdown");
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: String = cache
                .getset("k", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CacheError>("v".to_string())
                })
                .unwrap();
            assert_eq!(value, "v");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_getset_is_atomic_per_key() {
        let store = CacheStore::new(None);
        let cache = store.namespace("parallel");
        let calls = AtomicUsize::new(0);

        (0..64).into_par_iter().for_each(|_| {
            let _: u64 = cache
                .getset("shared", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CacheError>(42)
                })
                .unwrap();
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_compute_is_not_cached() {
        let store = CacheStore::new(None);
        let cache = store.namespace("ns");
        let err = cache.getset::<String, CacheError, _>("k", || {
            Err(CacheError::Io {
                path: PathBuf::from("x"),
                source: io::Error::other("boom"),
            })
        });
        assert!(err.is_err());
        assert!(!cache.contains("k"));
    }

    #[test]
    fn test_namespaces_are_separate() {
        let store = CacheStore::new(None);
        store.namespace("a").set("k", &1u32).unwrap();
        assert_eq!(store.namespace("a").get::<u32>("k").unwrap(), Some(1));
        assert_eq!(store.namespace("b").get::<u32>("k").unwrap(), None);
    }

    #[test]
    fn test_disk_persistence() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(Some(dir.path().to_path_buf()));
        store.namespace("ns").set("key", &"value").unwrap();

        let hash = digest("key");
        assert!(dir.path().join("ns").join(&hash[..2]).join(&hash[2..]).is_file());

        let fresh = CacheStore::new(Some(dir.path().to_path_buf()));
        assert_eq!(
            fresh.namespace("ns").get::<String>("key").unwrap().as_deref(),
            Some("value")
        );
    }

    #[test]
    fn test_clear_if_config_changed() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(Some(dir.path().to_path_buf()));

        assert!(store.clear_if_config_changed("one").unwrap());
        store.namespace("ns").set("k", &1u8).unwrap();

        // Nothing recorded until a build persists.
        assert!(store.clear_if_config_changed("one").unwrap());
        assert!(!store.namespace("ns").contains("k"));

        store.namespace("ns").set("k", &1u8).unwrap();
        store.record_config("one").unwrap();
        assert!(!store.clear_if_config_changed("one").unwrap());
        assert!(store.namespace("ns").contains("k"));

        assert!(store.clear_if_config_changed("two").unwrap());
        assert!(!store.namespace("ns").contains("k"));
    }

    #[test]
    fn test_delete_and_clear() {
        let store = CacheStore::new(None);
        let cache = store.namespace("ns");
        cache.set("a", &1u8).unwrap();
        cache.set("b", &2u8).unwrap();
        cache.delete("a").unwrap();
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        cache.clear().unwrap();
        assert!(!cache.contains("b"));
    }
}
