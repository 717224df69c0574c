//! Key-value persistence of annotation maps
//!
//! Every backend stores the whole [`AnnotationMap`] of a document as one JSON
//! value under the document's derived key. Futures are `?Send`: hosts drive
//! them on a single cooperative event loop.

use crate::error::StoreError;
use crate::record::{AnnotationMap, AnnotationRecord};
use async_trait::async_trait;
use futures::lock::Mutex;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use tracing::warn;

/// A stored map as read back: the records that decoded, and the keys of
/// the entries that did not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedMap {
    pub records: AnnotationMap,
    pub rejected: Vec<String>,
}

#[async_trait(?Send)]
pub trait AnnotationStore {
    /// Read the map stored under `key`. A missing key yields an empty map.
    /// A malformed entry is reported in [`LoadedMap::rejected`] and does not
    /// fail the load.
    async fn load_entries(&self, key: &str) -> Result<LoadedMap, StoreError>;

    /// Decoded records only.
    async fn load(&self, key: &str) -> Result<AnnotationMap, StoreError> {
        Ok(self.load_entries(key).await?.records)
    }

    /// Replace the whole map stored under `key`.
    async fn save(&self, key: &str, map: &AnnotationMap) -> Result<(), StoreError>;
}

#[async_trait(?Send)]
impl<S: AnnotationStore + ?Sized> AnnotationStore for Rc<S> {
    async fn load_entries(&self, key: &str) -> Result<LoadedMap, StoreError> {
        (**self).load_entries(key).await
    }

    async fn save(&self, key: &str, map: &AnnotationMap) -> Result<(), StoreError> {
        (**self).save(key, map).await
    }
}

/// Parse a stored JSON map entry by entry. Entries without an id take
/// their map key; entries that are not valid records are rejected.
///
/// Only a value that is not a JSON object at all is an error.
pub fn decode_map(json: &str) -> Result<LoadedMap, StoreError> {
    let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(json)?;

    let mut loaded = LoadedMap::default();
    for (id, value) in raw {
        match serde_json::from_value::<AnnotationRecord>(value) {
            Ok(mut record) => {
                if record.id.is_empty() {
                    record.id = id.clone();
                }
                loaded.records.insert(id, record);
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Rejecting malformed stored annotation");
                loaded.rejected.push(id);
            }
        }
    }
    Ok(loaded)
}

pub fn encode_map(map: &AnnotationMap) -> Result<String, StoreError> {
    Ok(serde_json::to_string(map)?)
}

/// Serializes read-modify-write cycles per key on top of any store.
pub struct KeyedStore<S> {
    inner: S,
    locks: RefCell<HashMap<String, Rc<Mutex<()>>>>,
}

impl<S: AnnotationStore> KeyedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            locks: RefCell::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn lock_for(&self, key: &str) -> Rc<Mutex<()>> {
        self.locks
            .borrow_mut()
            .entry(key.to_string())
            .or_insert_with(|| Rc::new(Mutex::new(())))
            .clone()
    }

    /// Load, modify and save the map under `key` as one transaction.
    ///
    /// Concurrent calls for the same key run one after another, so no
    /// update is lost. Nothing is saved when the load fails.
    pub async fn update<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut AnnotationMap) -> T,
    ) -> Result<T, StoreError> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        let mut map = self.inner.load(key).await?;
        let out = f(&mut map);
        self.inner.save(key, &map).await?;
        Ok(out)
    }
}

#[async_trait(?Send)]
impl<S: AnnotationStore> AnnotationStore for KeyedStore<S> {
    async fn load_entries(&self, key: &str) -> Result<LoadedMap, StoreError> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;
        self.inner.load_entries(key).await
    }

    async fn save(&self, key: &str, map: &AnnotationMap) -> Result<(), StoreError> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;
        self.inner.save(key, map).await
    }
}

/// In-process store holding serialized JSON, with switchable failures.
#[derive(Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
    fail_loads: Cell<bool>,
    fail_saves: Cell<bool>,
    saves: Cell<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a key with an already-encoded JSON value.
    pub fn insert_raw(&self, key: &str, json: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), json.to_string());
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.set(fail);
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.set(fail);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.get()
    }
}

#[async_trait(?Send)]
impl AnnotationStore for MemoryStore {
    async fn load_entries(&self, key: &str) -> Result<LoadedMap, StoreError> {
        if self.fail_loads.get() {
            return Err(StoreError::Backend("load rejected".to_string()));
        }
        match self.entries.borrow().get(key) {
            Some(json) => decode_map(json),
            None => Ok(LoadedMap::default()),
        }
    }

    async fn save(&self, key: &str, map: &AnnotationMap) -> Result<(), StoreError> {
        if self.fail_saves.get() {
            return Err(StoreError::Backend("quota exceeded".to_string()));
        }
        let json = encode_map(map)?;
        self.entries.borrow_mut().insert(key.to_string(), json);
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

#[cfg(feature = "fs-store")]
pub use fs::FileStore;

#[cfg(feature = "fs-store")]
mod fs {
    use super::{decode_map, AnnotationStore, LoadedMap};
    use crate::error::StoreError;
    use crate::record::AnnotationMap;
    use async_trait::async_trait;
    use std::io::ErrorKind;
    use std::path::{Path, PathBuf};

    /// One JSON file per key inside a directory.
    #[derive(Debug, Clone)]
    pub struct FileStore {
        dir: PathBuf,
    }

    impl FileStore {
        pub fn new(dir: impl Into<PathBuf>) -> Self {
            Self { dir: dir.into() }
        }

        pub fn dir(&self) -> &Path {
            &self.dir
        }

        /// Base64 keys may contain `/`, `+` and `=`; map them to file-safe characters.
        pub fn path_for(&self, key: &str) -> PathBuf {
            let name: String = key
                .chars()
                .map(|c| match c {
                    '/' => '_',
                    '+' => '-',
                    '=' => '~',
                    c => c,
                })
                .collect();
            self.dir.join(format!("{}.json", name))
        }
    }

    #[async_trait(?Send)]
    impl AnnotationStore for FileStore {
        async fn load_entries(&self, key: &str) -> Result<LoadedMap, StoreError> {
            let path = self.path_for(key);
            match tokio::fs::read_to_string(&path).await {
                Ok(json) => decode_map(&json),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(LoadedMap::default()),
                Err(e) => Err(e.into()),
            }
        }

        async fn save(&self, key: &str, map: &AnnotationMap) -> Result<(), StoreError> {
            tokio::fs::create_dir_all(&self.dir).await?;
            let path = self.path_for(key);
            let tmp = path.with_extension("json.tmp");
            let json = serde_json::to_string_pretty(map)?;
            tokio::fs::write(&tmp, json).await?;
            tokio::fs::rename(&tmp, &path).await?;
            tracing::debug!(path = %path.display(), count = map.len(), "Saved annotations");
            Ok(())
        }
    }
}
