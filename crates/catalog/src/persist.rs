//! Versioned JSON state files shared by the catalog, the query log and the embedding store.
//!
//! Every file is written to `<name>.json.tmp` and renamed into place while holding an exclusive
//! advisory lock on `<name>.lock`, so a batch job in another process never observes a torn
//! write. Readers keep a cached copy and reload it only when the file fingerprint changes.

use crate::error::{CatalogError, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

pub const STATE_SCHEMA_VERSION: u32 = 1;

#[must_use]
pub fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[must_use]
pub fn lock_path_for(target: &Path) -> PathBuf {
    target.with_extension("lock")
}

/// Exclusive cross-process lock; released on drop.
pub struct FileLock {
    file: File,
}

impl FileLock {
    pub fn acquire(target: &Path) -> Result<Self> {
        let path = lock_path_for(target);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| CatalogError::Other(format!("open lock {}: {err}", path.display())))?;
        file.lock_exclusive().map_err(|err| {
            CatalogError::Other(format!("acquire lock {}: {err}", path.display()))
        })?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    modified_ns: u128,
    len: u64,
    inode: u64,
}

fn fingerprint(path: &Path) -> Option<Fingerprint> {
    let meta = std::fs::metadata(path).ok()?;
    let modified_ns = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_nanos());
    Some(Fingerprint {
        modified_ns,
        len: meta.len(),
        inode: inode_of(&meta),
    })
}

// Every write renames a fresh file into place, so the inode changes even when mtime and
// length collide.
#[cfg(unix)]
fn inode_of(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
const fn inode_of(_meta: &std::fs::Metadata) -> u64 {
    0
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    schema_version: u32,
    #[serde(flatten)]
    data: &'a T,
}

#[derive(Deserialize)]
struct EnvelopeOwned<T> {
    schema_version: u32,
    #[serde(flatten)]
    data: T,
}

/// Reads a versioned state file; `Ok(None)` when it does not exist.
pub fn read_json_versioned<T: DeserializeOwned>(path: &Path, label: &str) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let envelope: EnvelopeOwned<T> = serde_json::from_slice(&bytes)?;
    if envelope.schema_version != STATE_SCHEMA_VERSION {
        return Err(CatalogError::SchemaVersion {
            file: label.to_string(),
            found: envelope.schema_version,
            expected: STATE_SCHEMA_VERSION,
        });
    }
    Ok(Some(envelope.data))
}

fn read_state<T>(path: &Path, label: &str) -> Result<(Option<Fingerprint>, T)>
where
    T: DeserializeOwned + Default,
{
    let before = fingerprint(path);
    if before.is_none() {
        return Ok((None, T::default()));
    }
    let value = read_json_versioned(path, label)?.unwrap_or_default();
    Ok((before, value))
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec_pretty(&EnvelopeRef {
        schema_version: STATE_SCHEMA_VERSION,
        data: value,
    })?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

struct Cached<T> {
    fingerprint: Option<Fingerprint>,
    value: Arc<T>,
}

/// A JSON document on disk with a read-mostly in-memory copy.
pub struct JsonStateFile<T> {
    path: PathBuf,
    label: &'static str,
    cache: RwLock<Cached<T>>,
    writer: Mutex<()>,
}

impl<T> JsonStateFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn open(path: impl AsRef<Path>, label: &'static str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (fingerprint, value) = read_state::<T>(&path, label)?;
        log::debug!("Opened {label} at {}", path.display());
        Ok(Self {
            path,
            label,
            cache: RwLock::new(Cached {
                fingerprint,
                value: Arc::new(value),
            }),
            writer: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current state, reloaded from disk if another writer replaced the file.
    pub fn snapshot(&self) -> Result<Arc<T>> {
        let current = fingerprint(&self.path);
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if cache.fingerprint == current {
                return Ok(cache.value.clone());
            }
        }

        let (fingerprint, value) = read_state::<T>(&self.path, self.label)?;
        log::debug!("Reloaded {} from {}", self.label, self.path.display());
        let value = Arc::new(value);
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        *cache = Cached {
            fingerprint,
            value: value.clone(),
        };
        Ok(value)
    }

    /// Read-modify-write under both the in-process and the cross-process lock.
    ///
    /// Nothing is written when `apply` fails.
    pub fn update<R, E>(
        &self,
        apply: impl FnOnce(&mut T) -> std::result::Result<R, E>,
    ) -> std::result::Result<R, E>
    where
        E: From<CatalogError>,
    {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let _lock = FileLock::acquire(&self.path)?;

        let (_, mut state) = read_state::<T>(&self.path, self.label)?;
        let out = apply(&mut state)?;
        write_json_atomic(&self.path, &state)?;

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        *cache = Cached {
            fingerprint: fingerprint(&self.path),
            value: Arc::new(state),
        };
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Counter {
        hits: BTreeMap<String, u32>,
    }

    #[test]
    fn missing_file_reads_as_default() {
        let tmp = TempDir::new().unwrap();
        let file: JsonStateFile<Counter> =
            JsonStateFile::open(tmp.path().join("counter.json"), "counter").unwrap();
        assert_eq!(*file.snapshot().unwrap(), Counter::default());
        assert!(!file.path().exists());
    }

    #[test]
    fn update_persists_and_other_handles_observe_it() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("counter.json");
        let writer: JsonStateFile<Counter> = JsonStateFile::open(&path, "counter").unwrap();
        let reader: JsonStateFile<Counter> = JsonStateFile::open(&path, "counter").unwrap();

        writer
            .update(|state| {
                state.hits.insert("a".into(), 1);
                Ok::<_, CatalogError>(())
            })
            .unwrap();

        assert_eq!(reader.snapshot().unwrap().hits.get("a"), Some(&1));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn failed_update_leaves_file_untouched() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("counter.json");
        let file: JsonStateFile<Counter> = JsonStateFile::open(&path, "counter").unwrap();

        let err = file
            .update(|state| {
                state.hits.insert("b".into(), 2);
                Err::<(), _>(CatalogError::Other("boom".into()))
            })
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(!path.exists());
        assert!(file.snapshot().unwrap().hits.is_empty());
    }

    #[test]
    fn rejects_unknown_schema_version() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("counter.json");
        std::fs::write(&path, r#"{"schema_version": 7, "hits": {}}"#).unwrap();
        let Err(err) = JsonStateFile::<Counter>::open(&path, "counter") else {
            panic!("expected schema version error");
        };
        assert!(err.to_string().contains("schema_version 7"), "{err}");
    }
}
