//! Lazy, typed persistence for a single cache document.
//!
//! A [`CacheStore`] owns one JSON document on disk and its in-memory copy:
//! - the document is read on first use and held for the process lifetime
//! - a missing file yields an empty document and is not written until `save`
//! - unparsable or incompatible content is logged and replaced by an empty document
//! - recognized legacy shapes are upgraded in memory; `save` only writes the current shape
//! - `save` replaces the whole file atomically (temp file + rename)

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::error::{CacheError, CacheResult};

/// A typed cache document that can be persisted by a [`CacheStore`].
pub trait CacheDocument: Serialize + DeserializeOwned + Default + Clone + Send {
    /// Document kind, used in log messages.
    const KIND: &'static str;

    /// Upgrade a legacy on-disk shape into the current one.
    ///
    /// Called only after `value` failed to deserialize as the current shape.
    /// Returns `None` when the shape is not recognized.
    fn from_legacy(value: Value) -> Option<Self> {
        let _ = value;
        None
    }
}

/// On-disk state of a cache document, as reported by [`CacheStore::inspect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentStatus {
    /// No file exists yet
    Missing,
    /// File parses as the current shape
    Current,
    /// File parses only as a legacy shape; the next save rewrites it
    Legacy,
    /// File is unreadable or matches no known shape
    Corrupt(String),
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Missing => "missing",
            DocumentStatus::Current => "current",
            DocumentStatus::Legacy => "legacy",
            DocumentStatus::Corrupt(_) => "corrupt",
        }
    }
}

/// Parse raw bytes as the current shape, falling back to legacy shapes.
fn parse_document<D: CacheDocument>(bytes: &[u8]) -> Result<(D, DocumentStatus), String> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
    match serde_json::from_value::<D>(value.clone()) {
        Ok(doc) => Ok((doc, DocumentStatus::Current)),
        Err(err) => match D::from_legacy(value) {
            Some(doc) => Ok((doc, DocumentStatus::Legacy)),
            None => Err(err.to_string()),
        },
    }
}

/// Write `bytes` to `path` so that readers see either the old or the new file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> CacheResult<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|source| CacheError::CreateDir {
        path: parent.to_path_buf(),
        source,
    })?;

    let write_err = |source: io::Error| CacheError::Write {
        path: path.to_path_buf(),
        source,
    };

    // The temp file must live in the target directory for rename to be atomic
    let mut temp = NamedTempFile::new_in(parent).map_err(write_err)?;
    temp.write_all(bytes).map_err(write_err)?;
    temp.as_file().sync_all().map_err(write_err)?;
    temp.persist(path).map_err(|e| write_err(e.error))?;

    Ok(())
}

/// Lazily loaded, mutex-guarded cache document bound to one file.
///
/// Mutation goes through [`CacheStore::update`], which holds a single coarse
/// lock; concurrent workers writing disjoint keys need nothing finer.
pub struct CacheStore<D> {
    path: PathBuf,
    document: Mutex<Option<D>>,
}

impl<D: CacheDocument> CacheStore<D> {
    /// Create a store for the document at `path`. Nothing is read yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            document: Mutex::new(None),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the backing file exists on disk.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Whether the document has been loaded into memory.
    pub fn is_loaded(&self) -> bool {
        self.lock().is_some()
    }

    /// Read the document from disk, replacing the in-memory copy.
    pub fn load(&self) -> D {
        let doc = Self::read_from_disk(&self.path);
        *self.lock() = Some(doc.clone());
        doc
    }

    /// Snapshot of the document, loading it on first use.
    pub fn get(&self) -> D {
        self.read(D::clone)
    }

    /// Drop the in-memory copy and read the document again.
    pub fn reload(&self) -> D {
        self.load()
    }

    /// Run `f` against the in-memory document, loading it on first use.
    pub fn read<R>(&self, f: impl FnOnce(&D) -> R) -> R {
        let mut guard = self.lock();
        let doc = guard.get_or_insert_with(|| Self::read_from_disk(&self.path));
        f(doc)
    }

    /// Mutate the in-memory document under the store lock.
    ///
    /// Changes are not persisted until [`CacheStore::save`].
    pub fn update<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        let mut guard = self.lock();
        let doc = guard.get_or_insert_with(|| Self::read_from_disk(&self.path));
        f(doc)
    }

    /// Persist the complete in-memory document.
    ///
    /// The store lock is held until the file is replaced, so concurrent saves
    /// land on disk in the order they serialized.
    pub fn save(&self) -> CacheResult<()> {
        let mut guard = self.lock();
        self.write_locked(&mut guard)
    }

    /// Replace the in-memory document with `document` and persist it.
    pub fn store(&self, document: D) -> CacheResult<()> {
        let mut guard = self.lock();
        *guard = Some(document);
        self.write_locked(&mut guard)
    }

    fn write_locked(&self, guard: &mut MutexGuard<'_, Option<D>>) -> CacheResult<()> {
        let doc = guard.get_or_insert_with(|| Self::read_from_disk(&self.path));
        let mut bytes = serde_json::to_vec_pretty(doc)?;
        bytes.push(b'\n');
        write_atomic(&self.path, &bytes)?;
        tracing::debug!(kind = D::KIND, path = %self.path.display(), "Saved cache document");
        Ok(())
    }

    /// Report the on-disk state without touching the in-memory copy.
    pub fn inspect(&self) -> DocumentStatus {
        match fs::read(&self.path) {
            Ok(bytes) => match parse_document::<D>(&bytes) {
                Ok((_, status)) => status,
                Err(reason) => DocumentStatus::Corrupt(reason),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => DocumentStatus::Missing,
            Err(e) => DocumentStatus::Corrupt(e.to_string()),
        }
    }

    fn read_from_disk(path: &Path) -> D {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(kind = D::KIND, path = %path.display(), "Cache document not found, starting empty");
                return D::default();
            }
            Err(e) => {
                tracing::warn!(kind = D::KIND, path = %path.display(), error = %e, "Failed to read cache document, starting empty");
                return D::default();
            }
        };

        match parse_document::<D>(&bytes) {
            Ok((doc, DocumentStatus::Legacy)) => {
                tracing::info!(kind = D::KIND, path = %path.display(), "Upgraded legacy cache document");
                doc
            }
            Ok((doc, _)) => doc,
            Err(reason) => {
                tracing::warn!(kind = D::KIND, path = %path.display(), %reason, "Malformed cache document, starting empty");
                D::default()
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<D>> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetCache;
    use crate::region::Region;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> CacheStore<AssetCache> {
        CacheStore::new(dir.path().join("assets.json"))
    }

    #[test]
    fn test_missing_file_is_empty_and_not_written() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let doc = store.get();
        assert_eq!(doc.total_assets(), 0);
        assert!(store.is_loaded());
        assert!(!store.exists());
        assert_eq!(store.inspect(), DocumentStatus::Missing);
    }

    #[test]
    fn test_malformed_file_falls_back_to_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "{ not json").unwrap();

        assert_eq!(store.get().total_assets(), 0);
        assert!(matches!(store.inspect(), DocumentStatus::Corrupt(_)));
    }

    #[test]
    fn test_incompatible_shape_falls_back_to_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), r#"{"CN": 42}"#).unwrap();

        assert_eq!(store.get().total_assets(), 0);
    }

    #[test]
    fn test_save_then_reload() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.update(|a| a.set_hash(Region::Jp, "x/y.ab", "h1"));
        store.save().unwrap();

        let other = store_in(&dir);
        assert_eq!(other.get().get_hash(Region::Jp, "x/y.ab"), Some("h1"));
        assert_eq!(other.inspect(), DocumentStatus::Current);
    }

    #[test]
    fn test_reload_discards_unsaved_changes() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.update(|a| a.set_hash(Region::Cn, "a", "1"));
        store.save().unwrap();

        store.update(|a| a.set_hash(Region::Cn, "b", "2"));
        let reloaded = store.reload();
        assert!(reloaded.has_asset(Region::Cn, "a"));
        assert!(!reloaded.has_asset(Region::Cn, "b"));
    }

    #[test]
    fn test_save_before_load_keeps_disk_contents() {
        let dir = TempDir::new().unwrap();
        let first = store_in(&dir);
        first.update(|a| a.set_hash(Region::Cn, "kept", "h"));
        first.save().unwrap();

        let second = store_in(&dir);
        second.save().unwrap();
        assert!(second.get().has_asset(Region::Cn, "kept"));
    }

    #[test]
    fn test_store_replaces_document() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.update(|a| a.set_hash(Region::Cn, "old", "1"));

        let mut fresh = AssetCache::default();
        fresh.set_hash(Region::Kr, "new", "2");
        store.store(fresh).unwrap();

        let loaded = store_in(&dir).get();
        assert!(!loaded.has_asset(Region::Cn, "old"));
        assert!(loaded.has_asset(Region::Kr, "new"));
    }

    #[test]
    fn test_concurrent_saves_leave_latest_document_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        for round in 0..50 {
            std::thread::scope(|scope| {
                for t in 0..4 {
                    let store = &store;
                    scope.spawn(move || {
                        store.update(|a| a.set_hash(Region::Cn, &format!("k{round}_{t}"), "h"));
                        store.save().unwrap();
                    });
                }
            });
            assert_eq!(store_in(&dir).get(), store.get(), "round {round}");
        }
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        write_atomic(&path, b"{}").unwrap();

        let entries: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
    }
}
