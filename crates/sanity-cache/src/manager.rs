//! Cache manager
//!
//! Owns one store per cache document kind. It is constructed once by the
//! process entry point and passed by reference to every collaborator.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::assets::{AssetCache, ASSET_CACHE_FILE};
use crate::bindings::{SchemaBindingCache, BINDING_CACHE_FILE};
use crate::error::{CacheError, CacheResult};
use crate::region::Region;
use crate::store::{CacheStore, DocumentStatus};
use crate::versions::{ServerVersion, VersionCache, VERSION_CACHE_FILE};

/// Which cache document(s) an operation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Versions,
    Assets,
    Bindings,
    All,
}

impl CacheKind {
    fn includes(self, other: CacheKind) -> bool {
        self == CacheKind::All || self == other
    }
}

/// Per-region breakdown in [`CacheStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegionStats {
    pub assets: usize,
    pub bindings: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<ServerVersion>,
}

/// Cache statistics, computed on demand from the in-memory documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub cache_dir: PathBuf,
    pub version_cache_exists: bool,
    pub asset_cache_exists: bool,
    pub binding_cache_exists: bool,
    /// Regions with a recorded server version
    pub tracked_regions: usize,
    pub total_assets: usize,
    pub total_bindings: usize,
    pub regions: BTreeMap<Region, RegionStats>,
}

/// On-disk status of each document, as reported by [`CacheManager::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub entries: Vec<(CacheKind, PathBuf, DocumentStatus)>,
}

impl ValidationReport {
    /// True when no document is corrupt.
    pub fn is_healthy(&self) -> bool {
        !self
            .entries
            .iter()
            .any(|(_, _, status)| matches!(status, DocumentStatus::Corrupt(_)))
    }
}

/// Owner of the version, asset and schema-binding caches.
pub struct CacheManager {
    cache_dir: PathBuf,
    versions: CacheStore<VersionCache>,
    assets: CacheStore<AssetCache>,
    bindings: CacheStore<SchemaBindingCache>,
}

impl CacheManager {
    /// Create a manager rooted at `cache_dir`, creating the directory.
    ///
    /// Documents are not read until first use.
    pub fn new(cache_dir: impl AsRef<Path>) -> CacheResult<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        fs::create_dir_all(&cache_dir).map_err(|source| CacheError::CreateDir {
            path: cache_dir.clone(),
            source,
        })?;

        Ok(Self {
            versions: CacheStore::new(cache_dir.join(VERSION_CACHE_FILE)),
            assets: CacheStore::new(cache_dir.join(ASSET_CACHE_FILE)),
            bindings: CacheStore::new(cache_dir.join(BINDING_CACHE_FILE)),
            cache_dir,
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn versions(&self) -> &CacheStore<VersionCache> {
        &self.versions
    }

    pub fn assets(&self) -> &CacheStore<AssetCache> {
        &self.assets
    }

    pub fn bindings(&self) -> &CacheStore<SchemaBindingCache> {
        &self.bindings
    }

    /// Drop every in-memory document and read them again.
    pub fn reload_all(&self) {
        self.versions.reload();
        self.assets.reload();
        self.bindings.reload();
    }

    /// Persist every document.
    ///
    /// Callers must only invoke this once all workers of the current run have
    /// finished mutating the caches.
    pub fn save_all(&self) -> CacheResult<()> {
        self.versions.save()?;
        self.assets.save()?;
        self.bindings.save()?;
        Ok(())
    }

    /// Persist the selected document(s).
    pub fn save(&self, kind: CacheKind) -> CacheResult<()> {
        if kind.includes(CacheKind::Versions) {
            self.versions.save()?;
        }
        if kind.includes(CacheKind::Assets) {
            self.assets.save()?;
        }
        if kind.includes(CacheKind::Bindings) {
            self.bindings.save()?;
        }
        Ok(())
    }

    /// Clear the selected document(s) in memory, for one region or all.
    ///
    /// A cleared cache means "fetch and decode everything again". Call
    /// [`CacheManager::save`] to persist.
    pub fn clear(&self, kind: CacheKind, region: Option<Region>) {
        if kind.includes(CacheKind::Versions) {
            self.versions.update(|v| v.clear(region));
        }
        if kind.includes(CacheKind::Assets) {
            self.assets.update(|a| a.clear(region));
        }
        if kind.includes(CacheKind::Bindings) {
            self.bindings.update(|b| b.clear(region));
        }
    }

    /// Compute statistics from the in-memory documents.
    pub fn stats(&self) -> CacheStats {
        let mut regions: BTreeMap<Region, RegionStats> = BTreeMap::new();

        let tracked_regions = self.versions.read(|versions| {
            for (region, version) in versions.iter() {
                regions.entry(region).or_default().version = Some(version.clone());
            }
            versions.len()
        });

        let total_assets = self.assets.read(|assets| {
            for region in assets.regions() {
                regions.entry(region).or_default().assets = assets.region_count(region);
            }
            assets.total_assets()
        });

        let total_bindings = self.bindings.read(|bindings| {
            for region in bindings.regions() {
                regions.entry(region).or_default().bindings = bindings.region_count(region);
            }
            bindings.total_bindings()
        });

        CacheStats {
            cache_dir: self.cache_dir.clone(),
            version_cache_exists: self.versions.exists(),
            asset_cache_exists: self.assets.exists(),
            binding_cache_exists: self.bindings.exists(),
            tracked_regions,
            total_assets,
            total_bindings,
            regions,
        }
    }

    /// Check each document on disk without loading it.
    pub fn validate(&self) -> ValidationReport {
        ValidationReport {
            entries: vec![
                (CacheKind::Versions, self.versions.path().to_path_buf(), self.versions.inspect()),
                (CacheKind::Assets, self.assets.path().to_path_buf(), self.assets.inspect()),
                (CacheKind::Bindings, self.bindings.path().to_path_buf(), self.bindings.inspect()),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::CommitId;
    use tempfile::TempDir;

    #[test]
    fn test_new_creates_directory_but_no_documents() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("cache");
        let manager = CacheManager::new(&dir).unwrap();

        assert!(dir.is_dir());
        let stats = manager.stats();
        assert!(!stats.version_cache_exists);
        assert!(!stats.asset_cache_exists);
        assert!(!stats.binding_cache_exists);
        assert_eq!(stats.total_assets, 0);
    }

    #[test]
    fn test_stats_breakdown() {
        let temp = TempDir::new().unwrap();
        let manager = CacheManager::new(temp.path()).unwrap();

        manager.versions().update(|v| v.set_version(Region::Cn, "r", "c"));
        manager.assets().update(|a| {
            a.set_hash(Region::Cn, "a", "1");
            a.set_hash(Region::Cn, "b", "2");
            a.set_hash(Region::Jp, "a", "1");
        });
        manager
            .bindings()
            .update(|b| b.set_commit(Region::Jp, "skill_table", CommitId::new("c1")));

        let stats = manager.stats();
        assert_eq!(stats.tracked_regions, 1);
        assert_eq!(stats.total_assets, 3);
        assert_eq!(stats.total_bindings, 1);
        assert_eq!(stats.regions[&Region::Cn].assets, 2);
        assert!(stats.regions[&Region::Cn].version.is_some());
        assert_eq!(stats.regions[&Region::Jp].bindings, 1);
        assert!(stats.regions[&Region::Jp].version.is_none());
    }

    #[test]
    fn test_clear_selected_kind_and_region() {
        let temp = TempDir::new().unwrap();
        let manager = CacheManager::new(temp.path()).unwrap();
        manager.assets().update(|a| {
            a.set_hash(Region::Cn, "a", "1");
            a.set_hash(Region::Kr, "a", "1");
        });
        manager.versions().update(|v| v.set_version(Region::Cn, "r", "c"));

        manager.clear(CacheKind::Assets, Some(Region::Cn));
        assert_eq!(manager.assets().read(|a| a.total_assets()), 1);
        assert!(manager.versions().read(|v| v.has_version(Region::Cn)));

        manager.clear(CacheKind::All, None);
        assert_eq!(manager.assets().read(|a| a.total_assets()), 0);
        assert!(manager.versions().read(|v| v.is_empty()));
    }

    #[test]
    fn test_save_all_and_validate() {
        let temp = TempDir::new().unwrap();
        let manager = CacheManager::new(temp.path()).unwrap();
        assert!(manager
            .validate()
            .entries
            .iter()
            .all(|(_, _, status)| *status == DocumentStatus::Missing));

        manager.assets().update(|a| a.set_hash(Region::En, "x", "1"));
        manager.save_all().unwrap();

        let report = manager.validate();
        assert!(report.is_healthy());
        assert!(report
            .entries
            .iter()
            .all(|(_, _, status)| *status == DocumentStatus::Current));
    }

    #[test]
    fn test_validate_flags_corrupt_document() {
        let temp = TempDir::new().unwrap();
        let manager = CacheManager::new(temp.path()).unwrap();
        fs::write(temp.path().join(BINDING_CACHE_FILE), "[").unwrap();

        let report = manager.validate();
        assert!(!report.is_healthy());
    }
}
