//! Server version cache (versions.json)
//!
//! Holds the last (resource, client) version pair observed per region. A
//! freshly fetched pair that differs from the stored one, or a region with no
//! entry at all, is the "game has updated" signal.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::region::Region;
use crate::store::CacheDocument;

/// File name of the version document inside the cache directory.
pub const VERSION_CACHE_FILE: &str = "versions.json";

/// Last observed version pair for a region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerVersion {
    /// Resource version string
    pub resource: String,

    /// Client version string
    pub client: String,

    /// Bytes written per top-level output folder
    #[serde(default)]
    pub folders: BTreeMap<String, u64>,
}

impl ServerVersion {
    pub fn new(resource: impl Into<String>, client: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            client: client.into(),
            folders: BTreeMap::new(),
        }
    }

    /// Total bytes across all tracked folders.
    pub fn total_folder_bytes(&self) -> u64 {
        self.folders.values().sum()
    }
}

/// Per-region server versions.
///
/// On disk: `{ "<REGION>": { "resource": ..., "client": ..., "folders": {...} } }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionCache {
    versions: BTreeMap<Region, ServerVersion>,
}

impl VersionCache {
    pub fn get_version(&self, region: Region) -> Option<&ServerVersion> {
        self.versions.get(&region)
    }

    /// Record a version pair, keeping any folder sizes already tracked.
    pub fn set_version(&mut self, region: Region, resource: &str, client: &str) {
        let entry = self.versions.entry(region).or_default();
        entry.resource = resource.to_string();
        entry.client = client.to_string();
    }

    pub fn has_version(&self, region: Region) -> bool {
        self.versions.contains_key(&region)
    }

    /// Whether the pair differs from the stored one. Absent entries count as changed.
    pub fn is_version_changed(&self, region: Region, resource: &str, client: &str) -> bool {
        match self.versions.get(&region) {
            Some(current) => current.resource != resource || current.client != client,
            None => true,
        }
    }

    /// Record measured sizes for the given folders, replacing their previous values.
    ///
    /// Folders not in `sizes` keep their entry. Does nothing for a region
    /// without a version entry.
    pub fn set_folder_sizes(&mut self, region: Region, sizes: &BTreeMap<String, u64>) {
        if let Some(entry) = self.versions.get_mut(&region) {
            for (folder, bytes) in sizes {
                entry.folders.insert(folder.clone(), *bytes);
            }
        }
    }

    pub fn remove_version(&mut self, region: Region) -> Option<ServerVersion> {
        self.versions.remove(&region)
    }

    /// Clear one region, or every region when `region` is `None`.
    pub fn clear(&mut self, region: Option<Region>) {
        match region {
            Some(region) => {
                self.versions.remove(&region);
            }
            None => self.versions.clear(),
        }
    }

    /// Number of regions with a recorded version.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Region, &ServerVersion)> {
        self.versions.iter().map(|(region, version)| (*region, version))
    }
}

impl CacheDocument for VersionCache {
    const KIND: &'static str = "versions";

    /// Accepted legacy shapes:
    /// - `{ "resource": ..., "client": ... }` (no region wrapper)
    /// - `{ "versions": { "<REGION>": { ... } } }`
    fn from_legacy(value: Value) -> Option<Self> {
        let Value::Object(mut map) = value else {
            return None;
        };

        if map.len() == 1 {
            if let Some(inner) = map.remove("versions") {
                return serde_json::from_value(inner).ok();
            }
        }

        let version: ServerVersion = serde_json::from_value(Value::Object(map)).ok()?;
        let mut cache = VersionCache::default();
        cache.versions.insert(Region::LEGACY_DEFAULT, version);
        Some(cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_region_is_changed() {
        let cache = VersionCache::default();
        assert!(cache.is_version_changed(Region::Cn, "r1", "c1"));
    }

    #[test]
    fn test_version_change_detection() {
        let mut cache = VersionCache::default();
        cache.set_version(Region::Cn, "r1", "c1");

        assert!(!cache.is_version_changed(Region::Cn, "r1", "c1"));
        assert!(cache.is_version_changed(Region::Cn, "r2", "c1"));
        assert!(cache.is_version_changed(Region::Cn, "r1", "c2"));
    }

    #[test]
    fn test_set_version_keeps_folder_sizes() {
        let mut cache = VersionCache::default();
        cache.set_version(Region::Jp, "r1", "c1");
        let sizes = BTreeMap::from([("arts".to_string(), 10), ("audio".to_string(), 5)]);
        cache.set_folder_sizes(Region::Jp, &sizes);

        cache.set_version(Region::Jp, "r2", "c1");
        let version = cache.get_version(Region::Jp).unwrap();
        assert_eq!(version.resource, "r2");
        assert_eq!(version.folders["arts"], 10);
        assert_eq!(version.total_folder_bytes(), 15);
    }

    #[test]
    fn test_folder_sizes_replace_previous_values() {
        let mut cache = VersionCache::default();
        cache.set_version(Region::Cn, "r1", "c1");
        cache.set_folder_sizes(Region::Cn, &BTreeMap::from([("audio".to_string(), 10), ("arts".to_string(), 4)]));
        cache.set_folder_sizes(Region::Cn, &BTreeMap::from([("audio".to_string(), 10)]));

        let version = cache.get_version(Region::Cn).unwrap();
        assert_eq!(version.folders["audio"], 10);
        assert_eq!(version.folders["arts"], 4);
    }

    #[test]
    fn test_folder_sizes_without_version_are_ignored() {
        let mut cache = VersionCache::default();
        cache.set_folder_sizes(Region::Kr, &BTreeMap::from([("x".to_string(), 1)]));
        assert!(!cache.has_version(Region::Kr));
    }

    #[test]
    fn test_folders_default_when_absent() {
        let cache: VersionCache =
            serde_json::from_value(json!({"EN": {"resource": "r", "client": "c"}})).unwrap();
        assert!(cache.get_version(Region::En).unwrap().folders.is_empty());
    }

    #[test]
    fn test_legacy_unwrapped_version() {
        let cache = VersionCache::from_legacy(json!({"resource": "r", "client": "c"})).unwrap();
        let version = cache.get_version(Region::LEGACY_DEFAULT).unwrap();
        assert_eq!(version.resource, "r");
        assert_eq!(version.client, "c");
    }

    #[test]
    fn test_legacy_versions_wrapper() {
        let cache = VersionCache::from_legacy(json!({
            "versions": {"TW": {"resource": "r", "client": "c"}}
        }))
        .unwrap();
        assert!(cache.has_version(Region::Tw));
    }

    #[test]
    fn test_legacy_rejects_unknown_shape() {
        assert!(VersionCache::from_legacy(json!({"foo": "bar"})).is_none());
    }
}
