//! Asset hash cache (assets.json)
//!
//! Maps each region's content paths to the manifest hash of the copy on disk.
//! An asset is up to date iff its cached hash equals the manifest hash; a
//! missing entry and a different hash both mean "fetch again".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::region::Region;
use crate::store::CacheDocument;

/// File name of the asset document inside the cache directory.
pub const ASSET_CACHE_FILE: &str = "assets.json";

/// Normalize a content path to forward slashes.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Per-region map of content path to content hash.
///
/// On disk: `{ "<REGION>": { "<path>": "<hash>" } }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetCache {
    regions: BTreeMap<Region, BTreeMap<String, String>>,
}

impl AssetCache {
    /// Cached hash for an asset.
    pub fn get_hash(&self, region: Region, path: &str) -> Option<&str> {
        self.regions
            .get(&region)?
            .get(&normalize_path(path))
            .map(String::as_str)
    }

    /// Record the hash of an asset that was fetched and extracted.
    pub fn set_hash(&mut self, region: Region, path: &str, hash: impl Into<String>) {
        self.regions
            .entry(region)
            .or_default()
            .insert(normalize_path(path), hash.into());
    }

    pub fn has_asset(&self, region: Region, path: &str) -> bool {
        self.get_hash(region, path).is_some()
    }

    /// Whether `hash` differs from the cached hash. Absent entries count as changed.
    pub fn is_hash_changed(&self, region: Region, path: &str, hash: &str) -> bool {
        self.get_hash(region, path) != Some(hash)
    }

    /// Remove one asset entry. Returns whether it existed.
    pub fn remove_asset(&mut self, region: Region, path: &str) -> bool {
        let Some(entries) = self.regions.get_mut(&region) else {
            return false;
        };
        let removed = entries.remove(&normalize_path(path)).is_some();
        if entries.is_empty() {
            self.regions.remove(&region);
        }
        removed
    }

    /// Clear one region, or every region when `region` is `None`.
    pub fn clear(&mut self, region: Option<Region>) {
        match region {
            Some(region) => {
                self.regions.remove(&region);
            }
            None => self.regions.clear(),
        }
    }

    /// Number of assets cached for a region.
    pub fn region_count(&self, region: Region) -> usize {
        self.regions.get(&region).map_or(0, BTreeMap::len)
    }

    /// Number of assets cached across all regions.
    pub fn total_assets(&self) -> usize {
        self.regions.values().map(BTreeMap::len).sum()
    }

    /// Regions with at least one cached asset.
    pub fn regions(&self) -> impl Iterator<Item = Region> + '_ {
        self.regions.keys().copied()
    }

    /// Keep only the `(path, hash)` pairs that are new or changed.
    pub fn filter_changed<'a, I>(&self, region: Region, manifest: I) -> Vec<(&'a str, &'a str)>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        manifest
            .into_iter()
            .filter(|(path, hash)| self.is_hash_changed(region, path, hash))
            .collect()
    }
}

impl CacheDocument for AssetCache {
    const KIND: &'static str = "assets";

    /// Accepted legacy shapes:
    /// - `{ "<path>": "<hash>" }` (flat, predates regions)
    /// - `{ "assets": { "<path>": "<hash>" } }`
    /// - `{ "assets": { "<REGION>": { ... } } }`
    fn from_legacy(value: Value) -> Option<Self> {
        let Value::Object(mut map) = value else {
            return None;
        };

        if map.len() == 1 {
            if let Some(inner) = map.remove("assets") {
                if let Ok(doc) = serde_json::from_value::<AssetCache>(inner.clone()) {
                    return Some(doc);
                }
                return flat_to_default_region(inner);
            }
        }

        flat_to_default_region(Value::Object(map))
    }
}

fn flat_to_default_region(value: Value) -> Option<AssetCache> {
    let flat: BTreeMap<String, String> = serde_json::from_value(value).ok()?;
    let mut cache = AssetCache::default();
    for (path, hash) in flat {
        cache.set_hash(Region::LEGACY_DEFAULT, &path, hash);
    }
    Some(cache)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_change_detection() {
        let mut cache = AssetCache::default();
        cache.set_hash(Region::Cn, "p", "h1");

        assert!(!cache.is_hash_changed(Region::Cn, "p", "h1"));
        assert!(cache.is_hash_changed(Region::Cn, "p", "h2"));
        assert!(cache.is_hash_changed(Region::Cn, "missing", "h1"));
        // Same path in another region is a different asset
        assert!(cache.is_hash_changed(Region::Jp, "p", "h1"));
    }

    #[test]
    fn test_paths_are_normalized() {
        let mut cache = AssetCache::default();
        cache.set_hash(Region::En, "arts\\ui\\icon.ab", "h");
        assert_eq!(cache.get_hash(Region::En, "arts/ui/icon.ab"), Some("h"));
    }

    #[test]
    fn test_filter_changed() {
        let mut cache = AssetCache::default();
        cache.set_hash(Region::Cn, "a", "1");
        cache.set_hash(Region::Cn, "b", "2");

        let manifest = [("a", "1"), ("b", "3"), ("c", "4")];
        let changed = cache.filter_changed(Region::Cn, manifest);
        assert_eq!(changed, vec![("b", "3"), ("c", "4")]);
    }

    #[test]
    fn test_clear_region_only() {
        let mut cache = AssetCache::default();
        cache.set_hash(Region::Cn, "a", "1");
        cache.set_hash(Region::Kr, "a", "1");

        cache.clear(Some(Region::Cn));
        assert_eq!(cache.region_count(Region::Cn), 0);
        assert_eq!(cache.region_count(Region::Kr), 1);

        cache.clear(None);
        assert_eq!(cache.total_assets(), 0);
    }

    #[test]
    fn test_remove_asset_drops_empty_region() {
        let mut cache = AssetCache::default();
        cache.set_hash(Region::Tw, "a", "1");
        assert!(cache.remove_asset(Region::Tw, "a"));
        assert!(!cache.remove_asset(Region::Tw, "a"));
        assert_eq!(cache.regions().count(), 0);
    }

    #[test]
    fn test_legacy_flat_map() {
        let doc = AssetCache::from_legacy(json!({"a/b.png": "h1"})).unwrap();
        assert_eq!(doc.get_hash(Region::LEGACY_DEFAULT, "a/b.png"), Some("h1"));
        assert_eq!(doc.total_assets(), 1);
    }

    #[test]
    fn test_legacy_wrapped_shapes() {
        let flat = AssetCache::from_legacy(json!({"assets": {"x": "1"}})).unwrap();
        assert_eq!(flat.get_hash(Region::LEGACY_DEFAULT, "x"), Some("1"));

        let regional = AssetCache::from_legacy(json!({"assets": {"JP": {"x": "2"}}})).unwrap();
        assert_eq!(regional.get_hash(Region::Jp, "x"), Some("2"));
    }

    #[test]
    fn test_legacy_rejects_unknown_shape() {
        assert!(AssetCache::from_legacy(json!({"a": 1})).is_none());
        assert!(AssetCache::from_legacy(json!([1, 2])).is_none());
    }

    #[test]
    fn test_current_shape_on_disk() {
        let mut cache = AssetCache::default();
        cache.set_hash(Region::Cn, "a/b.png", "h1");
        let value = serde_json::to_value(&cache).unwrap();
        assert_eq!(value, json!({"CN": {"a/b.png": "h1"}}));
    }
}
