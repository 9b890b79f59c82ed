//! Schema binding cache (schema_bindings.json)
//!
//! Remembers, per region, which schema-history commit decoded a schema's
//! binaries. Entries are written only after a successful trial decode and are
//! trusted until explicitly cleared.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::region::Region;
use crate::store::CacheDocument;

/// File name of the binding document inside the cache directory.
pub const BINDING_CACHE_FILE: &str = "schema_bindings.json";

/// Identifier of a commit in the schema history.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log output (first 8 characters).
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommitId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Per-region map of schema name to a commit known to decode it.
///
/// On disk: `{ "<REGION>": { "<schemaName>": "<commitId>" } }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaBindingCache {
    regions: BTreeMap<Region, BTreeMap<String, CommitId>>,
}

impl SchemaBindingCache {
    pub fn get_commit(&self, region: Region, schema: &str) -> Option<&CommitId> {
        self.regions.get(&region)?.get(schema)
    }

    /// Record a validated binding, replacing any previous one for the schema.
    pub fn set_commit(&mut self, region: Region, schema: &str, commit: CommitId) {
        self.regions
            .entry(region)
            .or_default()
            .insert(schema.to_string(), commit);
    }

    pub fn remove_commit(&mut self, region: Region, schema: &str) -> Option<CommitId> {
        let entries = self.regions.get_mut(&region)?;
        let removed = entries.remove(schema);
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

    pub fn region_count(&self, region: Region) -> usize {
        self.regions.get(&region).map_or(0, BTreeMap::len)
    }

    pub fn total_bindings(&self) -> usize {
        self.regions.values().map(BTreeMap::len).sum()
    }

    pub fn regions(&self) -> impl Iterator<Item = Region> + '_ {
        self.regions.keys().copied()
    }

    /// Bindings of one region, ordered by schema name.
    pub fn bindings(&self, region: Region) -> impl Iterator<Item = (&str, &CommitId)> {
        self.regions
            .get(&region)
            .into_iter()
            .flat_map(|entries| entries.iter().map(|(schema, commit)| (schema.as_str(), commit)))
    }
}

impl CacheDocument for SchemaBindingCache {
    const KIND: &'static str = "schema_bindings";
}
