//! Sanity Pack cache documents
//!
//! Tracks what has already been fetched and decoded per region so that
//! repeat runs only do incremental work:
//! - `versions.json`: last observed (resource, client) version pair
//! - `assets.json`: content path → manifest hash of the copy on disk
//! - `schema_bindings.json`: schema name → history commit that decodes it
//!
//! Each document is lazily loaded, migrated from legacy shapes, held in
//! memory, and flushed atomically at explicit checkpoints.

pub mod assets;
pub mod bindings;
pub mod error;
pub mod manager;
pub mod region;
pub mod store;
pub mod versions;

pub use assets::{normalize_path, AssetCache, ASSET_CACHE_FILE};
pub use bindings::{CommitId, SchemaBindingCache, BINDING_CACHE_FILE};
pub use error::{CacheError, CacheResult};
pub use manager::{CacheKind, CacheManager, CacheStats, RegionStats, ValidationReport};
pub use region::{Region, UnknownRegion};
pub use store::{CacheDocument, CacheStore, DocumentStatus};
pub use versions::{ServerVersion, VersionCache, VERSION_CACHE_FILE};
