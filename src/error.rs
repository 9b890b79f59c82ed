//! Region-level pipeline errors
//!
//! Failures of a single asset or file never surface here; they are counted in
//! the stage reports. A `PipelineError` means a whole region stage could not run.

use sanity_cache::CacheError;
use sanity_schema::NamingError;

use crate::download::FetchError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to fetch remote version: {0}")]
    Version(#[source] FetchError),

    #[error("failed to fetch asset manifest: {0}")]
    Manifest(#[source] FetchError),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to create {path}: {source}")]
    OutputDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid schema naming rules: {0}")]
    Naming(#[from] NamingError),

    #[error("failed to persist caches: {0}")]
    Cache(#[from] CacheError),
}
