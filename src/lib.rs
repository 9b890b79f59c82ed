//! Sanity Pack - incremental game-data extraction
//!
//! Fetches per-region asset releases, skipping assets whose published hash
//! is already cached, and decodes binary tables by searching the schema
//! history for a revision that decodes them.

pub mod config;
pub mod decode;
pub mod download;
pub mod error;
pub mod pipeline;
pub mod summary;

pub use config::{Config, ConfigError, LoadedConfig, ServerConfig};
pub use decode::{DecodePipeline, DecodeReport};
pub use download::{AssetSource, DownloadReport, Downloader, FetchError, Manifest, ManifestEntry, MirrorSource, RemoteVersion};
pub use error::PipelineError;
pub use pipeline::{Stage, StageContext};
pub use summary::{RunSummary, StageSummary, Status};
