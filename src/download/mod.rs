//! Incremental asset download
//!
//! For one region: fetch the remote version pair and the asset manifest, then
//! fetch only the assets whose manifest hash differs from the asset cache.
//! Each asset is handled by one worker on a bounded pool. An asset's cache
//! entry is written only after its payload was fetched and written to disk.
//!
//! Caches are mutated in memory only; the caller persists them after every
//! worker of the run has finished.

mod extract;
mod mirror;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path};

use rayon::prelude::*;
use sanity_cache::{normalize_path, CacheManager, Region};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::PipelineError;

pub use extract::{write_payload, ExtractError};
pub use mirror::MirrorSource;

/// Errors from an [`AssetSource`]
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("failed to read {what}: {source}")]
    Io {
        what: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {what}: {source}")]
    Parse {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("transport error: {0}")]
    Transport(String),
}

/// Version pair published by a region's version endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVersion {
    #[serde(rename = "resVersion")]
    pub resource: String,
    #[serde(rename = "clientVersion")]
    pub client: String,
}

/// One entry of the hot update list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    #[serde(alias = "md5")]
    pub hash: String,
}

/// Hot update list for one resource version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "abInfos", default)]
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Parse a hot update list, dropping entries without a name or hash.
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct RawEntry {
            name: Option<String>,
            hash: Option<String>,
            md5: Option<String>,
        }
        #[derive(Deserialize)]
        struct Raw {
            #[serde(rename = "abInfos", default)]
            entries: Vec<RawEntry>,
        }

        let raw: Raw = serde_json::from_slice(bytes)?;
        let entries = raw
            .entries
            .into_iter()
            .filter_map(|e| {
                let name = e.name.filter(|n| !n.is_empty())?;
                let hash = e.hash.or(e.md5).filter(|h| !h.is_empty())?;
                Some(ManifestEntry { name, hash })
            })
            .collect();
        Ok(Self { entries })
    }
}

/// Where manifests and asset payloads come from.
pub trait AssetSource: Send + Sync {
    fn fetch_version(&self, region: Region) -> Result<RemoteVersion, FetchError>;

    fn fetch_manifest(&self, region: Region, resource: &str) -> Result<Manifest, FetchError>;

    /// Raw payload of one asset, addressed by its published name.
    fn fetch_asset(&self, region: Region, resource: &str, published: &str) -> Result<Vec<u8>, FetchError>;
}

/// Name under which an asset is published: `.ab`, `.bin` and `.mp4` removed,
/// `/` replaced by `_`, `#` by `__`, with a `.dat` suffix.
pub fn published_name(path: &str) -> String {
    let stripped = path.replace(".ab", "").replace(".bin", "").replace(".mp4", "");
    format!("{}.dat", stripped.replace('/', "_").replace('#', "__"))
}

/// Top-level folder of an asset path, used for folder size accounting.
fn top_folder(path: &str) -> String {
    match path.split_once('/') {
        Some((folder, _)) => folder.to_string(),
        None => ".".to_string(),
    }
}

/// Bytes currently on disk under one top-level folder of `out_dir`.
///
/// The `.` folder counts only files directly inside `out_dir`.
fn folder_size(out_dir: &Path, folder: &str) -> u64 {
    let (root, max_depth) = if folder == "." {
        (out_dir.to_path_buf(), 1)
    } else {
        (out_dir.join(folder), usize::MAX)
    };
    WalkDir::new(root)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

/// A manifest name that would escape the output directory.
fn is_unsafe_path(path: &str) -> bool {
    Path::new(path)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AssetOutcome {
    Filtered,
    Unchanged,
    Downloaded { folder: String, bytes: u64 },
    Failed,
}

/// Result of downloading one region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    pub region: Option<Region>,
    pub resource: String,
    pub client: String,
    pub version_changed: bool,
    /// Manifest entries
    pub total: usize,
    pub downloaded: usize,
    /// Hash matched the asset cache
    pub unchanged: usize,
    /// Not covered by the path whitelist
    pub filtered: usize,
    pub failed: usize,
    pub bytes_written: u64,
    /// Bytes written this run per top-level folder
    pub folders: BTreeMap<String, u64>,
}

/// Runs the download stage for a region.
pub struct Downloader<'a> {
    source: &'a dyn AssetSource,
    caches: &'a CacheManager,
    config: &'a Config,
}

impl<'a> Downloader<'a> {
    pub fn new(source: &'a dyn AssetSource, caches: &'a CacheManager, config: &'a Config) -> Self {
        Self {
            source,
            caches,
            config,
        }
    }

    pub fn run(&self, region: Region) -> Result<DownloadReport, PipelineError> {
        let remote = self
            .source
            .fetch_version(region)
            .map_err(PipelineError::Version)?;
        let version_changed = self
            .caches
            .versions()
            .read(|v| v.is_version_changed(region, &remote.resource, &remote.client));
        tracing::info!(%region, resource = %remote.resource, client = %remote.client, version_changed, "Fetched remote version");

        let manifest = self
            .source
            .fetch_manifest(region, &remote.resource)
            .map_err(PipelineError::Manifest)?;

        let out_dir = self.config.region_output_dir(region);
        fs::create_dir_all(&out_dir).map_err(|source| PipelineError::OutputDir {
            path: out_dir.clone(),
            source,
        })?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.worker_count())
            .build()?;
        let outcomes: Vec<AssetOutcome> = pool.install(|| {
            manifest
                .entries
                .par_iter()
                .map(|entry| self.download_one(region, &remote.resource, entry, &out_dir))
                .collect()
        });

        let mut report = DownloadReport {
            region: Some(region),
            resource: remote.resource.clone(),
            client: remote.client.clone(),
            version_changed,
            total: manifest.entries.len(),
            ..DownloadReport::default()
        };
        for outcome in outcomes {
            match outcome {
                AssetOutcome::Filtered => report.filtered += 1,
                AssetOutcome::Unchanged => report.unchanged += 1,
                AssetOutcome::Failed => report.failed += 1,
                AssetOutcome::Downloaded { folder, bytes } => {
                    report.downloaded += 1;
                    report.bytes_written += bytes;
                    *report.folders.entry(folder).or_insert(0) += bytes;
                }
            }
        }

        let sizes: BTreeMap<String, u64> = report
            .folders
            .keys()
            .map(|folder| (folder.clone(), folder_size(&out_dir, folder)))
            .collect();
        self.caches.versions().update(|v| {
            v.set_version(region, &remote.resource, &remote.client);
            v.set_folder_sizes(region, &sizes);
        });

        tracing::info!(
            %region,
            downloaded = report.downloaded,
            unchanged = report.unchanged,
            filtered = report.filtered,
            failed = report.failed,
            bytes = report.bytes_written,
            "Download finished"
        );
        Ok(report)
    }

    fn download_one(
        &self,
        region: Region,
        resource: &str,
        entry: &ManifestEntry,
        out_dir: &Path,
    ) -> AssetOutcome {
        let path = normalize_path(&entry.name);

        if !self.config.is_path_whitelisted(region, &path) {
            return AssetOutcome::Filtered;
        }
        if !self
            .caches
            .assets()
            .read(|a| a.is_hash_changed(region, &path, &entry.hash))
        {
            return AssetOutcome::Unchanged;
        }
        if is_unsafe_path(&path) {
            tracing::warn!(%region, path = %path, "Refusing asset path outside output directory");
            return AssetOutcome::Failed;
        }

        let payload = match self.source.fetch_asset(region, resource, &published_name(&path)) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%region, path = %path, error = %e, "Failed to fetch asset");
                return AssetOutcome::Failed;
            }
        };

        match write_payload(&payload, &out_dir.join(&path)) {
            Ok(bytes) => {
                self.caches
                    .assets()
                    .update(|a| a.set_hash(region, &path, entry.hash.clone()));
                tracing::debug!(%region, path = %path, bytes, "Downloaded asset");
                AssetOutcome::Downloaded {
                    folder: top_folder(&path),
                    bytes,
                }
            }
            Err(e) => {
                tracing::warn!(%region, path = %path, error = %e, "Failed to extract asset");
                AssetOutcome::Failed
            }
        }
    }
}
