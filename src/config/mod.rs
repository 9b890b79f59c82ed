//! Configuration
//!
//! A single document loaded from `--config` (default `sanity-pack.toml`).
//! TOML is the native format; a `.json` path is read as JSON. Every field has
//! a default, and a missing file yields the defaults without writing one.

mod server;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sanity_cache::Region;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use server::ServerConfig;

/// Default config file name
pub const DEFAULT_CONFIG_FILE: &str = "sanity-pack.toml";

/// Errors loading the configuration. These are fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse TOML config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to parse JSON config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Tool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of extracted assets; one sub-directory per region
    pub output_dir: PathBuf,

    /// Directory holding the cache documents
    pub cache_dir: PathBuf,

    /// Directory receiving bound schema definitions
    pub fbs_dir: PathBuf,

    /// Local checkout of the schema history
    pub schema_repo: PathBuf,

    /// Remote to clone the schema history from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_repo_url: Option<String>,

    /// Directory of `<schema>.fbs` files inside the schema history
    pub schema_subdir: String,

    /// FlatBuffers compiler, a command name or a full path
    pub flatc_path: String,

    /// Upper bound on concurrent download and decode workers
    pub concurrency: usize,

    /// Files trial-decoded per candidate schema revision
    pub sample_size: usize,

    /// Opaque header length in front of each binary table
    pub header_len: usize,

    /// Table names recognized in addition to the built-in list
    pub extra_schemas: Vec<String>,

    /// Root of a local asset mirror
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror_dir: Option<PathBuf>,

    pub servers: BTreeMap<Region, ServerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let servers = Region::ALL
            .into_iter()
            .map(|region| {
                let server = if region == Region::Cn {
                    ServerConfig::default()
                } else {
                    ServerConfig::disabled()
                };
                (region, server)
            })
            .collect();

        Self {
            output_dir: PathBuf::from("./assets"),
            cache_dir: PathBuf::from("./cache"),
            fbs_dir: PathBuf::from("./fbs"),
            schema_repo: PathBuf::from("./OpenArknightsFBS"),
            schema_repo_url: None,
            schema_subdir: sanity_schema::DEFAULT_SCHEMA_SUBDIR.to_string(),
            flatc_path: "flatc".to_string(),
            concurrency: 32,
            sample_size: sanity_schema::DEFAULT_SAMPLE_SIZE,
            header_len: sanity_schema::DEFAULT_HEADER_LEN,
            extra_schemas: Vec::new(),
            mirror_dir: None,
            servers,
        }
    }
}

/// A loaded configuration and where it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub path: PathBuf,
    /// SHA-256 of the raw file bytes; `None` when defaults were used
    pub digest: Option<String>,
}

impl Config {
    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<LoadedConfig, ConfigError> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(LoadedConfig {
                config: Config::default(),
                path: path.to_path_buf(),
                digest: None,
            });
        }

        let bytes = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let config = if is_json(path) {
            Self::parse_json(&bytes).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            let text = String::from_utf8_lossy(&bytes);
            Self::parse_toml(&text).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?
        };
        config.validate()?;

        tracing::debug!(path = %path.display(), %digest, "Loaded config");
        Ok(LoadedConfig {
            config,
            path: path.to_path_buf(),
            digest: Some(digest),
        })
    }

    pub fn parse_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn parse_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.flatc_path.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "flatc_path".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Worker pool size, never below one.
    pub fn worker_count(&self) -> usize {
        self.concurrency.max(1)
    }

    /// Regions whose server entry is enabled.
    pub fn enabled_regions(&self) -> Vec<Region> {
        self.servers
            .iter()
            .filter(|(_, server)| server.enabled)
            .map(|(region, _)| *region)
            .collect()
    }

    /// Settings for `region`; regions absent from the file use the defaults.
    pub fn server(&self, region: Region) -> ServerConfig {
        self.servers.get(&region).cloned().unwrap_or_default()
    }

    pub fn is_path_whitelisted(&self, region: Region, path: &str) -> bool {
        self.servers
            .get(&region)
            .map_or(true, |server| server.is_whitelisted(path))
    }

    /// Output directory for one region.
    pub fn region_output_dir(&self, region: Region) -> PathBuf {
        self.output_dir.join(region.dir_name())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
