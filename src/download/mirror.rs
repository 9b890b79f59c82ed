//! Local mirror asset source
//!
//! Layout:
//! ```text
//! <root>/<REGION>/version.json
//! <root>/<REGION>/assets/<resource>/hot_update_list.json
//! <root>/<REGION>/assets/<resource>/<published name>
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sanity_cache::Region;

use super::{AssetSource, FetchError, Manifest, RemoteVersion};

/// Reads versions, manifests and payloads from a directory tree.
#[derive(Debug, Clone)]
pub struct MirrorSource {
    root: PathBuf,
}

impl MirrorSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn region_dir(&self, region: Region) -> PathBuf {
        self.root.join(region.code())
    }

    fn resource_dir(&self, region: Region, resource: &str) -> PathBuf {
        self.region_dir(region).join("assets").join(resource)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, FetchError> {
        fs::read(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                FetchError::NotFound(path.display().to_string())
            } else {
                FetchError::Io {
                    what: path.display().to_string(),
                    source,
                }
            }
        })
    }
}

impl AssetSource for MirrorSource {
    fn fetch_version(&self, region: Region) -> Result<RemoteVersion, FetchError> {
        let path = self.region_dir(region).join("version.json");
        let bytes = self.read(&path)?;
        serde_json::from_slice(&bytes).map_err(|source| FetchError::Parse {
            what: path.display().to_string(),
            source,
        })
    }

    fn fetch_manifest(&self, region: Region, resource: &str) -> Result<Manifest, FetchError> {
        let path = self
            .resource_dir(region, resource)
            .join("hot_update_list.json");
        let bytes = self.read(&path)?;
        Manifest::parse(&bytes).map_err(|source| FetchError::Parse {
            what: path.display().to_string(),
            source,
        })
    }

    fn fetch_asset(&self, region: Region, resource: &str, published: &str) -> Result<Vec<u8>, FetchError> {
        if published.contains('/') || published.contains('\\') || published.starts_with('.') {
            return Err(FetchError::NotFound(published.to_string()));
        }
        self.read(&self.resource_dir(region, resource).join(published))
    }
}
