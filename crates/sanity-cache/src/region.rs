//! Game deployment regions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One independently versioned game deployment.
///
/// Every cache document is partitioned by region first; nothing is shared
/// between regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "CN")]
    Cn,
    #[serde(rename = "TW")]
    Tw,
    #[serde(rename = "EN")]
    En,
    #[serde(rename = "JP")]
    Jp,
    #[serde(rename = "KR")]
    Kr,
}

impl Region {
    /// All regions in declaration order.
    pub const ALL: [Region; 5] = [Region::Cn, Region::Tw, Region::En, Region::Jp, Region::Kr];

    /// Region that un-namespaced legacy documents are assigned to.
    pub const LEGACY_DEFAULT: Region = Region::Cn;

    /// Upper-case region code as stored on disk ("CN", "JP", ...).
    pub fn code(&self) -> &'static str {
        match self {
            Region::Cn => "CN",
            Region::Tw => "TW",
            Region::En => "EN",
            Region::Jp => "JP",
            Region::Kr => "KR",
        }
    }

    /// Lower-case directory name used for per-region output folders.
    pub fn dir_name(&self) -> String {
        self.code().to_ascii_lowercase()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error returned when a region code is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown region '{0}' (expected one of CN, TW, EN, JP, KR)")]
pub struct UnknownRegion(pub String);

impl FromStr for Region {
    type Err = UnknownRegion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CN" => Ok(Region::Cn),
            "TW" => Ok(Region::Tw),
            "EN" => Ok(Region::En),
            "JP" => Ok(Region::Jp),
            "KR" => Ok(Region::Kr),
            _ => Err(UnknownRegion(s.to_string())),
        }
    }
}
