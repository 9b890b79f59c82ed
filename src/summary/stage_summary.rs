//! Per-region, per-stage outcome counts

use sanity_cache::Region;
use serde::{Deserialize, Serialize};

use crate::decode::DecodeReport;
use crate::download::DownloadReport;

/// Outcome status of a stage or a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Nothing failed
    Success,
    /// Some items failed, the rest completed
    Partial,
    /// The stage could not run at all
    Failed,
}

/// Counts for one stage of one region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    pub region: Region,
    pub stage: String,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,

    /// Schemas with no working revision
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<String>,

    /// Stage-level error, when the stage could not run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageSummary {
    pub fn from_download(region: Region, report: &DownloadReport) -> Self {
        Self {
            region,
            stage: "download".to_string(),
            succeeded: report.downloaded,
            skipped: report.unchanged + report.filtered,
            failed: report.failed,
            unresolved: Vec::new(),
            error: None,
        }
    }

    pub fn from_decode(region: Region, report: &DecodeReport) -> Self {
        Self {
            region,
            stage: "decode".to_string(),
            succeeded: report.decoded,
            skipped: report.skipped + report.unknown_files,
            failed: report.failed,
            unresolved: report.unresolved.clone(),
            error: None,
        }
    }

    pub fn failed(region: Region, stage: &str, error: impl ToString) -> Self {
        Self {
            region,
            stage: stage.to_string(),
            succeeded: 0,
            skipped: 0,
            failed: 0,
            unresolved: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn status(&self) -> Status {
        if self.error.is_some() {
            Status::Failed
        } else if self.failed > 0 || !self.unresolved.is_empty() {
            Status::Partial
        } else {
            Status::Success
        }
    }
}
