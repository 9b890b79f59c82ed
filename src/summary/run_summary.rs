//! Run summary printed at the end of every stage command

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stage_summary::{StageSummary, Status};

/// Schema version of the JSON summary
pub const RUN_SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Aggregated outcome of one invocation across regions and stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub schema_version: u32,

    pub run_id: String,

    pub created_at: DateTime<Utc>,

    pub status: Status,

    /// 0 when nothing failed, 1 otherwise
    pub exit_code: i32,

    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,

    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,

    pub stages: Vec<StageSummary>,

    pub human_summary: String,
}

impl RunSummary {
    pub fn from_stages(mut stages: Vec<StageSummary>, duration_ms: u64) -> Self {
        stages.sort_by(|a, b| a.region.cmp(&b.region));

        let succeeded = stages.iter().map(|s| s.succeeded).sum();
        let skipped = stages.iter().map(|s| s.skipped).sum();
        let failed = stages.iter().map(|s| s.failed).sum();

        let status = if stages.iter().any(|s| s.status() == Status::Failed) {
            Status::Failed
        } else if stages.iter().any(|s| s.status() == Status::Partial) {
            Status::Partial
        } else {
            Status::Success
        };
        let exit_code = if status == Status::Success { 0 } else { 1 };
        let human_summary = Self::generate_human_summary(status, &stages, succeeded, skipped, failed);

        Self {
            schema_version: RUN_SUMMARY_SCHEMA_VERSION,
            run_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            status,
            exit_code,
            succeeded,
            skipped,
            failed,
            duration_ms,
            stages,
            human_summary,
        }
    }

    fn generate_human_summary(
        status: Status,
        stages: &[StageSummary],
        succeeded: usize,
        skipped: usize,
        failed: usize,
    ) -> String {
        if stages.is_empty() {
            return "No regions processed".to_string();
        }
        let counts = format!("{} succeeded, {} skipped, {} failed", succeeded, skipped, failed);
        match status {
            Status::Success => format!("Run succeeded: {}", counts),
            Status::Partial => {
                let unresolved: usize = stages.iter().map(|s| s.unresolved.len()).sum();
                if unresolved > 0 {
                    format!("Run partially succeeded: {}, {} schema(s) unresolved", counts, unresolved)
                } else {
                    format!("Run partially succeeded: {}", counts)
                }
            }
            Status::Failed => {
                let broken = stages.iter().filter(|s| s.error.is_some()).count();
                format!("Run failed: {} stage(s) could not run; {}", broken, counts)
            }
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Multi-line text rendering, one line per region stage.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for stage in &self.stages {
            out.push_str(&format!(
                "{:<3} {:<9} {:>7} ok {:>7} skipped {:>5} failed",
                stage.region.code(),
                stage.stage,
                stage.succeeded,
                stage.skipped,
                stage.failed
            ));
            if let Some(err) = &stage.error {
                out.push_str(&format!("  error: {}", err));
            }
            if !stage.unresolved.is_empty() {
                out.push_str(&format!("  unresolved: {}", stage.unresolved.join(", ")));
            }
            out.push('\n');
        }
        out.push_str(&self.human_summary);
        out.push('\n');
        out
    }
}
