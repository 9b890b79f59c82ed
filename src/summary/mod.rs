//! Run and stage summaries

mod run_summary;
mod stage_summary;

pub use run_summary::{RunSummary, RUN_SUMMARY_SCHEMA_VERSION};
pub use stage_summary::{StageSummary, Status};
