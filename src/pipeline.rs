//! Stage dispatch and multi-region orchestration
//!
//! A run applies a list of stages to a list of regions. Regions are
//! independent and run concurrently on scoped threads; within a region the
//! stages run in order. Caches are saved once, after every region thread has
//! joined, so a saved document never reflects a half-finished run. A region whose
//! thread panics is reported as failed and the others are still saved.

use std::time::Instant;

use sanity_cache::{CacheManager, Region};
use sanity_schema::{Decoder, VersionHistoryProvider};

use crate::config::Config;
use crate::decode::DecodePipeline;
use crate::download::{AssetSource, Downloader};
use crate::error::PipelineError;
use crate::summary::{RunSummary, StageSummary};

/// A unit of per-region work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Fetch changed assets
    Download,
    /// Resolve schemas and decode binary tables
    Decode,
}

impl Stage {
    /// Stages run by `pipeline`, in order.
    pub const ALL: [Stage; 2] = [Stage::Download, Stage::Decode];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::Decode => "decode",
        }
    }

    /// Run this stage for one region. Never fails; failures are in the summary.
    pub fn process(&self, ctx: &StageContext<'_>, region: Region) -> StageSummary {
        let _span = tracing::info_span!("stage", stage = self.name(), %region).entered();
        match self {
            Stage::Download => {
                let Some(source) = ctx.source else {
                    return StageSummary::failed(region, self.name(), "no asset source configured");
                };
                match Downloader::new(source, ctx.caches, ctx.config).run(region) {
                    Ok(report) => StageSummary::from_download(region, &report),
                    Err(e) => {
                        tracing::error!(%region, error = %e, "Download stage failed");
                        StageSummary::failed(region, self.name(), e)
                    }
                }
            }
            Stage::Decode => {
                let pipeline = DecodePipeline::new(ctx.history, ctx.decoder, ctx.caches, ctx.config)
                    .force(ctx.force);
                match pipeline.run(region) {
                    Ok(report) => StageSummary::from_decode(region, &report),
                    Err(e) => {
                        tracing::error!(%region, error = %e, "Decode stage failed");
                        StageSummary::failed(region, self.name(), e)
                    }
                }
            }
        }
    }
}

/// Everything a stage needs, borrowed from the process entry point
pub struct StageContext<'a> {
    pub config: &'a Config,
    pub caches: &'a CacheManager,
    pub source: Option<&'a dyn AssetSource>,
    pub history: &'a dyn VersionHistoryProvider,
    pub decoder: &'a dyn Decoder,
    pub force: bool,
}

/// Run `stages` for every region in `regions`, then persist the caches.
pub fn run(ctx: &StageContext<'_>, regions: &[Region], stages: &[Stage]) -> Result<RunSummary, PipelineError> {
    let started = Instant::now();

    let per_region: Vec<Vec<StageSummary>> = std::thread::scope(|scope| {
        let handles: Vec<_> = regions
            .iter()
            .map(|&region| {
                let handle = scope.spawn(move || {
                    stages
                        .iter()
                        .map(|stage| stage.process(ctx, region))
                        .collect::<Vec<_>>()
                });
                (region, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(region, handle)| match handle.join() {
                Ok(summaries) => summaries,
                Err(_) => {
                    tracing::error!(%region, "Region worker panicked");
                    stages
                        .iter()
                        .map(|stage| StageSummary::failed(region, stage.name(), "region worker panicked"))
                        .collect()
                }
            })
            .collect()
    });

    // Every region thread has joined; nothing mutates the caches past this point
    ctx.caches.save_all()?;

    let duration_ms = started.elapsed().as_millis() as u64;
    Ok(RunSummary::from_stages(
        per_region.into_iter().flatten().collect(),
        duration_ms,
    ))
}
