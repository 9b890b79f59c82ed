//! Binary table decoding
//!
//! Groups a region's `.bytes` files by inferred schema name, binds each
//! schema to a history revision through the [`SchemaResolver`], and decodes
//! every file of a bound schema to pretty JSON beside the input. A schema
//! that cannot be bound is reported and its files are left for the next run.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use sanity_cache::{CacheManager, Region};
use sanity_schema::{
    materialize_schema, strip_header, unwrap_single_root, Decoder, SchemaNamer, SchemaResolver,
    VersionHistoryProvider, BINARY_EXTENSION,
};
use serde::Serialize;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::PipelineError;

/// Result of decoding one region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecodeReport {
    pub region: Option<Region>,
    pub schemas: usize,
    pub resolved: usize,
    /// Resolved from the memoized binding on the first try
    pub cached: usize,
    pub unresolved: Vec<String>,
    /// Files that matched no schema
    pub unknown_files: usize,
    pub decoded: usize,
    /// Output already newer than the input, or schema unresolved
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct SchemaOutcome {
    resolved: bool,
    cached: bool,
    unresolved: Option<String>,
    decoded: usize,
    skipped: usize,
    failed: usize,
}

/// Runs the decode stage for a region.
pub struct DecodePipeline<'a> {
    history: &'a dyn VersionHistoryProvider,
    decoder: &'a dyn Decoder,
    caches: &'a CacheManager,
    config: &'a Config,
    force: bool,
}

impl<'a> DecodePipeline<'a> {
    pub fn new(
        history: &'a dyn VersionHistoryProvider,
        decoder: &'a dyn Decoder,
        caches: &'a CacheManager,
        config: &'a Config,
    ) -> Self {
        Self {
            history,
            decoder,
            caches,
            config,
            force: false,
        }
    }

    /// Decode files even when their JSON output is up to date.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn run(&self, region: Region) -> Result<DecodeReport, PipelineError> {
        let mut report = DecodeReport {
            region: Some(region),
            ..DecodeReport::default()
        };

        let dir = self.config.region_output_dir(region);
        if !dir.is_dir() {
            tracing::warn!(%region, dir = %dir.display(), "Output directory not found, nothing to decode");
            return Ok(report);
        }

        let namer = SchemaNamer::standard(&self.config.extra_schemas)?;
        let groups = namer.group(binary_files(&dir));
        report.schemas = groups.groups.len();
        report.unknown_files = groups.unknown.len();
        tracing::info!(%region, schemas = report.schemas, files = groups.file_count(), unknown = report.unknown_files, "Grouped binary files");

        let resolver = SchemaResolver::new(self.history, self.decoder, self.caches.bindings())
            .with_schema_subdir(self.config.schema_subdir.clone())
            .with_sample_size(self.config.sample_size)
            .with_header_len(self.config.header_len);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.worker_count())
            .build()?;
        let outcomes: Vec<SchemaOutcome> = pool.install(|| {
            groups
                .groups
                .par_iter()
                .map(|(schema, files)| self.process_schema(&resolver, region, schema, files))
                .collect()
        });

        for outcome in outcomes {
            report.resolved += usize::from(outcome.resolved);
            report.cached += usize::from(outcome.cached);
            report.decoded += outcome.decoded;
            report.skipped += outcome.skipped;
            report.failed += outcome.failed;
            report.unresolved.extend(outcome.unresolved);
        }
        report.unresolved.sort();

        tracing::info!(
            %region,
            resolved = report.resolved,
            unresolved = report.unresolved.len(),
            decoded = report.decoded,
            skipped = report.skipped,
            failed = report.failed,
            "Decode finished"
        );
        Ok(report)
    }

    fn process_schema(
        &self,
        resolver: &SchemaResolver<'_>,
        region: Region,
        schema: &str,
        files: &[PathBuf],
    ) -> SchemaOutcome {
        let mut outcome = SchemaOutcome::default();

        let pending: Vec<PathBuf> = files
            .iter()
            .filter(|path| self.force || !is_fresh(path))
            .cloned()
            .collect();
        outcome.skipped = files.len() - pending.len();
        if pending.is_empty() {
            tracing::debug!(%region, schema, "All outputs up to date");
            return outcome;
        }

        let resolution = match resolver.resolve(region, schema, files) {
            Ok(resolution) => resolution,
            Err(e) => {
                tracing::warn!(%region, schema, error = %e, "Schema unresolved, skipping its files");
                outcome.unresolved = Some(schema.to_string());
                outcome.skipped += pending.len();
                return outcome;
            }
        };
        outcome.resolved = true;
        outcome.cached = resolution.cached;

        if let Err(e) = materialize_schema(&self.config.fbs_dir, region, &resolution) {
            tracing::warn!(%region, schema, error = %e, "Failed to write bound schema");
        }

        let decoded = pending
            .par_iter()
            .filter(|path| self.decode_file(&resolution.schema_text, path))
            .count();
        outcome.decoded = decoded;
        outcome.failed = pending.len() - decoded;
        outcome
    }

    /// Decode one file to `<stem>.json` beside it; false on any failure.
    fn decode_file(&self, schema_text: &str, path: &Path) -> bool {
        let output = path.with_extension("json");

        let result = fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                let body = strip_header(&bytes, self.config.header_len).map_err(|e| e.to_string())?;
                let value = self
                    .decoder
                    .decode(schema_text, body)
                    .map_err(|e| e.to_string())?;
                let mut json = serde_json::to_vec_pretty(&unwrap_single_root(value))
                    .map_err(|e| e.to_string())?;
                json.push(b'\n');
                fs::write(&output, json).map_err(|e| e.to_string())
            });

        match result {
            Ok(()) => true,
            Err(reason) => {
                tracing::warn!(path = %path.display(), %reason, "Failed to decode file");
                false
            }
        }
    }
}

/// All binary table files under `dir`.
pub fn binary_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext == BINARY_EXTENSION)
        })
        .collect();
    files.sort();
    files
}

/// Whether the `.json` output of `input` exists and is newer than it.
fn is_fresh(input: &Path) -> bool {
    let output = input.with_extension("json");
    let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(input), modified(&output)) {
        (Some(input), Some(output)) => output > input,
        _ => false,
    }
}
