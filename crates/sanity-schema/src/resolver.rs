//! Schema revision resolver
//!
//! Binary table files carry no schema version. The resolver finds a revision
//! of the schema definition that decodes them by trial: starting at the
//! memoized binding (or the newest commit) it samples files, decodes each one,
//! and walks to the parent commit until a revision decodes every sample.
//!
//! The first revision that passes wins and is written to the binding cache.
//! Acceptance is judged on the sample only; a revision that passes the sample
//! may still fail for an unsampled file.

use std::fs;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use sanity_cache::{CacheStore, CommitId, Region, SchemaBindingCache};
use thiserror::Error;

use crate::decoder::{strip_header, Decoder, DEFAULT_HEADER_LEN};
use crate::history::VersionHistoryProvider;

/// Maximum number of files trial-decoded per candidate revision.
pub const DEFAULT_SAMPLE_SIZE: usize = 20;

/// Directory inside the schema history holding `<schema>.fbs` files.
pub const DEFAULT_SCHEMA_SUBDIR: &str = "FBS";

/// Errors from schema resolution. None of them are fatal to a decode run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no files to sample for schema {schema}")]
    NoSamples { schema: String },

    #[error("schema history is unreachable, cannot resolve {schema}")]
    HistoryUnavailable { schema: String },

    #[error("no revision decodes {schema} after {attempts} attempts")]
    Exhausted { schema: String, attempts: usize },
}

/// Outcome of trial-decoding one sample against one revision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verdict {
    pub decoded: usize,
    pub failed: usize,
}

impl Verdict {
    pub fn sampled(&self) -> usize {
        self.decoded + self.failed
    }

    /// A revision is accepted when every sampled file decoded and at least one was sampled.
    pub fn accepts(&self) -> bool {
        self.failed == 0 && self.decoded > 0
    }
}

/// Trial-decode every file in `samples` against `schema`.
///
/// Each file is judged independently; a failure never stops the loop.
pub fn trial_decode(
    decoder: &dyn Decoder,
    schema: &str,
    samples: &[PathBuf],
    header_len: usize,
) -> Verdict {
    let mut verdict = Verdict::default();

    for path in samples {
        let outcome = fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                let body = strip_header(&bytes, header_len).map_err(|e| e.to_string())?;
                decoder.decode(schema, body).map_err(|e| e.to_string())
            });

        match outcome {
            Ok(_) => verdict.decoded += 1,
            Err(reason) => {
                tracing::debug!(path = %path.display(), %reason, "Trial decode failed");
                verdict.failed += 1;
            }
        }
    }

    verdict
}

/// A validated schema binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub schema: String,
    pub commit: CommitId,
    /// Revisions tried, including the accepted one
    pub attempts: usize,
    /// Whether the memoized binding was accepted without searching
    pub cached: bool,
    /// Schema definition text at `commit`
    pub schema_text: String,
}

/// Binds schema names to history revisions by trial decode.
pub struct SchemaResolver<'a> {
    history: &'a dyn VersionHistoryProvider,
    decoder: &'a dyn Decoder,
    bindings: &'a CacheStore<SchemaBindingCache>,
    schema_subdir: String,
    sample_size: usize,
    header_len: usize,
}

impl<'a> SchemaResolver<'a> {
    pub fn new(
        history: &'a dyn VersionHistoryProvider,
        decoder: &'a dyn Decoder,
        bindings: &'a CacheStore<SchemaBindingCache>,
    ) -> Self {
        Self {
            history,
            decoder,
            bindings,
            schema_subdir: DEFAULT_SCHEMA_SUBDIR.to_string(),
            sample_size: DEFAULT_SAMPLE_SIZE,
            header_len: DEFAULT_HEADER_LEN,
        }
    }

    pub fn with_schema_subdir(mut self, subdir: impl Into<String>) -> Self {
        self.schema_subdir = subdir.into();
        self
    }

    /// Set the sample bound. Zero is treated as one.
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size.max(1);
        self
    }

    pub fn with_header_len(mut self, header_len: usize) -> Self {
        self.header_len = header_len;
        self
    }

    /// Path of a schema definition inside the history.
    pub fn schema_path(&self, schema: &str) -> String {
        let subdir = self.schema_subdir.trim_matches('/');
        if subdir.is_empty() {
            format!("{schema}.fbs")
        } else {
            format!("{subdir}/{schema}.fbs")
        }
    }

    /// Find a revision that decodes `files` and record it as the binding.
    pub fn resolve(
        &self,
        region: Region,
        schema: &str,
        files: &[PathBuf],
    ) -> Result<Resolution, ResolveError> {
        if files.is_empty() {
            return Err(ResolveError::NoSamples {
                schema: schema.to_string(),
            });
        }

        let memoized = self
            .bindings
            .read(|b| b.get_commit(region, schema).cloned());
        let mut candidate = match memoized.clone().or_else(|| self.history.latest_commit()) {
            Some(commit) => commit,
            None => {
                return Err(ResolveError::HistoryUnavailable {
                    schema: schema.to_string(),
                })
            }
        };

        let path = self.schema_path(schema);
        let mut attempts = 0;

        loop {
            attempts += 1;

            if let Some(schema_text) = self.try_candidate(&candidate, &path, files) {
                self.bindings
                    .update(|b| b.set_commit(region, schema, candidate.clone()));
                tracing::info!(%region, schema, commit = candidate.short(), attempts, "Resolved schema");
                return Ok(Resolution {
                    schema: schema.to_string(),
                    cached: attempts == 1 && memoized.as_ref() == Some(&candidate),
                    commit: candidate,
                    attempts,
                    schema_text,
                });
            }

            candidate = match self.history.parent_commit(&candidate) {
                Some(parent) => parent,
                None => {
                    tracing::warn!(%region, schema, attempts, "Schema history exhausted");
                    return Err(ResolveError::Exhausted {
                        schema: schema.to_string(),
                        attempts,
                    });
                }
            };
        }
    }

    /// Trial one revision; returns the schema text when it is accepted.
    fn try_candidate(&self, commit: &CommitId, path: &str, files: &[PathBuf]) -> Option<String> {
        let schema_text = match self.history.file_at(commit, path) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(commit = commit.short(), path, error = %e, "Schema not readable at revision");
                return None;
            }
        };

        let samples = self.sample(files);
        let verdict = trial_decode(self.decoder, &schema_text, &samples, self.header_len);
        tracing::debug!(
            commit = commit.short(),
            decoded = verdict.decoded,
            failed = verdict.failed,
            "Trial decode verdict"
        );

        verdict.accepts().then_some(schema_text)
    }

    fn sample(&self, files: &[PathBuf]) -> Vec<PathBuf> {
        if files.len() <= self.sample_size {
            return files.to_vec();
        }
        files
            .choose_multiple(&mut rand::thread_rng(), self.sample_size)
            .cloned()
            .collect()
    }
}

/// Write a bound schema definition to `<fbs_dir>/raw/<region>/<schema>.fbs`.
pub fn materialize_schema(
    fbs_dir: &Path,
    region: Region,
    resolution: &Resolution,
) -> std::io::Result<PathBuf> {
    let dir = fbs_dir.join("raw").join(region.dir_name());
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}.fbs", resolution.schema));
    fs::write(&path, &resolution.schema_text)?;
    Ok(path)
}
