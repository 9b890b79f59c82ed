//! In-process history and decoder doubles
//!
//! Used by the resolver and pipeline tests so that no test spawns `git` or
//! `flatc`. Both doubles record how they were called.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use sanity_cache::CommitId;
use serde_json::{json, Value};

use crate::decoder::{DecodeError, DecodeResult, Decoder};
use crate::history::{HistoryError, HistoryResult, VersionHistoryProvider};

/// A recorded call on [`MockHistory`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryCall {
    Latest,
    Parent(CommitId),
    FileAt(CommitId, String),
}

/// Linear history held in memory.
#[derive(Debug, Default)]
pub struct MockHistory {
    /// Newest first
    commits: Vec<CommitId>,
    files: HashMap<(CommitId, String), String>,
    calls: Mutex<Vec<HistoryCall>>,
}

impl MockHistory {
    /// History whose commits are listed newest first; the last one is the root.
    pub fn linear(commits: &[&str]) -> Self {
        Self {
            commits: commits.iter().map(|c| CommitId::new(*c)).collect(),
            ..Self::default()
        }
    }

    /// Add a file at one commit.
    pub fn with_file(mut self, commit: &str, path: &str, contents: &str) -> Self {
        self.files
            .insert((CommitId::new(commit), path.to_string()), contents.to_string());
        self
    }

    /// Add `FBS/<schema>.fbs` at every commit with contents `"<path>@<commit>"`.
    ///
    /// Decoders built with [`MockDecoder::accepting`] can then tell revisions apart.
    pub fn with_schema_everywhere(mut self, schema: &str) -> Self {
        let path = format!("FBS/{schema}.fbs");
        for commit in &self.commits {
            self.files.insert(
                (commit.clone(), path.clone()),
                format!("{path}@{commit}"),
            );
        }
        self
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<HistoryCall> {
        self.log().clone()
    }

    /// Commits whose files were read, in order.
    pub fn files_read(&self) -> Vec<CommitId> {
        self.log()
            .iter()
            .filter_map(|call| match call {
                HistoryCall::FileAt(commit, _) => Some(commit.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: HistoryCall) {
        self.log().push(call);
    }

    fn log(&self) -> std::sync::MutexGuard<'_, Vec<HistoryCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VersionHistoryProvider for MockHistory {
    fn latest_commit(&self) -> Option<CommitId> {
        self.record(HistoryCall::Latest);
        self.commits.first().cloned()
    }

    fn parent_commit(&self, commit: &CommitId) -> Option<CommitId> {
        self.record(HistoryCall::Parent(commit.clone()));
        let idx = self.commits.iter().position(|c| c == commit)?;
        self.commits.get(idx + 1).cloned()
    }

    fn file_at(&self, commit: &CommitId, path: &str) -> HistoryResult<String> {
        self.record(HistoryCall::FileAt(commit.clone(), path.to_string()));
        self.files
            .get(&(commit.clone(), path.to_string()))
            .cloned()
            .ok_or_else(|| HistoryError::MissingFile {
                commit: commit.clone(),
                path: path.to_string(),
            })
    }
}

type Acceptor = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Decoder that succeeds or fails based on the schema text alone.
///
/// A successful decode returns `{"root": {"schema": <text>, "len": <payload length>}}`.
pub struct MockDecoder {
    accept: Acceptor,
    calls: AtomicUsize,
}

impl MockDecoder {
    pub fn accepting(accept: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            accept: Box::new(accept),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always() -> Self {
        Self::accepting(|_| true)
    }

    pub fn never() -> Self {
        Self::accepting(|_| false)
    }

    /// Number of decode calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Decoder for MockDecoder {
    fn decode(&self, schema: &str, data: &[u8]) -> DecodeResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if (self.accept)(schema) {
            Ok(json!({ "root": { "schema": schema, "len": data.len() } }))
        } else {
            Err(DecodeError::Failed {
                program: "mock".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "schema mismatch".to_string(),
            })
        }
    }
}
