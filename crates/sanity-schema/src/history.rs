//! Schema definition history
//!
//! The schema definitions evolve in a version-controlled repository. The
//! resolver only needs three questions answered: what is the newest commit,
//! what is a commit's parent, and what did a file look like at a commit.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use sanity_cache::CommitId;
use thiserror::Error;

/// History result type
pub type HistoryResult<T> = Result<T, HistoryError>;

/// Errors from history lookups
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to launch git: {0}")]
    Spawn(#[from] io::Error),

    #[error("`git {args}` failed ({status}): {stderr}")]
    Git {
        args: String,
        status: String,
        stderr: String,
    },

    #[error("{path} does not exist at commit {commit}")]
    MissingFile { commit: CommitId, path: String },

    #[error("output of `git {0}` is not valid UTF-8")]
    Utf8(String),
}

/// Read access to a linear, version-controlled schema history.
pub trait VersionHistoryProvider: Send + Sync {
    /// Newest commit, or `None` when the history is unreachable.
    fn latest_commit(&self) -> Option<CommitId>;

    /// Parent of `commit`, or `None` at the root of the history.
    fn parent_commit(&self, commit: &CommitId) -> Option<CommitId>;

    /// Contents of `path` as of `commit`.
    fn file_at(&self, commit: &CommitId, path: &str) -> HistoryResult<String>;
}

/// History backed by a local git checkout.
#[derive(Debug, Clone)]
pub struct GitHistory {
    repo_dir: PathBuf,
    git: PathBuf,
}

impl GitHistory {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            git: PathBuf::from("git"),
        }
    }

    /// Use a specific git executable instead of `git` from `PATH`.
    pub fn with_git(mut self, git: impl Into<PathBuf>) -> Self {
        self.git = git.into();
        self
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Clone `url` into the checkout directory, or fast-forward an existing checkout.
    pub fn sync(&self, url: &str) -> HistoryResult<()> {
        if self.repo_dir.join(".git").exists() {
            tracing::info!(repo = %self.repo_dir.display(), "Updating schema repository");
            self.run_in(&self.repo_dir, &["pull", "--ff-only"])?;
        } else {
            tracing::info!(repo = %self.repo_dir.display(), %url, "Cloning schema repository");
            let target = self.repo_dir.to_string_lossy().into_owned();
            let cwd = match self.repo_dir.parent() {
                Some(p) if !p.as_os_str().is_empty() => {
                    std::fs::create_dir_all(p)?;
                    p.to_path_buf()
                }
                _ => PathBuf::from("."),
            };
            self.run_in(&cwd, &["clone", url, &target])?;
        }
        Ok(())
    }

    fn run(&self, args: &[&str]) -> HistoryResult<String> {
        self.run_in(&self.repo_dir, args)
    }

    fn run_in(&self, cwd: &Path, args: &[&str]) -> HistoryResult<String> {
        let output = Command::new(&self.git).args(args).current_dir(cwd).output()?;
        let joined = args.join(" ");

        if !output.status.success() {
            return Err(HistoryError::Git {
                args: joined,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| HistoryError::Utf8(joined))
    }
}

impl VersionHistoryProvider for GitHistory {
    fn latest_commit(&self) -> Option<CommitId> {
        match self.run(&["rev-parse", "HEAD"]) {
            Ok(out) => Some(CommitId::new(out.trim())),
            Err(e) => {
                tracing::error!(repo = %self.repo_dir.display(), error = %e, "Failed to read latest schema commit");
                None
            }
        }
    }

    fn parent_commit(&self, commit: &CommitId) -> Option<CommitId> {
        let rev = format!("{}^", commit);
        match self.run(&["rev-parse", "--verify", "--quiet", &rev]) {
            Ok(out) => Some(CommitId::new(out.trim())),
            Err(_) => {
                tracing::debug!(commit = commit.short(), "Commit has no parent");
                None
            }
        }
    }

    fn file_at(&self, commit: &CommitId, path: &str) -> HistoryResult<String> {
        let spec = format!("{}:{}", commit, path);
        match self.run(&["show", &spec]) {
            Err(HistoryError::Git { stderr, .. })
                if stderr.contains("does not exist") || stderr.contains("exists on disk, but not in") =>
            {
                Err(HistoryError::MissingFile {
                    commit: commit.clone(),
                    path: path.to_string(),
                })
            }
            other => other,
        }
    }
}
