//! Binary decoders
//!
//! A [`Decoder`] turns schema text plus a binary payload into structured
//! JSON. The production decoder shells out to `flatc`; any non-zero exit or
//! I/O problem is a decode failure for that one payload, never a crash.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::Command;

use serde_json::Value;
use thiserror::Error;

/// Length of the opaque signature header in front of every payload.
pub const DEFAULT_HEADER_LEN: usize = 128;

/// Flags passed to `flatc` after the input file.
const FLATC_FLAGS: &[&str] = &[
    "--json",
    "--strict-json",
    "--natural-utf8",
    "--defaults-json",
    "--unknown-json",
    "--raw-binary",
    "--no-warnings",
    "--force-empty",
];

/// Longest stderr excerpt kept in a [`DecodeError::Failed`].
const STDERR_EXCERPT: usize = 512;

/// Decode result type
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Errors from a single decode attempt
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload has {len} bytes, shorter than the {header} byte header")]
    Truncated { len: usize, header: usize },

    #[error("failed to prepare decoder workspace: {0}")]
    Io(#[from] io::Error),

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} failed ({status}): {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("decoder produced no output at {0}")]
    MissingOutput(PathBuf),

    #[error("decoder output is not valid JSON: {0}")]
    InvalidOutput(#[from] serde_json::Error),
}

/// Decodes a binary payload against a schema definition.
pub trait Decoder: Send + Sync {
    fn decode(&self, schema: &str, data: &[u8]) -> DecodeResult<Value>;
}

/// Remove the fixed-size header in front of a payload.
pub fn strip_header(data: &[u8], header_len: usize) -> DecodeResult<&[u8]> {
    data.get(header_len..)
        .filter(|rest| !rest.is_empty())
        .ok_or(DecodeError::Truncated {
            len: data.len(),
            header: header_len,
        })
}

/// Replace an object with exactly one key by that key's value.
///
/// Tables are wrapped in a single root field; the wrapper carries no data.
pub fn unwrap_single_root(value: Value) -> Value {
    match value {
        Value::Object(map) if map.len() == 1 => match map.into_iter().next() {
            Some((_, inner)) => inner,
            None => Value::Null,
        },
        other => other,
    }
}

/// Decoder that runs the FlatBuffers compiler in JSON output mode.
#[derive(Debug, Clone)]
pub struct FlatcDecoder {
    flatc: PathBuf,
}

impl FlatcDecoder {
    pub fn new(flatc: impl Into<PathBuf>) -> Self {
        Self {
            flatc: flatc.into(),
        }
    }
}

impl Default for FlatcDecoder {
    fn default() -> Self {
        Self::new("flatc")
    }
}

impl Decoder for FlatcDecoder {
    fn decode(&self, schema: &str, data: &[u8]) -> DecodeResult<Value> {
        let workspace = tempfile::Builder::new().prefix("sanity-flatc").tempdir()?;
        let schema_path = workspace.path().join("schema.fbs");
        let input_path = workspace.path().join("input.bytes");
        fs::write(&schema_path, schema)?;
        fs::write(&input_path, data)?;

        let program = self.flatc.to_string_lossy().into_owned();
        let output = Command::new(&self.flatc)
            .arg("-o")
            .arg(workspace.path())
            .arg(&schema_path)
            .arg("--")
            .arg(&input_path)
            .args(FLATC_FLAGS)
            .output()
            .map_err(|source| DecodeError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let excerpt = match stderr.char_indices().nth(STDERR_EXCERPT) {
                Some((idx, _)) => &stderr[..idx],
                None => stderr,
            };
            return Err(DecodeError::Failed {
                program,
                status: output.status.to_string(),
                stderr: excerpt.to_string(),
            });
        }

        let output_path = workspace.path().join("input.json");
        let text = fs::read_to_string(&output_path)
            .map_err(|_| DecodeError::MissingOutput(output_path.clone()))?;
        Ok(serde_json::from_str(&text)?)
    }
}
