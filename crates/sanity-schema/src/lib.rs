//! Sanity Pack schema resolution
//!
//! Finds which revision of an evolving FlatBuffers schema history decodes a
//! set of binary table files, and decodes them with it.

pub mod decoder;
pub mod history;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod naming;
pub mod resolver;

pub use decoder::{
    strip_header, unwrap_single_root, DecodeError, DecodeResult, Decoder, FlatcDecoder,
    DEFAULT_HEADER_LEN,
};
pub use history::{GitHistory, HistoryError, HistoryResult, VersionHistoryProvider};
pub use naming::{NamingError, SchemaGroups, SchemaNamer, BINARY_EXTENSION, KNOWN_SCHEMAS};
pub use resolver::{
    materialize_schema, trial_decode, Resolution, ResolveError, SchemaResolver, Verdict,
    DEFAULT_SAMPLE_SIZE, DEFAULT_SCHEMA_SUBDIR,
};
