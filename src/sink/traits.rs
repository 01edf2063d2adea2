//! Output sink trait and error types

use crate::sink::{EntityRecord, LeafRecord, StreamKey};
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during sink operations
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Stream '{stream}' has no '{field}' column")]
    MissingKeyColumn { stream: String, field: String },
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Trait for append-only output stream backends
///
/// A stream's header is written once, on creation. Appends are never
/// deduplicated by the sink itself; preventing duplicate appends is the
/// dedup index's job. Listing a stream that does not exist yet returns the
/// empty set - that is the normal first visit, not an error.
pub trait OutputSink {
    /// Returns the set of dedup-key values already present in a stream
    fn list_identifiers(&self, stream: &StreamKey) -> SinkResult<HashSet<String>>;

    /// Appends one row to the entity-level stream
    fn append_entity(&mut self, record: &EntityRecord) -> SinkResult<()>;

    /// Appends one row to a per-entity leaf stream
    fn append_leaf(&mut self, stream: &StreamKey, record: &LeafRecord) -> SinkResult<()>;
}
