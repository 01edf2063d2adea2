//! Durable traversal state
//!
//! This module owns the two state documents that make the crawl resumable:
//! - the checkpoint (where in the entity/branch/sub-branch space to resume)
//! - the pending queue (leaf targets discovered but not yet confirmed persisted)
//!
//! Both are plain JSON documents; absence or corruption of either is
//! recoverable and never fatal.

mod checkpoint;
mod pending;

pub use checkpoint::{Checkpoint, CheckpointStore, CrawlScope};
pub use pending::{LeafTarget, PendingQueue};

use thiserror::Error;

/// Errors that can occur while persisting or loading traversal state
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Invalid scope '{0}': expected 'lo-hi' with lo <= hi")]
    InvalidScope(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for state operations
pub type StateResult<T> = Result<T, StateError>;
