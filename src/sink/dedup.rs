//! Dedup index - the set of already-persisted keys for one stream
//!
//! Built by scanning the output sink, never serialized separately: the sink
//! is the single source of truth, so there is no second copy to drift. The
//! entity-scope index is built once per run; the leaf-scope index is rebuilt
//! per entity immediately before that entity's discovery begins.

use crate::sink::traits::{OutputSink, SinkResult};
use crate::sink::StreamKey;
use std::collections::HashSet;

/// Set of identifiers already present in one sink stream
#[derive(Debug, Default)]
pub struct DedupIndex {
    known: HashSet<String>,
}

impl DedupIndex {
    /// Builds the index from a sink stream
    ///
    /// A stream that does not exist yet yields the empty set; that is the
    /// normal first visit, not an error.
    pub fn build<S: OutputSink + ?Sized>(sink: &S, stream: &StreamKey) -> SinkResult<Self> {
        let known = sink.list_identifiers(stream)?;
        if !known.is_empty() {
            tracing::debug!("Loaded {} known identifiers from {:?}", known.len(), stream);
        }
        Ok(Self { known })
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.known.contains(identifier)
    }

    /// Records a freshly-persisted identifier; returns false if it was
    /// already known
    pub fn insert(&mut self, identifier: String) -> bool {
        self.known.insert(identifier)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}
