//! Output sink for captured records
//!
//! This module defines the append-only output streams the crawl writes to:
//! one stream of entity-level records and one stream of leaf records per
//! entity. Streams expose their already-persisted keys so the dedup index
//! can be rebuilt from the sink alone - the sink is the single source of
//! truth for what has been captured.

mod csv_sink;
mod dedup;
mod traits;

pub use csv_sink::CsvSink;
pub use dedup::DedupIndex;
pub use traits::{OutputSink, SinkError, SinkResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Logical output stream key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamKey {
    /// The global entity-level stream
    Entities,
    /// The leaf-record stream of one entity; leaf identifiers are only
    /// guaranteed unique within their parent entity
    EntityLeaves { entity_id: u32, entity_name: String },
}

impl StreamKey {
    /// Name of the column holding this stream's dedup key
    pub fn key_field(&self) -> &'static str {
        match self {
            Self::Entities => "entity_id",
            Self::EntityLeaves { .. } => "identifier",
        }
    }
}

/// Outcome of an entity-level capture attempt
///
/// Failure outcomes are recorded as marker rows so the entity is never
/// retried in a later run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Ok,
    NotFound,
    Timeout,
}

/// One row of the entity-level stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_id: u32,
    pub name: Option<String>,
    pub emblem_url: Option<String>,
    pub tags: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub page_url: String,
    pub status: EntityStatus,
    pub captured_at: DateTime<Utc>,
}

impl EntityRecord {
    /// A marker row for an entity that could not be captured
    pub fn marker(entity_id: u32, page_url: String, status: EntityStatus) -> Self {
        Self {
            entity_id,
            name: None,
            emblem_url: None,
            tags: None,
            description: None,
            website: None,
            page_url,
            status,
            captured_at: Utc::now(),
        }
    }
}

/// One row of a per-entity leaf stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeafRecord {
    pub identifier: String,
    pub name: Option<String>,
    pub title: Option<String>,
    pub entity_name: String,
    pub branch: String,
    pub sub_branch: Option<String>,
    pub summary: Option<String>,
    pub detail: Option<String>,
    pub portrait_url: Option<String>,
    pub captured_at: DateTime<Utc>,
}
