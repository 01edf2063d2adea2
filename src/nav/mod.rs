//! Navigation and fetch collaborators
//!
//! The crawl core never touches page markup. It drives a single stateful
//! browsing session through these traits: index-based selection commands and
//! fresh enumerations on the [`NavigationDriver`], structured field sets from
//! the [`PageFetcher`]. Implementations own the "current page"; the core only
//! ever holds indices, never element handles, so nothing it caches can go
//! stale across a navigational action.

mod http;

pub use http::HttpNavigator;

use crate::state::LeafTarget;
use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by the navigation/fetch collaborators
///
/// `Timeout` is transient: the coordinator skips the current step and counts
/// it toward an escalation threshold. `SessionLost` means the browsing
/// session itself is unusable and aborts the run immediately.
#[derive(Debug, Error)]
pub enum NavError {
    #[error("navigation timeout: {0}")]
    Timeout(String),

    #[error("browsing session lost: {0}")]
    SessionLost(String),
}

/// Result type for navigation operations
pub type NavResult<T> = Result<T, NavError>;

/// Outcome of opening an entity's pages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// The entity exists and its listing is now the current page
    Opened { name: Option<String> },
    /// The entity id does not exist
    NotFound,
    /// The entity's pages did not become ready in time
    Timeout,
}

/// Outcome of an index-based selection command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    Selected,
    /// The enumeration shifted since it was listed; re-list and move on
    Stale,
    Failed,
}

/// Outcome of fetching one record's field set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome<T> {
    Fetched(T),
    NotFound,
    Timeout,
}

/// A leaf reference surfaced during discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafCandidate {
    /// Stable key for the leaf record (its canonical URL)
    pub identifier: String,
    /// Best-effort portrait reference captured from the listing
    pub fallback_hint: Option<String>,
}

/// Entity-level field set
///
/// Absent fields are `None`; absence is data, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySummary {
    pub name: String,
    pub emblem_url: Option<String>,
    pub tags: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
}

/// Leaf-level field set retrieved from a detail page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafFields {
    pub name: Option<String>,
    pub title: Option<String>,
    pub sub_branch: Option<String>,
    pub summary: Option<String>,
    pub detail: Option<String>,
    pub portrait_url: Option<String>,
}

/// Traversal coordinates a leaf record inherits from its parent
#[derive(Debug, Clone, Copy)]
pub struct ParentContext<'a> {
    pub entity_id: u32,
    pub entity_name: &'a str,
    pub branch: &'a str,
    pub sub_branch: Option<&'a str>,
}

/// A single stateful browsing session over the catalog
///
/// Enumerations are always fresh: `list_branches` / `list_sub_branches`
/// re-derive the current page's filter set on every call, and selection is
/// validated against a fresh enumeration (an index that no longer resolves
/// reports `Stale`). `discover_leaves` may be slow - it walks the full
/// listing however the source paginates it - and returns a complete,
/// order-stable candidate list.
#[async_trait]
pub trait NavigationDriver {
    async fn open_entity(&mut self, entity_id: u32) -> NavResult<OpenOutcome>;

    async fn list_branches(&mut self) -> NavResult<Vec<String>>;

    async fn select_branch(&mut self, index: usize) -> NavResult<SelectOutcome>;

    async fn list_sub_branches(&mut self) -> NavResult<Vec<String>>;

    async fn select_sub_branch(&mut self, index: usize) -> NavResult<SelectOutcome>;

    async fn discover_leaves(&mut self) -> NavResult<Vec<LeafCandidate>>;

    /// Canonical page URL for an entity id (informational, recorded in the
    /// entity stream)
    fn entity_page_url(&self, entity_id: u32) -> String;
}

/// Structured field retrieval for one entity or one leaf record
#[async_trait]
pub trait PageFetcher {
    async fn fetch_entity_summary(&mut self, entity_id: u32)
        -> NavResult<FetchOutcome<EntitySummary>>;

    async fn fetch_leaf_record(
        &mut self,
        target: &LeafTarget,
        context: &ParentContext<'_>,
    ) -> NavResult<FetchOutcome<LeafFields>>;
}
