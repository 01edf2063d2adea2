//! Pending queue - durable buffer of discovered leaf targets
//!
//! When a branch listing is discovered, every new leaf target is persisted
//! here as a batch *before* any target is processed. A target is removed
//! one-by-one only after its leaf record is confirmed persisted, so a crash
//! mid-batch loses no discovered work. A non-empty queue on startup is the
//! signal that a previous run died mid-drain; it must be drained before any
//! new discovery happens.

use crate::state::checkpoint::{remove_if_present, write_json_atomic};
use crate::state::StateResult;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A discovered leaf awaiting fetch-and-persist
///
/// `identifier` is the leaf's stable key (its canonical URL). `fallback_hint`
/// is best-effort supplementary data captured during discovery (a portrait
/// reference), used only if the leaf's own page omits it. Targets are never
/// mutated, only added or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafTarget {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_hint: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PendingDocument {
    targets: Vec<LeafTarget>,
}

/// File-backed pending queue
///
/// Batches are small (one branch's worth of newly-discovered targets), so
/// `remove` rewrites the whole batch rather than tracking per-target done
/// flags; there is no partial-corruption state to reason about.
pub struct PendingQueue {
    path: PathBuf,
}

impl PendingQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads the persisted batch; empty if the file is absent or corrupt
    pub fn load_all(&self) -> Vec<LeafTarget> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!(
                    "Pending queue '{}' unreadable ({}); treating as empty",
                    self.path.display(),
                    e
                );
                return Vec::new();
            }
        };

        match serde_json::from_str::<PendingDocument>(&content) {
            Ok(doc) => doc.targets,
            Err(e) => {
                tracing::warn!(
                    "Pending queue '{}' corrupt ({}); treating as empty",
                    self.path.display(),
                    e
                );
                Vec::new()
            }
        }
    }

    /// Replaces the entire persisted batch atomically
    pub fn save_all(&self, targets: &[LeafTarget]) -> StateResult<()> {
        let doc = PendingDocument {
            targets: targets.to_vec(),
        };
        write_json_atomic(&self.path, &doc)
    }

    /// Removes one target by identifier, keeping the rest of the batch
    pub fn remove(&self, identifier: &str) -> StateResult<()> {
        let remaining: Vec<LeafTarget> = self
            .load_all()
            .into_iter()
            .filter(|t| t.identifier != identifier)
            .collect();
        self.save_all(&remaining)
    }

    /// Drops any persisted batch (used by fresh starts)
    pub fn reset(&self) -> StateResult<()> {
        remove_if_present(&self.path)
    }
}
