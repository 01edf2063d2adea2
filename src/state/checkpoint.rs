//! Checkpoint store - durable cursor over the traversal space
//!
//! The checkpoint records the next unit of work to attempt as
//! `(entity_id, main_index, sub_index)` together with the entity-id range
//! the run is responsible for. It is written *before* any irreversible side
//! effect for a position is attempted, so a crash always leaves it pointing
//! at work not yet confirmed done, never past it.

use crate::state::{StateError, StateResult};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Inclusive entity-id range a run covers
///
/// Serialized as the string `"lo-hi"`. Changing the range between runs is an
/// operator decision; it is never inferred from checkpoint state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlScope {
    pub lo: u32,
    pub hi: u32,
}

impl CrawlScope {
    /// Creates a scope, enforcing `lo <= hi`
    pub fn new(lo: u32, hi: u32) -> StateResult<Self> {
        if lo > hi {
            return Err(StateError::InvalidScope(format!("{}-{}", lo, hi)));
        }
        Ok(Self { lo, hi })
    }

    /// Returns true if the id falls inside the range
    pub fn contains(&self, entity_id: u32) -> bool {
        self.lo <= entity_id && entity_id <= self.hi
    }
}

impl fmt::Display for CrawlScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.lo, self.hi)
    }
}

impl FromStr for CrawlScope {
    type Err = StateError;

    fn from_str(s: &str) -> StateResult<Self> {
        let invalid = || StateError::InvalidScope(s.to_string());
        let (lo, hi) = s.split_once('-').ok_or_else(invalid)?;
        let lo = lo.trim().parse::<u32>().map_err(|_| invalid())?;
        let hi = hi.trim().parse::<u32>().map_err(|_| invalid())?;
        CrawlScope::new(lo, hi)
    }
}

impl Serialize for CrawlScope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CrawlScope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(|e| D::Error::custom(format!("{}", e)))
    }
}

/// The persisted traversal position
///
/// Invariants:
/// - `entity_id` lies inside `scope` once work has begun
/// - `main_index` and `sub_index` reset to 0 whenever the enclosing field
///   advances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(rename = "range")]
    pub scope: CrawlScope,
    pub entity_id: u32,
    pub main_index: usize,
    pub sub_index: usize,
}

impl Checkpoint {
    /// The default position for a scope with no prior state: its first entity
    pub fn start_of(scope: CrawlScope) -> Self {
        Self {
            scope,
            entity_id: scope.lo,
            main_index: 0,
            sub_index: 0,
        }
    }
}

/// File-backed checkpoint store
///
/// Only the latest position is retained. `save` overwrites the full record
/// atomically from the caller's perspective: the document is written to a
/// sibling temp file and renamed into place, so a partial write is never
/// observable by a subsequent `load`.
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads the persisted position, if any
    ///
    /// Returns `None` when no checkpoint file exists or when the file is
    /// unreadable/corrupt. Corruption is logged and treated as "start of
    /// scope" by the caller, never as a fatal error.
    pub fn load(&self) -> Option<Checkpoint> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(
                    "Checkpoint file '{}' unreadable ({}); starting from scope start",
                    self.path.display(),
                    e
                );
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                tracing::warn!(
                    "Checkpoint file '{}' corrupt ({}); starting from scope start",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    /// Persists the position, replacing any previous record
    pub fn save(&self, checkpoint: &Checkpoint) -> StateResult<()> {
        write_json_atomic(&self.path, checkpoint)
    }

    /// Removes any persisted position (used by fresh starts)
    pub fn reset(&self) -> StateResult<()> {
        remove_if_present(&self.path)
    }
}

/// Serializes `value` as pretty JSON and renames it into place
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StateResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let body = serde_json::to_vec_pretty(value)?;
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

pub(crate) fn remove_if_present(path: &Path) -> StateResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
