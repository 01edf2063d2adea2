//! CSV-backed output sink
//!
//! Layout under the data directory:
//! - `entities.csv` - the global entity-level stream
//! - `leaves/entity_<id>_<name>.csv` - one leaf stream per entity
//!
//! Every append opens the file, writes one row, and flushes; the header row
//! is written only when the file is first created.

use crate::sink::traits::{OutputSink, SinkError, SinkResult};
use crate::sink::{EntityRecord, LeafRecord, StreamKey};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Append-only CSV streams rooted at a data directory
pub struct CsvSink {
    root: PathBuf,
}

impl CsvSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves the file path backing a stream
    fn stream_path(&self, stream: &StreamKey) -> PathBuf {
        match stream {
            StreamKey::Entities => self.root.join("entities.csv"),
            StreamKey::EntityLeaves {
                entity_id,
                entity_name,
            } => {
                let name = sanitize_filename::sanitize(entity_name).replace(' ', "_");
                self.root
                    .join("leaves")
                    .join(format!("entity_{}_{}.csv", entity_id, name))
            }
        }
    }

    fn append_row<T: Serialize>(&self, path: &Path, record: &T) -> SinkResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let exists = path.exists();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(!exists)
            .from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;
        Ok(())
    }
}

impl OutputSink for CsvSink {
    fn list_identifiers(&self, stream: &StreamKey) -> SinkResult<HashSet<String>> {
        let path = self.stream_path(stream);
        if !path.exists() {
            return Ok(HashSet::new());
        }

        let mut reader = csv::Reader::from_path(&path)?;
        let field = stream.key_field();
        let key_index = reader
            .headers()?
            .iter()
            .position(|h| h == field)
            .ok_or_else(|| SinkError::MissingKeyColumn {
                stream: path.display().to_string(),
                field: field.to_string(),
            })?;

        let mut identifiers = HashSet::new();
        for row in reader.records() {
            let row = row?;
            if let Some(value) = row.get(key_index) {
                if !value.is_empty() {
                    identifiers.insert(value.to_string());
                }
            }
        }
        Ok(identifiers)
    }

    fn append_entity(&mut self, record: &EntityRecord) -> SinkResult<()> {
        self.append_row(&self.stream_path(&StreamKey::Entities), record)
    }

    fn append_leaf(&mut self, stream: &StreamKey, record: &LeafRecord) -> SinkResult<()> {
        self.append_row(&self.stream_path(stream), record)
    }
}
