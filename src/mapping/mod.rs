//! Source id <-> Sink id identity mapping.
//!
//! The two stores never share identifiers, so this table is the only thing
//! joining a Source page to its Sink note. Links are 1:1 and are only ever
//! added or re-pointed during a run, which is what lets a rerun turn a
//! repeated create into an update.
//!
//! Entries keep insertion order so the serialized form is deterministic;
//! lookups go through a hash index on either side.

pub mod file;

pub use file::CacheFile;

use crate::error::{Result, SyncError};
use crate::model::{SinkId, SourceId};
use std::collections::HashMap;
use tracing::{debug, warn};

/// One (Source id, Sink id) link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub source_id: SourceId,
    pub sink_id: SinkId,
}

/// Outcome of [`MappingCache::upsert`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert {
    /// The exact pair was already present
    Unchanged,
    /// A new link was added
    Inserted,
    /// The Source id was linked to a different Sink id before
    Relinked { previous: SinkId },
}

/// Bidirectional identity table
#[derive(Debug, Clone, Default)]
pub struct MappingCache {
    entries: Vec<MappingEntry>,
    by_source: HashMap<SourceId, usize>,
    by_sink: HashMap<SinkId, usize>,
}

impl MappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache from a serialized pair list.
    ///
    /// Absent or unreadable input gives an empty cache: a lost cache costs a
    /// round of duplicate detection work, never the run.
    pub fn load(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            debug!("No mapping cache found, starting empty");
            return Self::new();
        };

        match Self::parse(raw) {
            Ok(cache) => {
                debug!("Loaded {} mapping entries", cache.len());
                cache
            }
            Err(e) => {
                warn!("{}; starting with an empty mapping", e);
                Self::new()
            }
        }
    }

    /// Strict variant of [`MappingCache::load`].
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::new());
        }

        let pairs: Vec<(SourceId, SinkId)> =
            serde_json::from_str(raw).map_err(|e| SyncError::CacheLoad(e.to_string()))?;

        let mut cache = Self::new();
        for (source_id, sink_id) in pairs {
            if source_id.is_empty() || sink_id.is_empty() {
                warn!("Skipping mapping entry with an empty id");
                continue;
            }
            cache.upsert(source_id, sink_id);
        }
        Ok(cache)
    }

    /// Serialize as a JSON array of `[sourceId, sinkId]` pairs.
    pub fn serialize(&self) -> String {
        let pairs: Vec<(&str, &str)> = self
            .entries
            .iter()
            .map(|e| (e.source_id.as_str(), e.sink_id.as_str()))
            .collect();
        // Serializing string pairs cannot fail
        serde_json::to_string(&pairs).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn lookup_by_source(&self, source_id: &str) -> Option<&SinkId> {
        self.by_source
            .get(source_id)
            .map(|&idx| &self.entries[idx].sink_id)
    }

    pub fn lookup_by_sink(&self, sink_id: &str) -> Option<&SourceId> {
        self.by_sink
            .get(sink_id)
            .map(|&idx| &self.entries[idx].source_id)
    }

    /// Link `source_id` to `sink_id`.
    ///
    /// Re-linking a Source id replaces its old Sink id. A Sink id that was
    /// linked to some other Source id is taken over, and that stale entry is
    /// dropped so neither side ever holds two links.
    pub fn upsert(&mut self, source_id: impl Into<SourceId>, sink_id: impl Into<SinkId>) -> Upsert {
        let source_id = source_id.into();
        let sink_id = sink_id.into();

        if self.lookup_by_source(&source_id) == Some(&sink_id) {
            return Upsert::Unchanged;
        }

        if let Some(holder) = self.by_sink.get(&sink_id).copied() {
            let stale = self.entries.remove(holder);
            warn!(
                "Sink note {} moves from source {} to {}",
                sink_id, stale.source_id, source_id
            );
            self.reindex();
        }

        match self.by_source.get(&source_id).copied() {
            Some(idx) => {
                let previous = std::mem::replace(&mut self.entries[idx].sink_id, sink_id.clone());
                self.by_sink.remove(&previous);
                self.by_sink.insert(sink_id, idx);
                Upsert::Relinked { previous }
            }
            None => {
                let idx = self.entries.len();
                self.by_source.insert(source_id.clone(), idx);
                self.by_sink.insert(sink_id.clone(), idx);
                self.entries.push(MappingEntry { source_id, sink_id });
                Upsert::Inserted
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappingEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn reindex(&mut self) {
        self.by_source.clear();
        self.by_sink.clear();
        for (idx, entry) in self.entries.iter().enumerate() {
            self.by_source.insert(entry.source_id.clone(), idx);
            self.by_sink.insert(entry.sink_id.clone(), idx);
        }
    }
}
