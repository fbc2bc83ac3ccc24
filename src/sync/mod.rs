//! Reconciliation engine.
//!
//! Stage-per-module: [`ingest`] gathers, [`reconcile`] shapes Sink notes,
//! [`writer`] merges into Source, [`export`] snapshots it, [`push`] forwards
//! the snapshot, [`sink_writer`] mirrors it into Sink. [`pipeline`] runs them
//! in order and owns the mapping for the duration of a run.

pub mod convert;
pub mod export;
pub mod ingest;
pub mod pipeline;
pub mod push;
pub mod reconcile;
pub mod sink_writer;
pub mod writer;

pub use export::SourceExporter;
pub use ingest::{IngestBatch, IngestStage};
pub use pipeline::Pipeline;
pub use push::PushStage;
pub use reconcile::SinkReconciler;
pub use sink_writer::{SinkWriteStats, SourceToSinkWriter};
pub use writer::SourceWriter;

use crate::error::ErrorKind;
use std::fmt;

/// Tag marking Sink notes that already went through the bridge
pub const DEFAULT_DEDUP_TAG: &str = "RoamImported";

/// Sink notebook scanned for notes to import
pub const DEFAULT_SOURCE_NOTEBOOK: &str = "RoamImport";

/// Sink notebook receiving notes created from Source pages
pub const DEFAULT_TARGET_NOTEBOOK: &str = "Roam";

/// Where a run is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Ingest,
    Merge,
    Export,
    /// Push and Sink write
    Distribute,
    Checkpoint,
    Done,
    Aborted(ErrorKind),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Init => write!(f, "init"),
            Stage::Ingest => write!(f, "ingest"),
            Stage::Merge => write!(f, "merge"),
            Stage::Export => write!(f, "export"),
            Stage::Distribute => write!(f, "distribute"),
            Stage::Checkpoint => write!(f, "checkpoint"),
            Stage::Done => write!(f, "done"),
            Stage::Aborted(kind) => write!(f, "aborted ({:?})", kind),
        }
    }
}

/// Run settings the engine needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Graph name, used to tag pushed snapshots
    pub graph: String,

    pub source_notebook: String,

    pub target_notebook: String,

    pub dedup_tag: String,

    /// External payload endpoint
    pub import_url: Option<String>,

    /// Snapshot push endpoint
    pub push_url: Option<String>,

    /// Whether Source state is downloaded as an archive for export
    pub download: bool,

    /// Remove the downloaded archive after export
    pub remove_archive: bool,

    /// Base URL for Source page back-links on Sink notes
    pub page_url_base: Option<String>,
}

impl SyncOptions {
    pub fn new(graph: impl Into<String>) -> Self {
        Self {
            graph: graph.into(),
            source_notebook: DEFAULT_SOURCE_NOTEBOOK.to_string(),
            target_notebook: DEFAULT_TARGET_NOTEBOOK.to_string(),
            dedup_tag: DEFAULT_DEDUP_TAG.to_string(),
            import_url: None,
            push_url: None,
            download: true,
            remove_archive: true,
            page_url_base: None,
        }
    }
}

/// Counters for a finished run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub external_items: usize,
    pub sink_items: usize,
    pub source_created: usize,
    pub source_updated: usize,
    /// Mapping links added or re-pointed after the merge
    pub links_recorded: usize,
    pub exported_pages: usize,
    pub sink: SinkWriteStats,
    /// `None` when no push endpoint is configured
    pub pushed: Option<bool>,
    pub mapping_entries: usize,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  ingested:  {} external, {} from sink",
            self.external_items, self.sink_items
        )?;
        writeln!(
            f,
            "  source:    {} created, {} updated",
            self.source_created, self.source_updated
        )?;
        writeln!(
            f,
            "  sink:      {} created, {} updated, {} unchanged",
            self.sink.created, self.sink.updated, self.sink.unchanged
        )?;
        let pushed = match self.pushed {
            Some(true) => "ok",
            Some(false) => "failed",
            None => "skipped",
        };
        writeln!(f, "  push:      {}", pushed)?;
        write!(f, "  mapping:   {} links", self.mapping_entries)
    }
}
