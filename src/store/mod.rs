//! Collaborator interfaces the sync core talks to, plus local implementations.
//!
//! The core never sees a transport. Source and Sink are reached through
//! [`SourceStore`] and [`SinkStore`]; arbitrary HTTP endpoints through
//! [`ExternalFetch`]. Timeouts and retries belong to the implementations.

pub mod graph;
pub mod http;
pub mod local_sink;
pub mod local_source;

pub use graph::Graph;
pub use http::HttpFetch;
pub use local_sink::LocalNotebookStore;
pub use local_source::LocalGraphStore;

use crate::model::{ImportItem, MergeReceipt, NewSinkNote, SinkId, SinkNote, SyncSnapshot};
use anyhow::Result;
use async_trait::async_trait;

/// The primary note graph
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Merge a payload in one call. Updates keep their uid; the receipt
    /// reports the uid every item landed on.
    async fn import(&self, batch: &[ImportItem]) -> Result<MergeReceipt>;

    /// Full export of the current graph. `remove_artifacts` discards the
    /// downloaded archive once the snapshot is in memory.
    async fn export_snapshot(&self, remove_artifacts: bool) -> Result<SyncSnapshot>;
}

/// Filter for [`SinkStore::find_notes`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteQuery {
    pub notebook: String,
    /// Exclude notes carrying this tag
    pub without_tag: Option<String>,
}

/// The secondary note store
#[async_trait]
pub trait SinkStore: Send + Sync {
    /// Connect and make sure the store is usable
    async fn init(&self) -> Result<()>;

    async fn find_notes(&self, query: &NoteQuery) -> Result<Vec<SinkNote>>;

    async fn get_note(&self, id: &str) -> Result<Option<SinkNote>>;

    /// Create a note, returning the id Sink assigned
    async fn create_note(&self, note: NewSinkNote) -> Result<SinkId>;

    /// Overwrite an existing note
    async fn update_note(&self, note: &SinkNote) -> Result<()>;
}

/// Generic JSON-over-HTTP access
#[async_trait]
pub trait ExternalFetch: Send + Sync {
    async fn get(&self, url: &str) -> Result<serde_json::Value>;

    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<String>;
}
