//! Best-effort forward of the snapshot to an external endpoint.
//!
//! Runs as a detached task next to the Sink write. Its outcome is logged and
//! reported, never propagated, and it has no access to the mapping.

use crate::error::SyncError;
use crate::model::SyncSnapshot;
use crate::store::ExternalFetch;
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct PushStage {
    fetch: Arc<dyn ExternalFetch>,
    url: Option<String>,
}

impl PushStage {
    pub fn new(fetch: Arc<dyn ExternalFetch>, url: Option<String>) -> Self {
        Self { fetch, url }
    }

    /// Request body: the snapshot's pages tagged with the graph name.
    pub fn payload(snapshot: &SyncSnapshot) -> serde_json::Value {
        json!({
            "graphName": snapshot.graph,
            "graphContent": snapshot.notes,
        })
    }

    /// Start the push. `None` when no endpoint is configured; the handle
    /// resolves to whether the endpoint accepted the snapshot.
    pub fn spawn(&self, snapshot: &SyncSnapshot) -> Option<JoinHandle<bool>> {
        let url = self.url.clone()?;
        let fetch = Arc::clone(&self.fetch);
        let body = Self::payload(snapshot);
        let pages = snapshot.notes.len();

        Some(tokio::spawn(async move {
            match fetch.post(&url, &body).await {
                Ok(_) => {
                    info!("Pushed {} pages to {}", pages, url);
                    true
                }
                Err(e) => {
                    warn!("{}", SyncError::Push(e.context(format!("POST {}", url))));
                    false
                }
            }
        }))
    }
}
