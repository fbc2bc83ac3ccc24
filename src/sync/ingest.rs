//! Ingest: gather everything headed into Source.
//!
//! Two producers run concurrently and are joined before anything is merged:
//! the external payload endpoint and the Sink notes eligible for import.
//! Either failing aborts the run before Source is touched.

use crate::error::{Result, SyncError};
use crate::model::{NoteDraft, SinkNote};
use crate::store::ExternalFetch;
use crate::sync::reconcile::SinkReconciler;
use anyhow::Context;
use tracing::{debug, info};

/// Joined output of both producers
#[derive(Debug, Default)]
pub struct IngestBatch {
    /// Source-shaped items from the external endpoint, in endpoint order
    pub external: Vec<NoteDraft>,

    /// Sink notes to import, in Sink order
    pub sink_notes: Vec<SinkNote>,
}

impl IngestBatch {
    pub fn is_empty(&self) -> bool {
        self.external.is_empty() && self.sink_notes.is_empty()
    }
}

pub struct IngestStage<'a> {
    fetch: &'a dyn ExternalFetch,
    reconciler: &'a SinkReconciler<'a>,
    import_url: Option<&'a str>,
}

impl<'a> IngestStage<'a> {
    pub fn new(
        fetch: &'a dyn ExternalFetch,
        reconciler: &'a SinkReconciler<'a>,
        import_url: Option<&'a str>,
    ) -> Self {
        Self {
            fetch,
            reconciler,
            import_url,
        }
    }

    pub async fn run(&self) -> Result<IngestBatch> {
        let (external, sink_notes) = tokio::join!(
            self.fetch_external(),
            self.reconciler.notes_eligible_for_import()
        );

        let external = external.map_err(SyncError::Ingest)?;
        let sink_notes = sink_notes
            .context("Failed to query sink for notes to import")
            .map_err(SyncError::Ingest)?;

        info!(
            "Ingested {} external items and {} sink notes",
            external.len(),
            sink_notes.len()
        );
        Ok(IngestBatch {
            external,
            sink_notes,
        })
    }

    async fn fetch_external(&self) -> anyhow::Result<Vec<NoteDraft>> {
        let Some(url) = self.import_url else {
            debug!("No import URL configured, skipping external payload");
            return Ok(Vec::new());
        };

        let value = self
            .fetch
            .get(url)
            .await
            .with_context(|| format!("Failed to fetch external payload from {}", url))?;
        parse_external(value).with_context(|| format!("Malformed external payload from {}", url))
    }
}

/// The endpoint must answer with an array of page-shaped objects (or null).
pub fn parse_external(value: serde_json::Value) -> anyhow::Result<Vec<NoteDraft>> {
    match value {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::Array(_) => Ok(serde_json::from_value(value)?),
        other => anyhow::bail!("expected a JSON array of pages, got {}", json_kind(&other)),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
