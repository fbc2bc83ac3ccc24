//! Sync pipeline.
//!
//! Orchestrates the stages of one run:
//!
//! ```text
//! Init -> Ingest -> Merge -> Export -> Distribute -> Checkpoint -> Done
//!           |                              |
//!   external  sink notes           push (spawned)  sink write
//! ```
//!
//! Any failure ends the run in `Aborted(kind)`. The mapping is written to disk
//! at two points only: after Source confirmed the merge, and after the Sink
//! write (whether that succeeded or not). Failures before the merge leave the
//! cache file exactly as it was.

use crate::error::{Result, SyncError};
use crate::mapping::CacheFile;
use crate::store::{ExternalFetch, SinkStore, SourceStore};
use crate::sync::{
    IngestStage, PushStage, RunReport, SinkReconciler, SinkWriteStats, SourceExporter,
    SourceToSinkWriter, SourceWriter, Stage, SyncOptions,
};
use anyhow::Context;
use std::sync::Arc;
use tracing::{error, info, warn};

/// One sync run between a Source and a Sink
pub struct Pipeline {
    source: Arc<dyn SourceStore>,
    sink: Arc<dyn SinkStore>,
    fetch: Arc<dyn ExternalFetch>,
    cache_file: CacheFile,
    options: SyncOptions,
    stage: Stage,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn SourceStore>,
        sink: Arc<dyn SinkStore>,
        fetch: Arc<dyn ExternalFetch>,
        cache_file: CacheFile,
        options: SyncOptions,
    ) -> Self {
        Self {
            source,
            sink,
            fetch,
            cache_file,
            options,
            stage: Stage::Init,
        }
    }

    /// Stage the pipeline is in (or ended in)
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Run every stage to completion.
    pub async fn run(&mut self) -> Result<RunReport> {
        match self.run_stages().await {
            Ok(report) => {
                self.advance(Stage::Done);
                Ok(report)
            }
            Err(e) => {
                self.stage = Stage::Aborted(e.kind());
                error!("Sync of {} aborted: {}", self.options.graph, e);
                Err(e)
            }
        }
    }

    fn advance(&mut self, stage: Stage) {
        info!("{} -> {}", self.stage, stage);
        self.stage = stage;
    }

    async fn run_stages(&mut self) -> Result<RunReport> {
        let source = Arc::clone(&self.source);
        let sink = Arc::clone(&self.sink);
        let fetch = Arc::clone(&self.fetch);
        let cache_file = self.cache_file.clone();
        let opts = self.options.clone();
        let mut report = RunReport::default();

        // 1. Init: mapping and Sink connection
        info!("Starting sync of graph {}", opts.graph);
        let mut mapping = cache_file.load();
        sink.init()
            .await
            .context("Failed to initialise sink")
            .map_err(SyncError::Ingest)?;

        // 2. Ingest (fan-out / join)
        self.advance(Stage::Ingest);
        let reconciler = SinkReconciler::new(sink.as_ref(), &opts.source_notebook, &opts.dedup_tag);
        let batch = IngestStage::new(fetch.as_ref(), &reconciler, opts.import_url.as_deref())
            .run()
            .await?;
        report.external_items = batch.external.len();
        report.sink_items = batch.sink_notes.len();

        // 3. Merge into Source, then link, checkpoint, and tag
        self.advance(Stage::Merge);
        let reconciled = reconciler.to_source_payload(&batch.sink_notes, &mapping);
        let payload = SourceWriter::combine(batch.external, reconciled);
        let receipt = SourceWriter::new(source.as_ref()).merge(&payload).await?;
        report.source_created = receipt.created;
        report.source_updated = receipt.updated;

        report.links_recorded = reconciler
            .record_confirmed(&payload, &receipt, &mut mapping)
            .await;
        if !payload.is_empty() {
            cache_file.save(&mapping)?;
        }
        reconciler
            .cleanup_imported_markers(&batch.sink_notes)
            .await
            .map_err(SyncError::SinkWrite)?;

        // 4. Export
        self.advance(Stage::Export);
        let snapshot = SourceExporter::new(source.as_ref())
            .export(opts.remove_archive, opts.download)
            .await?;
        report.exported_pages = snapshot.notes.len();

        // 5. Distribute: push runs beside the Sink write
        self.advance(Stage::Distribute);
        let push = PushStage::new(Arc::clone(&fetch), opts.push_url.clone()).spawn(&snapshot);

        let writer = SourceToSinkWriter::new(sink.as_ref(), &opts.target_notebook, &opts.dedup_tag)
            .with_page_url_base(opts.page_url_base.as_deref())
            .with_checkpoint(&cache_file);
        let mut sink_stats = SinkWriteStats::default();
        let written = writer
            .write_snapshot(&snapshot, &mut mapping, &mut sink_stats)
            .await;
        report.sink = sink_stats;

        // 6. Checkpoint, whatever the Sink write did
        self.advance(Stage::Checkpoint);
        let saved = cache_file.save(&mapping);
        report.mapping_entries = mapping.len();

        if let Some(handle) = push {
            report.pushed = Some(match handle.await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Push task failed: {}", e);
                    false
                }
            });
        }

        written?;
        saved?;
        Ok(report)
    }
}
