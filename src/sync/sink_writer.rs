//! Source -> Sink write of the exported snapshot.
//!
//! Every page either updates the Sink note it is linked to or gets a new note
//! in the target notebook. New notes are born with the dedup tag, and their
//! link is recorded (and checkpointed, when a cache file is attached) before
//! the next page is looked at, so a crash mid-batch loses at most the note in
//! flight.

use crate::error::{Result, SyncError};
use crate::mapping::{CacheFile, MappingCache};
use crate::model::{NewSinkNote, SinkNote, SourceNote, SyncSnapshot};
use crate::store::SinkStore;
use crate::sync::convert::blocks_to_body;
use anyhow::Context;
use tracing::{debug, info};

/// Per-run counters of the Sink write
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SinkWriteStats {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

pub struct SourceToSinkWriter<'a> {
    sink: &'a dyn SinkStore,
    target_notebook: &'a str,
    dedup_tag: &'a str,
    page_url_base: Option<&'a str>,
    checkpoint: Option<&'a CacheFile>,
}

impl<'a> SourceToSinkWriter<'a> {
    pub fn new(sink: &'a dyn SinkStore, target_notebook: &'a str, dedup_tag: &'a str) -> Self {
        Self {
            sink,
            target_notebook,
            dedup_tag,
            page_url_base: None,
            checkpoint: None,
        }
    }

    /// Link each Sink note back to its page under this base URL
    pub fn with_page_url_base(mut self, base: Option<&'a str>) -> Self {
        self.page_url_base = base;
        self
    }

    /// Save the mapping after every created note
    pub fn with_checkpoint(mut self, file: &'a CacheFile) -> Self {
        self.checkpoint = Some(file);
        self
    }

    /// Write every page of `snapshot`. `stats` is filled in as pages land, so
    /// it stays accurate when the write fails part way.
    pub async fn write_snapshot(
        &self,
        snapshot: &SyncSnapshot,
        mapping: &mut MappingCache,
        stats: &mut SinkWriteStats,
    ) -> Result<()> {
        for page in &snapshot.notes {
            self.write_page(page, mapping, stats).await?;
        }

        info!(
            "Sink write: {} created, {} updated, {} unchanged",
            stats.created, stats.updated, stats.unchanged
        );
        Ok(())
    }

    async fn write_page(
        &self,
        page: &SourceNote,
        mapping: &mut MappingCache,
        stats: &mut SinkWriteStats,
    ) -> Result<()> {
        let body = blocks_to_body(&page.children);
        let source_url = self.page_url(&page.uid);

        let linked = match mapping.lookup_by_source(&page.uid) {
            Some(sink_id) => self
                .sink
                .get_note(sink_id)
                .await
                .with_context(|| format!("Failed to read sink note {}", sink_id))
                .map_err(SyncError::SinkWrite)?,
            None => None,
        };

        match linked {
            Some(existing) => {
                let mut note = SinkNote {
                    title: page.title.clone(),
                    body,
                    source_url: source_url.or_else(|| existing.source_url.clone()),
                    ..existing.clone()
                };
                note.add_tag(self.dedup_tag);

                if note == existing {
                    stats.unchanged += 1;
                    return Ok(());
                }

                self.sink
                    .update_note(&note)
                    .await
                    .with_context(|| format!("Failed to update sink note {}", note.id))
                    .map_err(SyncError::SinkWrite)?;
                debug!("Updated sink note {} from page {}", note.id, page.uid);
                stats.updated += 1;
            }
            None => {
                let sink_id = self
                    .sink
                    .create_note(NewSinkNote {
                        title: page.title.clone(),
                        body,
                        tags: vec![self.dedup_tag.to_string()],
                        notebook: self.target_notebook.to_string(),
                        source_url,
                    })
                    .await
                    .with_context(|| format!("Failed to create sink note for page {}", page.uid))
                    .map_err(SyncError::SinkWrite)?;

                mapping.upsert(page.uid.clone(), sink_id.clone());
                if let Some(file) = self.checkpoint {
                    file.save(mapping)?;
                }
                debug!("Created sink note {} for page {}", sink_id, page.uid);
                stats.created += 1;
            }
        }
        Ok(())
    }

    fn page_url(&self, uid: &str) -> Option<String> {
        self.page_url_base
            .map(|base| format!("{}/page/{}", base.trim_end_matches('/'), uid))
    }
}
