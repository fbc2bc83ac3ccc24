//! Sink -> Source reconciliation.
//!
//! Picks the Sink notes that still need importing, shapes them as Source
//! payload items through the mapping, records the uids Source confirmed, and
//! finally marks the notes with the dedup tag so no later run selects them.
//!
//! Ordering matters for crash safety: the mapping is checkpointed before the
//! tag is written. A crash in between leaves a mapped but untagged note, which
//! the next run re-imports as an update instead of a duplicate.

use crate::mapping::{MappingCache, Upsert};
use crate::model::{ImportItem, MergeReceipt, NoteDraft, SinkNote};
use crate::store::{NoteQuery, SinkStore};
use crate::sync::convert::body_to_blocks;
use anyhow::Result;
use tracing::{debug, info, warn};

pub struct SinkReconciler<'a> {
    sink: &'a dyn SinkStore,
    source_notebook: &'a str,
    dedup_tag: &'a str,
}

impl<'a> SinkReconciler<'a> {
    pub fn new(sink: &'a dyn SinkStore, source_notebook: &'a str, dedup_tag: &'a str) -> Self {
        Self {
            sink,
            source_notebook,
            dedup_tag,
        }
    }

    /// Notes in the source notebook that do not carry the dedup tag.
    pub async fn notes_eligible_for_import(&self) -> Result<Vec<SinkNote>> {
        let query = NoteQuery {
            notebook: self.source_notebook.to_string(),
            without_tag: Some(self.dedup_tag.to_string()),
        };
        let notes: Vec<SinkNote> = self
            .sink
            .find_notes(&query)
            .await?
            .into_iter()
            .filter(|n| !n.has_tag(self.dedup_tag))
            .collect();

        debug!(
            "{} sink notes eligible for import from {}",
            notes.len(),
            self.source_notebook
        );
        Ok(notes)
    }

    /// Shape Sink notes as Source payload items.
    ///
    /// A note already linked becomes an `Update` of its page; anything else a
    /// `Create` remembering which Sink note it came from.
    pub fn to_source_payload(&self, notes: &[SinkNote], mapping: &MappingCache) -> Vec<ImportItem> {
        notes
            .iter()
            .map(|note| {
                let draft = NoteDraft {
                    title: source_title(note),
                    children: body_to_blocks(&note.body),
                };
                let origin = Some(note.id.clone());
                match mapping.lookup_by_sink(&note.id) {
                    Some(uid) => ImportItem::Update {
                        uid: uid.clone(),
                        draft,
                        origin,
                    },
                    None => ImportItem::Create { draft, origin },
                }
            })
            .collect()
    }

    /// Link every Sink-derived item to the uid Source confirmed for it.
    /// Returns the number of links added or re-pointed.
    ///
    /// A create can land on a page that is already linked (a title match
    /// appends to the existing page). While that page's Sink note still
    /// exists it keeps the link; the newcomer's content now lives on the page
    /// and reaches the linked note through the Sink write.
    pub async fn record_confirmed(
        &self,
        batch: &[ImportItem],
        receipt: &MergeReceipt,
        mapping: &mut MappingCache,
    ) -> usize {
        let mut recorded = 0;
        for (index, item) in batch.iter().enumerate() {
            let Some(sink_id) = item.origin() else {
                continue;
            };
            let Some(uid) = receipt.confirmed_id(index) else {
                warn!("Source did not confirm sink note {}", sink_id);
                continue;
            };
            if let Some(linked) = mapping.lookup_by_source(uid).filter(|l| *l != sink_id) {
                if self.still_exists(linked).await {
                    info!(
                        "Sink note {} merged into page {}, which stays linked to {}",
                        sink_id, uid, linked
                    );
                    continue;
                }
            }
            match mapping.upsert(uid.clone(), sink_id.clone()) {
                Upsert::Unchanged => {}
                Upsert::Inserted | Upsert::Relinked { .. } => {
                    debug!("Linked source {} <-> sink {}", uid, sink_id);
                    recorded += 1;
                }
            }
        }
        recorded
    }

    /// A failed lookup counts as present so a live link is never dropped.
    async fn still_exists(&self, id: &str) -> bool {
        match self.sink.get_note(id).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!("Cannot check sink note {}: {:#}", id, e);
                true
            }
        }
    }

    /// Tag imported notes so they are never selected again.
    pub async fn cleanup_imported_markers(&self, notes: &[SinkNote]) -> Result<usize> {
        let mut tagged = 0;
        for imported in notes {
            // Re-read so an edit made since ingest is not overwritten
            let Some(mut note) = self.sink.get_note(&imported.id).await? else {
                warn!("Sink note {} vanished before it could be tagged", imported.id);
                continue;
            };
            if note.add_tag(self.dedup_tag) {
                self.sink.update_note(&note).await?;
                tagged += 1;
            }
        }

        if tagged > 0 {
            info!("Tagged {} imported sink notes with {}", tagged, self.dedup_tag);
        }
        Ok(tagged)
    }
}

fn source_title(note: &SinkNote) -> String {
    let title = note.title.trim();
    if title.is_empty() {
        format!("Untitled {}", note.id)
    } else {
        title.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewSinkNote;
    use crate::store::LocalNotebookStore;
    use tempfile::TempDir;

    fn sink_note(id: &str, title: &str) -> SinkNote {
        SinkNote {
            id: id.to_string(),
            title: title.to_string(),
            body: "line".to_string(),
            tags: vec![],
            notebook: "RoamImport".to_string(),
            source_url: None,
            updated_at: None,
        }
    }

    async fn store() -> (LocalNotebookStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = LocalNotebookStore::open(tmp.path());
        store.init().await.unwrap();
        (store, tmp)
    }

    #[tokio::test]
    async fn test_payload_shapes_create_and_update() {
        let (sink, _tmp) = store().await;
        let reconciler = SinkReconciler::new(&sink, "RoamImport", "RoamImported");

        let mut mapping = MappingCache::new();
        mapping.upsert("r1", "s1");

        let items = reconciler.to_source_payload(
            &[sink_note("s1", "Known"), sink_note("s2", "  ")],
            &mapping,
        );

        match &items[0] {
            ImportItem::Update { uid, origin, .. } => {
                assert_eq!(uid, "r1");
                assert_eq!(origin.as_deref(), Some("s1"));
            }
            other => panic!("Expected Update, got {:?}", other),
        }
        match &items[1] {
            ImportItem::Create { draft, origin } => {
                assert_eq!(draft.title, "Untitled s2");
                assert_eq!(origin.as_deref(), Some("s2"));
            }
            other => panic!("Expected Create, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_record_confirmed_skips_external_items() {
        let (sink, _tmp) = store().await;
        let reconciler = SinkReconciler::new(&sink, "RoamImport", "RoamImported");

        let batch = vec![
            ImportItem::Create {
                draft: NoteDraft::default(),
                origin: None,
            },
            ImportItem::Create {
                draft: NoteDraft::default(),
                origin: Some("s1".to_string()),
            },
        ];
        let mut receipt = MergeReceipt::default();
        receipt.confirmed.insert(0, "x0".to_string());
        receipt.confirmed.insert(1, "r1".to_string());

        let mut mapping = MappingCache::new();
        assert_eq!(reconciler.record_confirmed(&batch, &receipt, &mut mapping).await, 1);
        assert_eq!(reconciler.record_confirmed(&batch, &receipt, &mut mapping).await, 0);
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.lookup_by_sink("s1").map(String::as_str), Some("r1"));
    }

    #[tokio::test]
    async fn test_record_confirmed_keeps_live_link_on_title_merge() {
        let (sink, _tmp) = store().await;
        let linked_id = sink
            .create_note(NewSinkNote {
                title: "Foo".to_string(),
                body: "- original".to_string(),
                tags: vec!["RoamImported".to_string()],
                notebook: "Roam".to_string(),
                source_url: None,
            })
            .await
            .unwrap();
        let reconciler = SinkReconciler::new(&sink, "RoamImport", "RoamImported");

        let batch = vec![ImportItem::Create {
            draft: NoteDraft::default(),
            origin: Some("s2".to_string()),
        }];
        let mut receipt = MergeReceipt::default();
        receipt.confirmed.insert(0, "r1".to_string());

        let mut mapping = MappingCache::new();
        mapping.upsert("r1", linked_id.clone());
        assert_eq!(reconciler.record_confirmed(&batch, &receipt, &mut mapping).await, 0);
        assert_eq!(mapping.lookup_by_source("r1"), Some(&linked_id));
        assert!(mapping.lookup_by_sink("s2").is_none());

        // Once the linked note is gone the newcomer takes over
        let mut stale = MappingCache::new();
        stale.upsert("r1", "deleted");
        assert_eq!(reconciler.record_confirmed(&batch, &receipt, &mut stale).await, 1);
        assert_eq!(stale.lookup_by_source("r1").map(String::as_str), Some("s2"));
    }

    #[tokio::test]
    async fn test_cleanup_tags_and_closes_eligibility() {
        let (sink, _tmp) = store().await;
        sink.create_note(NewSinkNote {
            title: "Inbox".to_string(),
            body: "todo".to_string(),
            tags: vec![],
            notebook: "RoamImport".to_string(),
            source_url: None,
        })
        .await
        .unwrap();

        let reconciler = SinkReconciler::new(&sink, "RoamImport", "RoamImported");
        let eligible = reconciler.notes_eligible_for_import().await.unwrap();
        assert_eq!(eligible.len(), 1);

        assert_eq!(reconciler.cleanup_imported_markers(&eligible).await.unwrap(), 1);
        assert!(reconciler.notes_eligible_for_import().await.unwrap().is_empty());

        // Second cleanup is a no-op
        assert_eq!(reconciler.cleanup_imported_markers(&eligible).await.unwrap(), 0);
    }
}
