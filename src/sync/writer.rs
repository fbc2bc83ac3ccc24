//! Merge of the combined payload into Source.

use crate::error::{Result, SyncError};
use crate::model::{ImportItem, MergeReceipt, NoteDraft};
use crate::store::SourceStore;
use anyhow::Context;
use tracing::{debug, info};

pub struct SourceWriter<'a> {
    source: &'a dyn SourceStore,
}

impl<'a> SourceWriter<'a> {
    pub fn new(source: &'a dyn SourceStore) -> Self {
        Self { source }
    }

    /// External items first, then Sink-derived ones; each keeps its own order.
    pub fn combine(external: Vec<NoteDraft>, reconciled: Vec<ImportItem>) -> Vec<ImportItem> {
        external
            .into_iter()
            .map(|draft| ImportItem::Create {
                draft,
                origin: None,
            })
            .chain(reconciled)
            .collect()
    }

    /// Apply `batch` in a single import call. An empty batch never reaches Source.
    pub async fn merge(&self, batch: &[ImportItem]) -> Result<MergeReceipt> {
        if batch.is_empty() {
            debug!("Nothing to merge into source");
            return Ok(MergeReceipt::default());
        }

        let receipt = self
            .source
            .import(batch)
            .await
            .with_context(|| format!("Source rejected a payload of {} items", batch.len()))
            .map_err(SyncError::Merge)?;

        info!(
            "Source merge: {} created, {} updated",
            receipt.created, receipt.updated
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BlockDraft;

    fn draft(title: &str) -> NoteDraft {
        NoteDraft {
            title: title.to_string(),
            children: vec![BlockDraft::text("x")],
        }
    }

    #[test]
    fn test_combine_puts_external_first() {
        let reconciled = vec![
            ImportItem::Update {
                uid: "r1".to_string(),
                draft: draft("sink-1"),
                origin: Some("s1".to_string()),
            },
            ImportItem::Create {
                draft: draft("sink-2"),
                origin: Some("s2".to_string()),
            },
        ];
        let batch = SourceWriter::combine(vec![draft("ext-1"), draft("ext-2")], reconciled);

        let titles: Vec<&str> = batch.iter().map(|i| i.draft().title.as_str()).collect();
        assert_eq!(titles, vec!["ext-1", "ext-2", "sink-1", "sink-2"]);
        assert!(batch[0].origin().is_none());
        assert_eq!(batch[3].origin().map(String::as_str), Some("s2"));
    }
}
