//! Snapshot export from Source.

use crate::error::{Result, SyncError};
use crate::model::SyncSnapshot;
use crate::store::SourceStore;
use tracing::info;

pub struct SourceExporter<'a> {
    source: &'a dyn SourceStore,
}

/// Archive removal only applies to an archive this run actually downloaded.
pub fn cleanup_artifacts(requested: bool, did_download: bool) -> bool {
    requested && did_download
}

impl<'a> SourceExporter<'a> {
    pub fn new(source: &'a dyn SourceStore) -> Self {
        Self { source }
    }

    pub async fn export(&self, requested_cleanup: bool, did_download: bool) -> Result<SyncSnapshot> {
        let remove = cleanup_artifacts(requested_cleanup, did_download);
        let snapshot = self
            .source
            .export_snapshot(remove)
            .await
            .map_err(SyncError::Export)?;

        info!(
            "Exported {} pages from {}",
            snapshot.notes.len(),
            snapshot.graph
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_needs_a_download() {
        assert!(cleanup_artifacts(true, true));
        assert!(!cleanup_artifacts(true, false));
        assert!(!cleanup_artifacts(false, true));
        assert!(!cleanup_artifacts(false, false));
    }
}
