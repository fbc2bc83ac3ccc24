//! File-backed Source store.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/graph.json                         live graph (array of pages)
//! <root>/downloads/<graph>-<ts>.json.zst    export archive ("download")
//! ```
//!
//! An export with downloading enabled writes a zstd archive of the graph,
//! reads the snapshot back out of it, and optionally removes it. Without
//! downloading the snapshot is taken straight from `graph.json`.

use crate::model::{ImportItem, MergeReceipt, SourceId, SourceNote, SyncSnapshot};
use crate::store::{Graph, SourceStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

const GRAPH_FILE: &str = "graph.json";
const DOWNLOAD_DIR: &str = "downloads";
const ARCHIVE_LEVEL: i32 = 3;

/// Length of minted uids
const UID_LEN: usize = 9;

pub struct LocalGraphStore {
    graph_name: String,
    root: PathBuf,
    download: bool,
    graph: Mutex<Graph>,
}

impl LocalGraphStore {
    /// Open the store at `root`, creating it when missing.
    pub async fn open(root: &Path, graph_name: &str, download: bool) -> Result<Self> {
        fs::create_dir_all(root)
            .await
            .with_context(|| format!("Failed to create graph dir {}", root.display()))?;

        let graph_file = root.join(GRAPH_FILE);
        let notes: Vec<SourceNote> = match fs::read(&graph_file).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to parse {}", graph_file.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", graph_file.display()))
            }
        };
        debug!("Opened graph {} with {} pages", graph_name, notes.len());

        Ok(Self {
            graph_name: graph_name.to_string(),
            root: root.to_path_buf(),
            download,
            graph: Mutex::new(Graph::new(notes)),
        })
    }

    pub fn download_dir(&self) -> PathBuf {
        self.root.join(DOWNLOAD_DIR)
    }

    pub async fn notes(&self) -> Vec<SourceNote> {
        self.graph.lock().await.notes().to_vec()
    }

    async fn persist(&self, notes: &[SourceNote]) -> Result<()> {
        let path = self.root.join(GRAPH_FILE);
        let temp_file = path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(notes)?;
        fs::write(&temp_file, bytes).await?;
        fs::rename(&temp_file, &path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    /// Write the archive and return its path
    async fn download_archive(&self, notes: &[SourceNote]) -> Result<PathBuf> {
        let dir = self.download_dir();
        fs::create_dir_all(&dir).await?;

        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f");
        let path = dir.join(format!("{}-{}.json.zst", self.graph_name, stamp));

        let json = serde_json::to_vec(notes)?;
        let compressed = tokio::task::spawn_blocking(move || {
            zstd::encode_all(json.as_slice(), ARCHIVE_LEVEL)
        })
        .await??;
        fs::write(&path, compressed)
            .await
            .with_context(|| format!("Failed to write archive {}", path.display()))?;

        debug!("Downloaded graph archive to {}", path.display());
        Ok(path)
    }

    async fn read_archive(path: &Path) -> Result<Vec<SourceNote>> {
        let compressed = fs::read(path)
            .await
            .with_context(|| format!("Failed to read archive {}", path.display()))?;
        let json = tokio::task::spawn_blocking(move || zstd::decode_all(compressed.as_slice()))
            .await??;
        Ok(serde_json::from_slice(&json)?)
    }
}

fn mint_uid() -> SourceId {
    let mut uid = uuid::Uuid::new_v4().simple().to_string();
    uid.truncate(UID_LEN);
    uid
}

#[async_trait]
impl SourceStore for LocalGraphStore {
    async fn import(&self, batch: &[ImportItem]) -> Result<MergeReceipt> {
        let mut graph = self.graph.lock().await;

        // Merge into a copy so a failed write leaves the live graph untouched
        let mut next = graph.clone();
        let receipt = next.merge(batch, mint_uid)?;
        self.persist(next.notes()).await?;
        *graph = next;

        info!(
            "Merged {} items into {} ({} created, {} updated)",
            batch.len(),
            self.graph_name,
            receipt.created,
            receipt.updated
        );
        Ok(receipt)
    }

    async fn export_snapshot(&self, remove_artifacts: bool) -> Result<SyncSnapshot> {
        let notes = if self.download {
            let current = self.graph.lock().await.notes().to_vec();
            let archive = self.download_archive(&current).await?;
            let notes = Self::read_archive(&archive).await?;
            if remove_artifacts {
                fs::remove_file(&archive).await.with_context(|| {
                    format!("Failed to remove archive {}", archive.display())
                })?;
                debug!("Removed {}", archive.display());
            }
            notes
        } else {
            let path = self.root.join(GRAPH_FILE);
            match fs::read(&path).await {
                Ok(bytes) => serde_json::from_slice(&bytes)?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
                Err(e) => return Err(e.into()),
            }
        };

        Ok(SyncSnapshot {
            graph: self.graph_name.clone(),
            notes,
            exported_at: chrono::Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockDraft, NoteDraft};
    use tempfile::TempDir;

    fn create(title: &str, line: &str) -> ImportItem {
        ImportItem::Create {
            draft: NoteDraft {
                title: title.to_string(),
                children: vec![BlockDraft::text(line)],
            },
            origin: None,
        }
    }

    async fn archives(store: &LocalGraphStore) -> usize {
        let mut count = 0;
        if let Ok(mut dir) = fs::read_dir(store.download_dir()).await {
            while let Ok(Some(_)) = dir.next_entry().await {
                count += 1;
            }
        }
        count
    }

    #[tokio::test]
    async fn test_import_persists_across_open() {
        let tmp = TempDir::new().unwrap();
        let store = LocalGraphStore::open(tmp.path(), "test", true).await.unwrap();
        let receipt = store.import(&[create("Page", "hello")]).await.unwrap();
        let uid = receipt.confirmed_id(0).unwrap().clone();
        assert_eq!(uid.len(), UID_LEN);

        let reopened = LocalGraphStore::open(tmp.path(), "test", true).await.unwrap();
        let notes = reopened.notes().await;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].uid, uid);
    }

    #[tokio::test]
    async fn test_export_removes_archive_when_asked() {
        let tmp = TempDir::new().unwrap();
        let store = LocalGraphStore::open(tmp.path(), "test", true).await.unwrap();
        store.import(&[create("Page", "hello")]).await.unwrap();

        let snapshot = store.export_snapshot(true).await.unwrap();
        assert_eq!(snapshot.notes.len(), 1);
        assert_eq!(snapshot.graph, "test");
        assert_eq!(archives(&store).await, 0);

        store.export_snapshot(false).await.unwrap();
        assert_eq!(archives(&store).await, 1);
    }

    #[tokio::test]
    async fn test_export_without_download_reads_graph_file() {
        let tmp = TempDir::new().unwrap();
        let store = LocalGraphStore::open(tmp.path(), "test", false).await.unwrap();
        store.import(&[create("Page", "hello")]).await.unwrap();

        let snapshot = store.export_snapshot(false).await.unwrap();
        assert_eq!(snapshot.notes.len(), 1);
        assert_eq!(archives(&store).await, 0);
    }

    #[tokio::test]
    async fn test_failed_merge_leaves_graph_untouched() {
        let tmp = TempDir::new().unwrap();
        let store = LocalGraphStore::open(tmp.path(), "test", false).await.unwrap();
        store.import(&[create("Page", "hello")]).await.unwrap();

        let err = store.import(&[create("Other", "x"), create("", "bad")]).await;
        assert!(err.is_err());
        assert_eq!(store.notes().await.len(), 1);
    }
}
