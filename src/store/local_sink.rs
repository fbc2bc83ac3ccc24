//! File-backed Sink store: every note of every notebook in one JSON file.

use crate::model::{NewSinkNote, SinkId, SinkNote};
use crate::store::{NoteQuery, SinkStore};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

const NOTES_FILE: &str = "notes.json";

pub struct LocalNotebookStore {
    root: PathBuf,
    notes: Mutex<Vec<SinkNote>>,
}

impl LocalNotebookStore {
    /// Open the store at `root`. Nothing is read until [`SinkStore::init`].
    pub fn open(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            notes: Mutex::new(Vec::new()),
        }
    }

    fn notes_file(&self) -> PathBuf {
        self.root.join(NOTES_FILE)
    }

    /// Every note, in storage order
    pub async fn all_notes(&self) -> Vec<SinkNote> {
        self.notes.lock().await.clone()
    }

    async fn persist(&self, notes: &[SinkNote]) -> Result<()> {
        let path = self.notes_file();
        let temp_file = path.with_extension("tmp");
        fs::write(&temp_file, serde_json::to_vec_pretty(notes)?).await?;
        fs::rename(&temp_file, &path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl SinkStore for LocalNotebookStore {
    async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create notebook dir {}", self.root.display()))?;

        let path = self.notes_file();
        let loaded: Vec<SinkNote> = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to parse {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };
        debug!("Loaded {} sink notes from {}", loaded.len(), path.display());

        *self.notes.lock().await = loaded;
        Ok(())
    }

    async fn find_notes(&self, query: &NoteQuery) -> Result<Vec<SinkNote>> {
        let notes = self.notes.lock().await;
        Ok(notes
            .iter()
            .filter(|n| n.notebook == query.notebook)
            .filter(|n| match &query.without_tag {
                Some(tag) => !n.has_tag(tag),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn get_note(&self, id: &str) -> Result<Option<SinkNote>> {
        let notes = self.notes.lock().await;
        Ok(notes.iter().find(|n| n.id == id).cloned())
    }

    async fn create_note(&self, note: NewSinkNote) -> Result<SinkId> {
        let mut notes = self.notes.lock().await;
        let id = uuid::Uuid::new_v4().to_string();

        let mut next = notes.clone();
        next.push(SinkNote {
            id: id.clone(),
            title: note.title,
            body: note.body,
            tags: note.tags,
            notebook: note.notebook,
            source_url: note.source_url,
            updated_at: Some(chrono::Utc::now()),
        });
        self.persist(&next).await?;
        *notes = next;

        Ok(id)
    }

    async fn update_note(&self, note: &SinkNote) -> Result<()> {
        let mut notes = self.notes.lock().await;
        let Some(pos) = notes.iter().position(|n| n.id == note.id) else {
            bail!("sink note {} does not exist", note.id);
        };

        let mut next = notes.clone();
        next[pos] = SinkNote {
            updated_at: Some(chrono::Utc::now()),
            ..note.clone()
        };
        self.persist(&next).await?;
        *notes = next;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_note(title: &str, notebook: &str, tags: &[&str]) -> NewSinkNote {
        NewSinkNote {
            title: title.to_string(),
            body: "body".to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            notebook: notebook.to_string(),
            source_url: None,
        }
    }

    #[tokio::test]
    async fn test_find_excludes_tagged_notes() {
        let tmp = TempDir::new().unwrap();
        let store = LocalNotebookStore::open(tmp.path());
        store.init().await.unwrap();

        store.create_note(new_note("a", "RoamImport", &[])).await.unwrap();
        store
            .create_note(new_note("b", "RoamImport", &["RoamImported"]))
            .await
            .unwrap();
        store.create_note(new_note("c", "Other", &[])).await.unwrap();

        let found = store
            .find_notes(&NoteQuery {
                notebook: "RoamImport".to_string(),
                without_tag: Some("RoamImported".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "a");
    }

    #[tokio::test]
    async fn test_update_and_reload() {
        let tmp = TempDir::new().unwrap();
        let store = LocalNotebookStore::open(tmp.path());
        store.init().await.unwrap();

        let id = store.create_note(new_note("a", "Roam", &[])).await.unwrap();
        let mut note = store.get_note(&id).await.unwrap().unwrap();
        note.title = "renamed".to_string();
        store.update_note(&note).await.unwrap();

        let reopened = LocalNotebookStore::open(tmp.path());
        reopened.init().await.unwrap();
        assert_eq!(reopened.get_note(&id).await.unwrap().unwrap().title, "renamed");
    }

    #[tokio::test]
    async fn test_update_missing_note_fails() {
        let tmp = TempDir::new().unwrap();
        let store = LocalNotebookStore::open(tmp.path());
        store.init().await.unwrap();

        let ghost = SinkNote {
            id: "nope".to_string(),
            title: "x".to_string(),
            body: String::new(),
            tags: vec![],
            notebook: "Roam".to_string(),
            source_url: None,
            updated_at: None,
        };
        assert!(store.update_note(&ghost).await.is_err());
    }
}
