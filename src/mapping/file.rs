// Mapping cache persistence
//
// Stores the serialized MappingCache for one graph. Default location is
// ~/.cache/notebridge/<graph>.mapping.json (honours XDG_CACHE_HOME).
//
// Concurrent runs against the same file are not supported: nothing here takes
// a lock, and the last writer wins.

use crate::error::{Result, SyncError};
use crate::mapping::MappingCache;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// On-disk home of a mapping cache
#[derive(Debug, Clone)]
pub struct CacheFile {
    path: PathBuf,
}

impl CacheFile {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get cache directory (~/.cache/notebridge/)
    fn cache_dir() -> Result<PathBuf> {
        let cache_dir = if let Ok(xdg_cache) = std::env::var("XDG_CACHE_HOME") {
            PathBuf::from(xdg_cache)
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home).join(".cache")
        } else if let Some(dir) = dirs::cache_dir() {
            dir
        } else {
            return Err(SyncError::Config(
                "Cannot determine cache directory (HOME not set)".to_string(),
            ));
        };

        Ok(cache_dir.join("notebridge"))
    }

    /// Default cache file for a graph
    pub fn default_for_graph(graph: &str) -> Result<Self> {
        let file_name: String = graph
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        Ok(Self::open(
            Self::cache_dir()?.join(format!("{}.mapping.json", file_name)),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw file content, `None` when the file does not exist or cannot be read
    pub fn read_raw(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Some(raw),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Cannot read mapping cache {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Load the cache. Never fails; see [`MappingCache::load`].
    pub fn load(&self) -> MappingCache {
        debug!("Loading mapping cache from {}", self.path.display());
        MappingCache::load(self.read_raw().as_deref())
    }

    /// Save the cache (atomic write)
    pub fn save(&self, cache: &MappingCache) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_file = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&temp_file)?;
            file.write_all(cache.serialize().as_bytes())?;
            file.sync_all()?;
        }

        // Atomic rename
        fs::rename(&temp_file, &self.path)?;

        debug!(
            "Saved {} mapping entries to {}",
            cache.len(),
            self.path.display()
        );
        Ok(())
    }
}
