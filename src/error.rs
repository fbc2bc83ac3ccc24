//! Error taxonomy for a sync run.
//!
//! Collaborators (stores, HTTP) report `anyhow::Error`; the pipeline files each
//! failure under the stage that produced it so the caller can tell a safe
//! retry-from-scratch (`Config`, `Ingest`, `Merge`) from a failure after a
//! mutating side effect (`SinkWrite`).

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur during a sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Missing or invalid configuration. Raised before the pipeline starts.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Mapping cache could not be parsed. Recovered as an empty cache.
    #[error("Mapping cache unreadable: {0}")]
    CacheLoad(String),

    /// External payload fetch or Sink query failed. No Source mutation happened.
    #[error("Ingest failed: {0:#}")]
    Ingest(anyhow::Error),

    /// Source rejected the merge payload. Cache not advanced.
    #[error("Merge into source failed: {0:#}")]
    Merge(anyhow::Error),

    /// Snapshot could not be exported from Source.
    #[error("Export from source failed: {0:#}")]
    Export(anyhow::Error),

    /// Best-effort forward of the snapshot failed. Recovered and logged.
    #[error("Push failed: {0:#}")]
    Push(anyhow::Error),

    /// Writing back to Sink failed. Cache holds every upsert made before the failure.
    #[error("Write to sink failed: {0:#}")]
    SinkWrite(anyhow::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Discriminant of [`SyncError`], carried by an aborted pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    CacheLoad,
    Ingest,
    Merge,
    Export,
    Push,
    SinkWrite,
    Io,
    Json,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Config(_) => ErrorKind::Config,
            SyncError::CacheLoad(_) => ErrorKind::CacheLoad,
            SyncError::Ingest(_) => ErrorKind::Ingest,
            SyncError::Merge(_) => ErrorKind::Merge,
            SyncError::Export(_) => ErrorKind::Export,
            SyncError::Push(_) => ErrorKind::Push,
            SyncError::SinkWrite(_) => ErrorKind::SinkWrite,
            SyncError::Io(_) => ErrorKind::Io,
            SyncError::Json(_) => ErrorKind::Json,
        }
    }

    /// Whether the run can simply be started again.
    ///
    /// Every failure is retryable in practice because mapping checkpoints turn
    /// repeated creates into updates; configuration errors are the exception.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SyncError::Config(_))
    }
}
