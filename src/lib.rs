//! notebridge: batch reconciliation of notes between a Source note graph and
//! a Sink notebook store.
//!
//! One run pulls pages from an external endpoint and eligible notes from the
//! Sink, merges them into the Source without breaking backlinks, exports the
//! Source, pushes the export onward and mirrors every page back into the Sink.
//! A persistent [`mapping::MappingCache`] keeps Source and Sink ids linked 1:1
//! across runs, and a dedup tag on Sink notes keeps them from being imported
//! twice.
//!
//! Runs are expected to be sequential: two runs sharing one mapping cache file
//! race on it and the last writer wins.

pub mod config;
pub mod error;
pub mod mapping;
pub mod model;
pub mod store;
pub mod sync;

pub use config::{Cli, Config};
pub use error::{ErrorKind, Result, SyncError};
pub use mapping::{CacheFile, MappingCache};
pub use sync::{Pipeline, RunReport, Stage, SyncOptions};
