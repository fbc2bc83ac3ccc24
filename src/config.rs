//! Run configuration.
//!
//! Values come from the command line (with `NOTEBRIDGE_*` environment
//! fallbacks), optionally layered over a TOML file. Command line wins; built-in
//! defaults fill whatever neither sets.
//!
//! ```toml
//! graph = "my-graph"
//! source_dir = "/data/graph"
//! sink_dir = "/data/notebooks"
//! import_url = "https://example.com/payload.json"
//! remove_archive = false
//! ```

use crate::error::{Result, SyncError};
use crate::mapping::CacheFile;
use crate::sync::{
    SyncOptions, DEFAULT_DEDUP_TAG, DEFAULT_SOURCE_NOTEBOOK, DEFAULT_TARGET_NOTEBOOK,
};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Reconcile notes between a Source note graph and a Sink notebook store.
///
/// Do not run two syncs against the same mapping cache at once: the cache
/// file is not locked.
#[derive(Parser, Debug, Default)]
#[command(name = "notebridge")]
#[command(version)]
pub struct Cli {
    /// TOML config file
    #[arg(long, short = 'c', env = "NOTEBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Graph name
    #[arg(long, short = 'g', env = "NOTEBRIDGE_GRAPH")]
    pub graph: Option<String>,

    /// Directory of the Source graph store
    #[arg(long, env = "NOTEBRIDGE_SOURCE_DIR")]
    pub source_dir: Option<PathBuf>,

    /// Directory of the Sink notebook store
    #[arg(long, env = "NOTEBRIDGE_SINK_DIR")]
    pub sink_dir: Option<PathBuf>,

    /// Endpoint returning extra pages to import (JSON array)
    #[arg(long, env = "NOTEBRIDGE_IMPORT_URL")]
    pub import_url: Option<String>,

    /// Endpoint receiving the exported snapshot
    #[arg(long, env = "NOTEBRIDGE_PUSH_URL")]
    pub push_url: Option<String>,

    /// Mapping cache file [default: ~/.cache/notebridge/<graph>.mapping.json]
    #[arg(long, env = "NOTEBRIDGE_MAPPING_CACHE")]
    pub mapping_cache: Option<PathBuf>,

    /// Export from the live graph file instead of downloading an archive
    #[arg(long)]
    pub no_download: bool,

    /// Keep the downloaded archive after export
    #[arg(long)]
    pub keep_archive: bool,

    /// Sink notebook scanned for notes to import [default: RoamImport]
    #[arg(long)]
    pub source_notebook: Option<String>,

    /// Sink notebook for notes created from Source pages [default: Roam]
    #[arg(long)]
    pub target_notebook: Option<String>,

    /// Tag marking notes already synced [default: RoamImported]
    #[arg(long)]
    pub dedup_tag: Option<String>,

    /// Base URL for links from Sink notes back to Source pages
    #[arg(long)]
    pub page_url_base: Option<String>,

    /// HTTP request timeout in seconds [default: 60]
    #[arg(long)]
    pub http_timeout: Option<u64>,

    /// Debug logging
    #[arg(long, short)]
    pub verbose: bool,
}

/// Contents of a `--config` file
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub graph: Option<String>,
    pub source_dir: Option<PathBuf>,
    pub sink_dir: Option<PathBuf>,
    pub import_url: Option<String>,
    pub push_url: Option<String>,
    pub mapping_cache: Option<PathBuf>,
    pub download: Option<bool>,
    pub remove_archive: Option<bool>,
    pub source_notebook: Option<String>,
    pub target_notebook: Option<String>,
    pub dedup_tag: Option<String>,
    pub page_url_base: Option<String>,
    pub http_timeout: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        toml::from_str(&raw).map_err(|e| {
            SyncError::Config(format!("Invalid config file {}: {}", path.display(), e))
        })
    }
}

/// Validated configuration for one run
#[derive(Debug, Clone)]
pub struct Config {
    pub sync: SyncOptions,
    pub source_dir: PathBuf,
    pub sink_dir: PathBuf,
    pub cache_file: CacheFile,
    pub http_timeout: Duration,
}

impl Config {
    /// Resolve the command line, reading `--config` when given.
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(cli, file)
    }

    /// Layer `cli` over `file` over defaults, then validate.
    pub fn resolve(cli: Cli, file: FileConfig) -> Result<Self> {
        let graph = required(cli.graph.or(file.graph), "graph name (--graph)")?;
        let source_dir = cli
            .source_dir
            .or(file.source_dir)
            .ok_or_else(|| missing("source store directory (--source-dir)"))?;
        let sink_dir = cli
            .sink_dir
            .or(file.sink_dir)
            .ok_or_else(|| missing("sink store directory (--sink-dir)"))?;

        let sync = SyncOptions {
            source_notebook: required(
                Some(
                    cli.source_notebook
                        .or(file.source_notebook)
                        .unwrap_or_else(|| DEFAULT_SOURCE_NOTEBOOK.to_string()),
                ),
                "source notebook",
            )?,
            target_notebook: required(
                Some(
                    cli.target_notebook
                        .or(file.target_notebook)
                        .unwrap_or_else(|| DEFAULT_TARGET_NOTEBOOK.to_string()),
                ),
                "target notebook",
            )?,
            dedup_tag: required(
                Some(
                    cli.dedup_tag
                        .or(file.dedup_tag)
                        .unwrap_or_else(|| DEFAULT_DEDUP_TAG.to_string()),
                ),
                "dedup tag",
            )?,
            import_url: url(cli.import_url.or(file.import_url), "import URL")?,
            push_url: url(cli.push_url.or(file.push_url), "push URL")?,
            download: !cli.no_download && file.download.unwrap_or(true),
            remove_archive: !cli.keep_archive && file.remove_archive.unwrap_or(true),
            page_url_base: url(cli.page_url_base.or(file.page_url_base), "page URL base")?,
            graph,
        };

        let cache_file = match cli.mapping_cache.or(file.mapping_cache) {
            Some(path) => CacheFile::open(path),
            None => CacheFile::default_for_graph(&sync.graph)?,
        };

        let timeout_secs = cli
            .http_timeout
            .or(file.http_timeout)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(SyncError::Config(
                "HTTP timeout must be at least one second".to_string(),
            ));
        }

        Ok(Self {
            sync,
            source_dir,
            sink_dir,
            cache_file,
            http_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn missing(what: &str) -> SyncError {
    SyncError::Config(format!("missing {}", what))
}

fn required(value: Option<String>, what: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(missing(what)),
    }
}

fn url(value: Option<String>, what: &str) -> Result<Option<String>> {
    match value {
        None => Ok(None),
        Some(v) if v.trim().is_empty() => Ok(None),
        Some(v) if v.starts_with("http://") || v.starts_with("https://") => Ok(Some(v)),
        Some(v) => Err(SyncError::Config(format!(
            "{} must be an http(s) URL, got {}",
            what, v
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli() -> Cli {
        Cli {
            graph: Some("notes".to_string()),
            source_dir: Some(PathBuf::from("/tmp/graph")),
            sink_dir: Some(PathBuf::from("/tmp/sink")),
            mapping_cache: Some(PathBuf::from("/tmp/mapping.json")),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(cli(), FileConfig::default()).unwrap();
        assert_eq!(config.sync.source_notebook, "RoamImport");
        assert_eq!(config.sync.target_notebook, "Roam");
        assert_eq!(config.sync.dedup_tag, "RoamImported");
        assert!(config.sync.download);
        assert!(config.sync.remove_archive);
        assert_eq!(config.http_timeout, Duration::from_secs(60));
        assert_eq!(config.cache_file.path(), Path::new("/tmp/mapping.json"));
    }

    #[test]
    fn test_missing_graph_is_config_error() {
        let cli = Cli {
            graph: None,
            ..cli()
        };
        let err = Config::resolve(cli, FileConfig::default()).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
        assert!(err.to_string().contains("graph"));
    }

    #[test]
    fn test_cli_wins_over_file() {
        let file: FileConfig = toml::from_str(
            r#"
            graph = "from-file"
            dedup_tag = "Synced"
            remove_archive = false
            import_url = "https://example.com/in.json"
            "#,
        )
        .unwrap();
        let cli = Cli {
            graph: Some("from-cli".to_string()),
            ..cli()
        };

        let config = Config::resolve(cli, file).unwrap();
        assert_eq!(config.sync.graph, "from-cli");
        assert_eq!(config.sync.dedup_tag, "Synced");
        assert!(!config.sync.remove_archive);
        assert_eq!(
            config.sync.import_url.as_deref(),
            Some("https://example.com/in.json")
        );
    }

    #[test]
    fn test_flags_override_file_booleans() {
        let file = FileConfig {
            download: Some(true),
            ..Default::default()
        };
        let cli = Cli {
            no_download: true,
            keep_archive: true,
            ..cli()
        };
        let config = Config::resolve(cli, file).unwrap();
        assert!(!config.sync.download);
        assert!(!config.sync.remove_archive);
    }

    #[test]
    fn test_rejects_non_http_url() {
        let cli = Cli {
            push_url: Some("ftp://example.com".to_string()),
            ..cli()
        };
        assert!(matches!(
            Config::resolve(cli, FileConfig::default()),
            Err(SyncError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_file_key_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("notebridge.toml");
        std::fs::write(&path, "graph = \"g\"\nbogus = 1\n").unwrap();
        assert!(matches!(FileConfig::load(&path), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "notebridge",
            "--graph",
            "notes",
            "--source-dir",
            "/g",
            "--sink-dir",
            "/s",
            "--no-download",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.graph.as_deref(), Some("notes"));
        assert!(cli.no_download);
        assert!(cli.verbose);
    }
}
