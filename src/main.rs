use clap::Parser;
use colored::Colorize;
use notebridge::store::{HttpFetch, LocalGraphStore, LocalNotebookStore};
use notebridge::{Cli, Config, Pipeline, Result, RunReport, SyncError};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "notebridge=debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(report) => {
            println!("{} Sync complete", "✓".green().bold());
            println!("{}", report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            if e.is_retryable() {
                eprintln!("  Safe to run again: linked notes are updated, not duplicated.");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<RunReport> {
    let config = Config::from_cli(cli)?;

    let source = LocalGraphStore::open(&config.source_dir, &config.sync.graph, config.sync.download)
        .await
        .map_err(SyncError::Ingest)?;
    let sink = LocalNotebookStore::open(&config.sink_dir);
    let fetch = HttpFetch::new(config.http_timeout)
        .map_err(|e| SyncError::Config(format!("Cannot build HTTP client: {:#}", e)))?;

    let mut pipeline = Pipeline::new(
        Arc::new(source),
        Arc::new(sink),
        Arc::new(fetch),
        config.cache_file,
        config.sync,
    );
    pipeline.run().await
}
