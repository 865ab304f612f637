//! Command-line entry point for api-harvest.

use api_harvest::progress::spawn_progress_logger;
use api_harvest::{Config, FailureFileMode, FetchMode, Harvester, ResourceKind, run_with_shutdown};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Harvest a chain of REST resources into CSV files
#[derive(Parser, Debug)]
#[command(name = "api-harvest", version)]
struct Args {
    /// JSON configuration file (missing fields take their defaults)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// File holding the API token
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// Directory with the `<kind>.url` identifier lists
    #[arg(long)]
    url_dir: Option<PathBuf>,

    /// Directory receiving the CSV files
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Base URL the relation templates are joined to
    #[arg(long)]
    api_base: Option<String>,

    /// Resource kinds to harvest, comma separated, in chain order
    #[arg(long, value_delimiter = ',')]
    resources: Option<Vec<ResourceKind>>,

    /// Issue requests one at a time
    #[arg(long)]
    sequential: bool,

    /// Upper bound on requests in flight
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Write one failure list per resource kind instead of a shared one
    #[arg(long)]
    per_resource_failures: bool,
}

impl Args {
    fn into_config(self) -> api_harvest::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(token_file) = self.token_file {
            config.token_file = token_file;
        }
        if let Some(url_dir) = self.url_dir {
            config.url_dir = url_dir;
        }
        if let Some(output_dir) = self.output_dir {
            config.output_dir = output_dir;
        }
        if let Some(api_base) = self.api_base {
            config.api_base = api_base;
        }
        if let Some(resources) = self.resources {
            config.resources = resources;
        }
        if self.sequential {
            config.fetch.mode = FetchMode::Sequential;
        }
        if self.max_concurrent.is_some() {
            config.fetch.max_concurrent = self.max_concurrent;
        }
        if self.per_resource_failures {
            config.failures = FailureFileMode::PerResource;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let result = match Args::parse().into_config() {
        Ok(config) => harvest(config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "harvest failed");
            ExitCode::FAILURE
        }
    }
}

async fn harvest(config: Config) -> api_harvest::Result<()> {
    let api_base = config.api_base.clone();
    let harvester = Harvester::new(config)?;
    let logger = spawn_progress_logger(harvester.subscribe(), api_base);

    let result = run_with_shutdown(&harvester).await;

    // Closing the channel stops the logger if the run ended early
    drop(harvester);
    logger.await.ok();

    let summary = result?;
    info!(
        failed = summary.attempted() - summary.succeeded(),
        "harvest complete"
    );
    Ok(())
}
