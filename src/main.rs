mod cli;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use campaign_sync::prelude::*;
use cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("campaign_sync=info")),
        )
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = SyncConfig::load(&cli.env_file).context("loading configuration")?;
    let source = NotionClient::new(&cfg).context("building notion client")?;

    let report = if cli.dry_run {
        info!("dry run: writing to in-memory cache");
        pass(Synchronizer::new(source, MemoryCache::new())).await?
    } else {
        let cache = RestCache::new(&cfg).context("building cache client")?;
        pass(Synchronizer::new(source, cache)).await?
    };

    info!(
        fetched = report.fetched,
        synced = report.synced.len(),
        skipped = report.skipped.len(),
        "done"
    );
    Ok(())
}

async fn pass<S: PageSource, C: CacheStore>(sync: Synchronizer<S, C>) -> Result<SyncReport> {
    let (outcome, verify) = sync.run().await;
    if !verify.diagnostic_ok {
        error!("diagnostic read-back did not return the written value");
    }
    outcome.context("sync pass failed")
}
