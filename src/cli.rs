use std::path::PathBuf;

use clap::Parser;

use campaign_sync::config::DEFAULT_ENV_FILE;

/// Sync campaign pages from Notion into the cache. Runs one pass and exits.
#[derive(Parser)]
#[command(name = "campaign-sync")]
#[command(about = "Synchronize Notion campaign pages into the Redis cache", long_about = None)]
pub struct Cli {
    /// Env file read before the process environment
    #[arg(long, value_name = "PATH", default_value = DEFAULT_ENV_FILE)]
    pub env_file: PathBuf,

    /// Write into an in-memory cache instead of the remote one
    #[arg(long)]
    pub dry_run: bool,
}
