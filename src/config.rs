use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use url::Url;

use crate::error::SyncError;

pub const DEFAULT_ENV_FILE: &str = ".env.local";
pub const DEFAULT_NOTION_BASE: &str = "https://api.notion.com/v1";
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";
pub const MAX_PAGE_SIZE: u32 = 100;

const NOTION_API_KEY: &str = "NOTION_API_KEY";
const NOTION_DATABASE_ID: &str = "NOTION_CAMPAIGNS_DATABASE_ID";
const CACHE_URL: &str = "UPSTASH_REDIS_REST_URL";
const CACHE_TOKEN: &str = "UPSTASH_REDIS_REST_TOKEN";

/// Everything a pass needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub notion_api_key: String,
    pub notion_database_id: String,
    pub notion_base_url: String,
    pub notion_version: String,
    pub page_size: u32,
    pub cache_url: Url,
    pub cache_token: String,
}

impl SyncConfig {
    /// Read the env file (if present), then resolve against the process environment.
    /// Process variables take precedence over the file, matching dotenv semantics.
    pub fn load(env_file: &Path) -> Result<Self> {
        let file_vars = read_env_file(env_file)?;
        let cfg = Self::from_sources(&file_vars, |k| std::env::var(k).ok())?;
        Ok(cfg)
    }

    pub fn from_sources<F>(file_vars: &HashMap<String, String>, env: F) -> Result<Self, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| -> Option<String> {
            env(name)
                .or_else(|| file_vars.get(name).cloned())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |name: &'static str| lookup(name).ok_or(SyncError::MissingConfig(name));

        let notion_api_key = required(NOTION_API_KEY)?;
        let notion_database_id = required(NOTION_DATABASE_ID)?;
        let raw_cache_url = required(CACHE_URL)?;
        let cache_token = required(CACHE_TOKEN)?;

        let cache_url = Url::parse(&raw_cache_url).map_err(|e| SyncError::InvalidConfig {
            name: CACHE_URL,
            reason: e.to_string(),
        })?;

        let page_size = match lookup("CAMPAIGN_SYNC_PAGE_SIZE") {
            Some(s) => s.parse::<u32>().map_err(|e| SyncError::InvalidConfig {
                name: "CAMPAIGN_SYNC_PAGE_SIZE",
                reason: e.to_string(),
            })?,
            None => MAX_PAGE_SIZE,
        }
        .clamp(1, MAX_PAGE_SIZE);

        Ok(Self {
            notion_api_key,
            notion_database_id,
            notion_base_url: lookup("NOTION_API_BASE")
                .unwrap_or_else(|| DEFAULT_NOTION_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            notion_version: lookup("NOTION_VERSION")
                .unwrap_or_else(|| DEFAULT_NOTION_VERSION.to_string()),
            page_size,
            cache_url,
            cache_token,
        })
    }
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        tracing::debug!(path = %path.display(), "env file not found; using process env only");
        return Ok(vars);
    }
    let iter = dotenvy::from_path_iter(path)
        .with_context(|| format!("failed to open env file: {}", path.display()))?;
    for item in iter {
        let (k, v) =
            item.with_context(|| format!("failed to parse env file: {}", path.display()))?;
        vars.insert(k, v);
    }
    Ok(vars)
}
