use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};

/// Hash/string operations the synchronizer needs from the cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()>;
    async fn hdel(&self, key: &str, fields: &[&str]) -> Result<u64>;
    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>>;
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
}

// --- Redis over REST ---

#[derive(Deserialize)]
struct RestReply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Redis client speaking the REST protocol: each command is a JSON array POSTed to the base URL.
pub struct RestCache {
    http: reqwest::Client,
    url: Url,
    token: String,
}

impl RestCache {
    pub fn new(cfg: &SyncConfig) -> Result<Self> {
        let http = reqwest::Client::builder().user_agent("campaign-sync/0.1").build()?;
        Ok(Self { http, url: cfg.cache_url.clone(), token: cfg.cache_token.clone() })
    }

    async fn command(&self, args: Vec<String>) -> Result<Value> {
        let name = args.first().cloned().unwrap_or_default();
        let resp = self
            .http
            .post(self.url.clone())
            .bearer_auth(&self.token)
            .json(&args)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        // Errors usually come back as {"error": "..."} with a 4xx status.
        let reply: RestReply = match serde_json::from_str(&text) {
            Ok(r) => r,
            Err(_) if !status.is_success() => {
                let message = format!("status {}: {}", status.as_u16(), text);
                return Err(SyncError::Cache { command: name, message });
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(message) = reply.error {
            return Err(SyncError::Cache { command: name, message });
        }
        if !status.is_success() {
            let message = format!("status {}", status.as_u16());
            return Err(SyncError::Cache { command: name, message });
        }
        Ok(reply.result)
    }
}

fn as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl CacheStore for RestCache {
    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut args = vec!["HSET".to_string(), key.to_string()];
        for (f, v) in fields {
            args.push(f.clone());
            args.push(v.clone());
        }
        self.command(args).await?;
        Ok(())
    }

    async fn hdel(&self, key: &str, fields: &[&str]) -> Result<u64> {
        let mut args = vec!["HDEL".to_string(), key.to_string()];
        args.extend(fields.iter().map(|f| f.to_string()));
        Ok(self.command(args).await?.as_u64().unwrap_or(0))
    }

    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>> {
        let result = self.command(vec!["HGETALL".into(), key.into()]).await?;
        let mut out = BTreeMap::new();
        match result {
            // flat [field, value, field, value, ...]
            Value::Array(items) => {
                for pair in items.chunks(2) {
                    if let [f, v] = pair {
                        if let (Some(f), Some(v)) = (as_string(f), as_string(v)) {
                            out.insert(f, v);
                        }
                    }
                }
            }
            Value::Object(map) => {
                for (f, v) in map {
                    if let Some(v) = as_string(&v) {
                        out.insert(f, v);
                    }
                }
            }
            _ => {}
        }
        Ok(out)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let result = self.command(vec!["KEYS".into(), pattern.into()]).await?;
        Ok(match result {
            Value::Array(items) => items.iter().filter_map(as_string).collect(),
            _ => Vec::new(),
        })
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.command(vec!["SET".into(), key.into(), value.into()]).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let result = self.command(vec!["GET".into(), key.into()]).await?;
        Ok(as_string(&result))
    }
}

// --- In-memory ---

#[derive(Debug, Clone)]
enum Entry {
    Hash(BTreeMap<String, String>),
    Str(String),
}

/// Process-local cache used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryCache {
    inner: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut guard)
    }
}

fn wrong_type(command: &str) -> SyncError {
    SyncError::Cache {
        command: command.to_string(),
        message: "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
    }
}

/// Redis glob subset: `*` and `?`.
fn glob_match(pattern: &str, s: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = s.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        self.with(|m| {
            let entry = m.entry(key.to_string()).or_insert_with(|| Entry::Hash(BTreeMap::new()));
            match entry {
                Entry::Hash(h) => {
                    for (f, v) in fields {
                        h.insert(f.clone(), v.clone());
                    }
                    Ok(())
                }
                Entry::Str(_) => Err(wrong_type("HSET")),
            }
        })
    }

    async fn hdel(&self, key: &str, fields: &[&str]) -> Result<u64> {
        self.with(|m| {
            let removed = match m.get_mut(key) {
                Some(Entry::Hash(h)) => {
                    fields.iter().filter(|f| h.remove(**f).is_some()).count() as u64
                }
                Some(Entry::Str(_)) => return Err(wrong_type("HDEL")),
                None => 0,
            };
            if matches!(m.get(key), Some(Entry::Hash(h)) if h.is_empty()) {
                m.remove(key);
            }
            Ok(removed)
        })
    }

    async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>> {
        self.with(|m| match m.get(key) {
            Some(Entry::Hash(h)) => Ok(h.clone()),
            Some(Entry::Str(_)) => Err(wrong_type("HGETALL")),
            None => Ok(BTreeMap::new()),
        })
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> =
            self.with(|m| m.keys().filter(|k| glob_match(pattern, k)).cloned().collect());
        keys.sort();
        Ok(keys)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with(|m| {
            m.insert(key.to_string(), Entry::Str(value.to_string()));
        });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.with(|m| match m.get(key) {
            Some(Entry::Str(s)) => Ok(Some(s.clone())),
            Some(Entry::Hash(_)) => Err(wrong_type("GET")),
            None => Ok(None),
        })
    }
}
