use tracing::{debug, error, info, warn};

use crate::cache::CacheStore;
use crate::error::Result;
use crate::extract::{extract, CampaignRecord, SkipReason};
use crate::notion::PageSource;

pub const KEY_PREFIX: &str = "campaign:";
pub const DIAGNOSTIC_KEY: &str = "campaign-sync:diagnostic";
const DIAGNOSTIC_VALUE: &str = "ok";
const REQUIRED_FIELDS: [&str; 2] = ["slug", "destination"];

/// Optional hash fields; each is deleted when the page no longer provides it.
pub const OPTIONAL_FIELDS: [&str; 7] = [
    "description",
    "details",
    "iconEmoji",
    "imageUrl",
    "videoUrl",
    "category",
    "files",
];

pub fn cache_key(slug: &str) -> String {
    format!("{}{}", KEY_PREFIX, slug)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
    Incomplete(SkipReason),
    Malformed(String),
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub fetched: usize,
    pub synced: Vec<String>,
    pub skipped: Vec<(String, Skip)>,
    /// The source has more results than the single bounded query returned.
    pub truncated: bool,
}

#[derive(Debug, Default)]
pub struct VerifyReport {
    pub keys: Vec<String>,
    /// Keys whose hash could not be read or is missing a required field.
    pub incomplete: Vec<String>,
    pub diagnostic_ok: bool,
}

/// Flattens a record into hash fields. Absent optionals produce no field.
pub fn record_fields(rec: &CampaignRecord) -> Result<Vec<(String, String)>> {
    let mut out: Vec<(String, String)> = vec![
        ("slug".into(), rec.slug.clone()),
        ("destination".into(), rec.destination.clone()),
        ("title".into(), rec.title.clone()),
    ];
    let optional = [
        ("description", &rec.description),
        ("details", &rec.details),
        ("iconEmoji", &rec.icon_emoji),
        ("imageUrl", &rec.image_url),
        ("videoUrl", &rec.video_url),
        ("category", &rec.category),
    ];
    for (name, value) in optional {
        if let Some(v) = value {
            out.push((name.to_string(), v.clone()));
        }
    }
    out.push(("pinned".into(), rec.pinned.to_string()));
    out.push(("linkTreeEnabled".into(), rec.link_tree_enabled.to_string()));
    if let Some(files) = &rec.files {
        out.push(("files".into(), serde_json::to_string(files)?));
    }
    out.push(("utm".into(), serde_json::to_string(&rec.utm)?));
    Ok(out)
}

/// Fields of `OPTIONAL_FIELDS` that the record does not provide.
pub fn stale_fields(rec: &CampaignRecord) -> Vec<&'static str> {
    let present = [
        rec.description.is_some(),
        rec.details.is_some(),
        rec.icon_emoji.is_some(),
        rec.image_url.is_some(),
        rec.video_url.is_some(),
        rec.category.is_some(),
        rec.files.is_some(),
    ];
    OPTIONAL_FIELDS
        .iter()
        .zip(present)
        .filter(|(_, p)| !p)
        .map(|(f, _)| *f)
        .collect()
}

/// Owns the page source and the cache for one or more passes.
pub struct Synchronizer<S, C> {
    source: S,
    cache: C,
}

impl<S: PageSource, C: CacheStore> Synchronizer<S, C> {
    pub fn new(source: S, cache: C) -> Self {
        Self { source, cache }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// One pass: query, extract, write. A failed query aborts the pass.
    pub async fn synchronize(&self) -> Result<SyncReport> {
        let result = self.source.query_pages().await?;
        let mut report = SyncReport {
            fetched: result.pages.len() + result.malformed.len(),
            truncated: result.has_more,
            ..Default::default()
        };
        info!(fetched = report.fetched, "fetched campaign pages");
        if report.truncated {
            warn!(
                "source reports more results than a single query returns; \
                 remaining pages are not synced"
            );
        }

        for (id, reason) in result.malformed {
            warn!(page = %id, %reason, "skipping page that failed to decode");
            report.skipped.push((id, Skip::Malformed(reason)));
        }

        for page in &result.pages {
            let rec = match extract(page) {
                Ok(r) => r,
                Err(reason) => {
                    info!(page = %page.id, %reason, "skipping page");
                    report.skipped.push((page.id.clone(), Skip::Incomplete(reason)));
                    continue;
                }
            };
            self.write_record(&rec).await?;
            info!(slug = %rec.slug, "synced campaign");
            report.synced.push(rec.slug);
        }

        info!(
            synced = report.synced.len(),
            skipped = report.skipped.len(),
            "sync pass finished"
        );
        Ok(report)
    }

    pub async fn write_record(&self, rec: &CampaignRecord) -> Result<()> {
        let key = cache_key(&rec.slug);
        for field in stale_fields(rec) {
            // Best-effort cleanup; the write below still proceeds.
            if let Err(e) = self.cache.hdel(&key, &[field]).await {
                debug!(%key, field, error = %e, "stale field delete failed");
            }
        }
        let fields = record_fields(rec)?;
        self.cache.hset(&key, &fields).await
    }

    /// Read-back of synced hashes plus a diagnostic set/get. Errors are logged, never returned.
    pub async fn verify(&self) -> VerifyReport {
        let mut report = VerifyReport::default();
        let pattern = format!("{}*", KEY_PREFIX);
        match self.cache.keys(&pattern).await {
            Ok(keys) => {
                info!(count = keys.len(), "campaign keys in cache");
                report.keys = keys;
            }
            Err(e) => error!(error = %e, "failed to list campaign keys"),
        }

        for key in &report.keys {
            match self.cache.hgetall(key).await {
                Ok(hash) if REQUIRED_FIELDS.iter().all(|f| hash.contains_key(*f)) => {
                    debug!(%key, fields = hash.len(), "read back campaign");
                }
                Ok(_) => {
                    warn!(%key, "campaign hash lacks slug or destination");
                    report.incomplete.push(key.clone());
                }
                Err(e) => {
                    error!(%key, error = %e, "failed to read campaign hash");
                    report.incomplete.push(key.clone());
                }
            }
        }

        match self.cache.set(DIAGNOSTIC_KEY, DIAGNOSTIC_VALUE).await {
            Ok(()) => match self.cache.get(DIAGNOSTIC_KEY).await {
                Ok(v) => {
                    report.diagnostic_ok = v.as_deref() == Some(DIAGNOSTIC_VALUE);
                    info!(value = ?v, ok = report.diagnostic_ok, "diagnostic read-back");
                }
                Err(e) => error!(error = %e, "diagnostic get failed"),
            },
            Err(e) => error!(error = %e, "diagnostic set failed"),
        }
        report
    }

    /// Full run: the pass, then verification regardless of how the pass ended.
    pub async fn run(&self) -> (Result<SyncReport>, VerifyReport) {
        let outcome = self.synchronize().await;
        if let Err(e) = &outcome {
            error!(error = %e, "sync pass failed");
        }
        let verify = self.verify().await;
        (outcome, verify)
    }
}
