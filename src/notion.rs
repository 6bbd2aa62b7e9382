use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};

// --- Page model ---

#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    pub id: String,
    #[serde(default)]
    pub icon: Option<Icon>,
    #[serde(default)]
    pub cover: Option<FileRef>,
    #[serde(default)]
    pub properties: HashMap<String, PropertyValue>,
}

impl Page {
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Icon {
    Emoji { emoji: String },
    #[serde(other)]
    Other,
}

/// Typed property value. Property types the synchronizer never reads collapse into `Unsupported`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyValue {
    Url {
        #[serde(default)]
        url: Option<String>,
    },
    RichText {
        #[serde(default)]
        rich_text: Vec<TextRun>,
    },
    Title {
        #[serde(default)]
        title: Vec<TextRun>,
    },
    Checkbox {
        #[serde(default)]
        checkbox: bool,
    },
    Select {
        #[serde(default)]
        select: Option<SelectOption>,
    },
    Files {
        #[serde(default)]
        files: Vec<FileRef>,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextRun {
    #[serde(default)]
    pub plain_text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectOption {
    #[serde(default)]
    pub name: String,
}

/// A file reference, either hosted by Notion (signed URL with expiry) or an external link.
/// Other file types (e.g. `file_upload`) decode as `Unsupported` and carry no URL.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileRef {
    File {
        #[serde(default)]
        name: Option<String>,
        file: HostedFile,
    },
    External {
        #[serde(default)]
        name: Option<String>,
        external: ExternalFile,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostedFile {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub expiry_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExternalFile {
    #[serde(default)]
    pub url: String,
}

impl FileRef {
    pub fn name(&self) -> Option<&str> {
        match self {
            FileRef::File { name, .. } | FileRef::External { name, .. } => name.as_deref(),
            FileRef::Unsupported => None,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            FileRef::File { file, .. } => &file.url,
            FileRef::External { external, .. } => &external.url,
            FileRef::Unsupported => "",
        }
    }

    pub fn expiry(&self) -> Option<&str> {
        match self {
            FileRef::File { file, .. } => file.expiry_time.as_deref(),
            FileRef::External { .. } | FileRef::Unsupported => None,
        }
    }
}

// --- Query ---

/// One query result. Pages that failed to decode are kept as raw ids in `malformed`.
#[derive(Debug, Default)]
pub struct QueryResult {
    pub pages: Vec<Page>,
    pub malformed: Vec<(String, String)>,
    pub has_more: bool,
}

#[derive(Deserialize)]
struct RawQueryResponse {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    has_more: bool,
}

impl QueryResult {
    fn from_raw(raw: RawQueryResponse) -> Self {
        let mut out = QueryResult { has_more: raw.has_more, ..Default::default() };
        for item in raw.results {
            let id = item.get("id").and_then(Value::as_str).unwrap_or("<unknown>").to_string();
            match serde_json::from_value::<Page>(item) {
                Ok(p) => out.pages.push(p),
                Err(e) => out.malformed.push((id, e.to_string())),
            }
        }
        out
    }
}

/// Where pages come from.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn query_pages(&self) -> Result<QueryResult>;
}

pub struct NotionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    version: String,
    database_id: String,
    page_size: u32,
}

impl NotionClient {
    pub fn new(cfg: &SyncConfig) -> Result<Self> {
        let http = reqwest::Client::builder().user_agent("campaign-sync/0.1").build()?;
        Ok(Self {
            http,
            base_url: cfg.notion_base_url.clone(),
            api_key: cfg.notion_api_key.clone(),
            version: cfg.notion_version.clone(),
            database_id: cfg.notion_database_id.clone(),
            page_size: cfg.page_size,
        })
    }

    fn query_url(&self) -> String {
        format!("{}/databases/{}/query", self.base_url, self.database_id)
    }
}

#[async_trait]
impl PageSource for NotionClient {
    /// Single bounded query; `next_cursor` is never followed.
    async fn query_pages(&self) -> Result<QueryResult> {
        let resp = self
            .http
            .post(self.query_url())
            .bearer_auth(&self.api_key)
            .header("Notion-Version", &self.version)
            .json(&json!({ "page_size": self.page_size }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Upstream { status: status.as_u16(), body });
        }
        let raw: RawQueryResponse = resp.json().await?;
        Ok(QueryResult::from_raw(raw))
    }
}
