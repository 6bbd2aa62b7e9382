pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod notion;
pub mod sync;

/// Convenience re-exports for embedders.
pub mod prelude {
    pub use crate::cache::{CacheStore, MemoryCache, RestCache};
    pub use crate::config::SyncConfig;
    pub use crate::error::SyncError;
    pub use crate::extract::{extract, CampaignRecord, FileEntry, FileKind, SkipReason};
    pub use crate::notion::{NotionClient, Page, PageSource};
    pub use crate::sync::{SyncReport, Synchronizer, VerifyReport};
}
