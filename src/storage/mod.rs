//! Storage module: the durable progress ledger
//!
//! This module owns the persisted form of every entity the harvester tracks:
//! - Articles and their acquisition status
//! - Archive months and their discovery status
//! - Merged comment sets per article
//! - Comment images and their download state
//! - Crawl sessions

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{CrawlStore, StorageError, StorageResult};

use crate::state::{ArchiveStatus, ArticleStatus, SessionStatus, YearMonth};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Store handle shared between the crawl components
///
/// Access goes through [`with_store`], which keeps the lock scoped to a
/// synchronous closure so it can never be held across an `.await`.
pub type SharedStore = Arc<Mutex<SqliteStore>>;

/// Opens (or creates) the ledger at `path` and wraps it for sharing
pub fn open_store(path: &Path) -> StorageResult<SharedStore> {
    Ok(Arc::new(Mutex::new(SqliteStore::new(path)?)))
}

/// Runs `f` against the locked store
pub fn with_store<T>(
    store: &SharedStore,
    f: impl FnOnce(&mut SqliteStore) -> StorageResult<T>,
) -> StorageResult<T> {
    let mut guard = store.lock().map_err(|_| StorageError::Poisoned)?;
    f(&mut guard)
}

/// Represents an article row in the database
#[derive(Debug, Clone)]
pub struct ArticleRecord {
    pub url: String,
    pub article_id: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub date_published: Option<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub comment_count: u32,
    pub status: ArticleStatus,
    pub discovered_at: String,
    pub scraped_at: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: u32,
}

/// Represents an image row in the database
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub original_url: String,
    pub local_path: Option<String>,
    pub filename: Option<String>,
    pub article_url: Option<String>,
    pub comment_id: Option<String>,
    pub downloaded: bool,
    pub download_error: Option<String>,
}

/// Represents an archive month row in the database
#[derive(Debug, Clone)]
pub struct ArchiveMonthRecord {
    pub month: YearMonth,
    pub status: ArchiveStatus,
    pub article_count: u64,
    pub completed_at: Option<String>,
}

/// Represents a crawl session
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: i64,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub articles_scraped: u64,
    pub comments_scraped: u64,
    pub status: SessionStatus,
}

/// Aggregate ledger statistics
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Article count per status string
    pub articles_by_status: BTreeMap<String, u64>,
    pub total_articles: u64,
    pub total_comments: u64,
    pub total_images: u64,
    pub downloaded_images: u64,
    /// Archive month count per status string
    pub months_by_status: BTreeMap<String, u64>,
    pub sessions: u64,
}

impl StoreStats {
    pub fn articles_with_status(&self, status: ArticleStatus) -> u64 {
        self.articles_by_status
            .get(status.to_db_string())
            .copied()
            .unwrap_or(0)
    }
}
