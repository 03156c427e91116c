//! Storage traits and error types
//!
//! `CrawlStore` is the progress ledger interface the crawler drives. Every
//! mutating method is one atomic transaction: it either commits in full or
//! leaves prior state untouched and returns the error.

use crate::model::{Article, ArticleStub, Comment};
use crate::state::{ArticleStatus, YearMonth};
use crate::storage::{ArchiveMonthRecord, ArticleRecord, ImageRecord, SessionRecord, StoreStats};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Article not found: {0}")]
    ArticleNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(i64),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Invalid stored value in {column}: {value}")]
    InvalidValue { column: &'static str, value: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for progress ledger implementations
pub trait CrawlStore {
    // ===== Articles =====

    /// Inserts stubs as `pending`, ignoring URLs already known
    ///
    /// Returns the number of rows actually added.
    fn add_article_stubs(&mut self, stubs: &[ArticleStub]) -> StorageResult<usize>;

    fn get_article(&self, url: &str) -> StorageResult<Option<ArticleRecord>>;

    fn article_status(&self, url: &str) -> StorageResult<Option<ArticleStatus>>;

    /// Stores extracted metadata, sets `scraped` and clears the last error
    fn mark_scraped(&mut self, article: &Article) -> StorageResult<()>;

    /// Sets `failed`, records the message and increments the retry count
    fn mark_failed(&mut self, url: &str, error: &str) -> StorageResult<()>;

    /// Sets the terminal `unavailable` status
    fn mark_unavailable(&mut self, url: &str) -> StorageResult<()>;

    /// Pending article URLs, oldest discovery first
    fn pending_articles(&self, limit: usize) -> StorageResult<Vec<String>>;

    /// Failed article URLs with `retry_count < max_retries`, oldest discovery first
    fn failed_articles(&self, max_retries: u32) -> StorageResult<Vec<String>>;

    /// Scraped article URLs, oldest scrape first
    fn scraped_articles(&self, limit: usize) -> StorageResult<Vec<String>>;

    // ===== Archive months =====

    /// Registers a month as `pending` unless already known
    fn add_archive_month(&mut self, month: YearMonth) -> StorageResult<()>;

    fn mark_archive_month_complete(
        &mut self,
        month: YearMonth,
        article_count: usize,
    ) -> StorageResult<()>;

    fn is_archive_month_complete(&self, month: YearMonth) -> StorageResult<bool>;

    fn get_archive_month(&self, month: YearMonth) -> StorageResult<Option<ArchiveMonthRecord>>;

    fn pending_archive_months(&self) -> StorageResult<Vec<YearMonth>>;

    // ===== Comments =====

    /// Replaces the stored comment set of one article
    fn save_comments(&mut self, article_url: &str, comments: &[Comment]) -> StorageResult<usize>;

    /// Stored comments of one article in canonical order
    fn comments_for_article(&self, article_url: &str) -> StorageResult<Vec<Comment>>;

    // ===== Images =====

    /// Registers an image reference, ignoring URLs already known
    fn add_image(
        &mut self,
        original_url: &str,
        article_url: &str,
        comment_id: &str,
    ) -> StorageResult<()>;

    /// Flags an image as downloaded
    ///
    /// Returns false if it was already flagged; the flag never moves twice.
    fn mark_image_downloaded(
        &mut self,
        original_url: &str,
        local_path: &str,
        filename: &str,
    ) -> StorageResult<bool>;

    fn mark_image_error(&mut self, original_url: &str, error: &str) -> StorageResult<()>;

    fn get_image(&self, original_url: &str) -> StorageResult<Option<ImageRecord>>;

    // ===== Sessions =====

    fn start_session(&mut self) -> StorageResult<i64>;

    /// Closes a running session with its final counts
    ///
    /// Returns false if the session was already closed.
    fn end_session(
        &mut self,
        session_id: i64,
        articles_scraped: u64,
        comments_scraped: u64,
    ) -> StorageResult<bool>;

    fn get_session(&self, session_id: i64) -> StorageResult<SessionRecord>;

    fn latest_session(&self) -> StorageResult<Option<SessionRecord>>;

    // ===== Statistics =====

    /// Aggregate counts, grouped at query time
    fn stats(&self) -> StorageResult<StoreStats>;
}
