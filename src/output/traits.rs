//! Output collaborator traits
//!
//! The crawl engine hands finished work to two capabilities it does not
//! implement itself: a writer for completed articles and an image fetcher.

use crate::crawler::DownloadOutcome;
use crate::model::{Article, Comment};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Receives one completed article with its merged comments
///
/// Writing the same article twice must replace, not duplicate, its output.
pub trait ArticleSink: Send + Sync {
    fn write_article(&self, article: &Article, comments: &[Comment]) -> OutputResult<PathBuf>;
}

/// Fetches one image to a local destination
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_image(&self, url: &str, dest: &Path, max_bytes: u64) -> DownloadOutcome;
}
