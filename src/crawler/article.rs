//! Single-article acquisition

use crate::crawler::fetcher::{FetchOutcome, RateLimitedFetcher};
use crate::extract::ArticleExtractor;
use crate::model::Article;
use crate::state::ArticleStatus;
use crate::storage::{with_store, CrawlStore, SharedStore, StorageResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to one article
#[derive(Debug)]
pub enum ArticleOutcome {
    /// Already scraped in an earlier run; nothing was fetched
    AlreadyScraped,
    /// Fetched, extracted and recorded; `html` is the full page for comment extraction
    Scraped { article: Article, html: String },
    /// HTTP 404, recorded as terminal
    Unavailable,
    /// Fetch or extraction failed; recorded with an incremented retry count
    Failed(String),
}

/// Result of fetching and extracting without touching recorded status
#[derive(Debug)]
pub enum PageLoad {
    Loaded { article: Article, html: String },
    NotFound,
    Failed(String),
}

/// Fetches article pages and records their outcome in the ledger
pub struct ArticleAcquirer {
    fetcher: Arc<RateLimitedFetcher>,
    store: SharedStore,
    extractor: Arc<dyn ArticleExtractor>,
}

impl ArticleAcquirer {
    pub fn new(
        fetcher: Arc<RateLimitedFetcher>,
        store: SharedStore,
        extractor: Arc<dyn ArticleExtractor>,
    ) -> Self {
        Self {
            fetcher,
            store,
            extractor,
        }
    }

    /// Acquires `url` unless it is already scraped
    ///
    /// Storage errors propagate; fetch and extraction failures are recorded
    /// and reported through the outcome.
    pub async fn acquire(&self, url: &str) -> StorageResult<ArticleOutcome> {
        if with_store(&self.store, |s| s.article_status(url))? == Some(ArticleStatus::Scraped) {
            debug!("Already scraped: {}", url);
            return Ok(ArticleOutcome::AlreadyScraped);
        }

        info!("Scraping article: {}", url);
        match self.load(url).await {
            PageLoad::Loaded { article, html } => {
                with_store(&self.store, |s| s.mark_scraped(&article))?;
                Ok(ArticleOutcome::Scraped { article, html })
            }
            PageLoad::NotFound => {
                warn!("Article not found, marking unavailable: {}", url);
                with_store(&self.store, |s| s.mark_unavailable(url))?;
                Ok(ArticleOutcome::Unavailable)
            }
            PageLoad::Failed(error) => {
                warn!("Article failed: {}: {}", url, error);
                with_store(&self.store, |s| s.mark_failed(url, &error))?;
                Ok(ArticleOutcome::Failed(error))
            }
        }
    }

    /// Fetches and extracts `url` without consulting or updating its status
    pub async fn load(&self, url: &str) -> PageLoad {
        match self.fetcher.fetch(url).await {
            FetchOutcome::Success(html) => match self.extractor.extract_article(&html, url) {
                Ok(article) => PageLoad::Loaded { article, html },
                Err(e) => PageLoad::Failed(e.to_string()),
            },
            FetchOutcome::NotFound => PageLoad::NotFound,
            FetchOutcome::Failed(error) => PageLoad::Failed(error),
        }
    }
}
