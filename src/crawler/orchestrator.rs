//! Crawl orchestration
//!
//! Drives the discover, scrape and comments-only phases over the shared
//! ledger. Each run opens a session that is closed exactly once, whether the
//! run completes, fails, is cancelled or its future is dropped.
//!
//! Work is processed one unit at a time (an archive month, an article). The
//! cancellation token is checked between units, never mid-fetch, and no
//! store lock is held across a network call.

use crate::config::{Config, CrawlConfig};
use crate::crawler::article::{ArticleAcquirer, ArticleOutcome, PageLoad};
use crate::crawler::comments::CommentAcquirer;
use crate::crawler::discovery::{ArchiveDiscoverer, DiscoveryReport};
use crate::crawler::fetcher::{DownloadOutcome, RateLimitedFetcher};
use crate::crawler::thread::merge_with_report;
use crate::extract::Extractors;
use crate::model::{Article, Comment};
use crate::output::{image_filename, ArticleSink, HttpImageFetcher, ImageFetcher};
use crate::storage::{with_store, CrawlStore, SharedStore, StorageResult};
use crate::HarvestError;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Which phases a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Discovery followed by scraping
    #[default]
    Full,
    DiscoverOnly,
    ScrapeOnly,
    /// Re-acquire comments for already-scraped articles
    CommentsOnly,
}

impl RunMode {
    fn discovers(&self) -> bool {
        matches!(self, Self::Full | Self::DiscoverOnly)
    }

    fn scrapes(&self) -> bool {
        matches!(self, Self::Full | Self::ScrapeOnly)
    }
}

/// Counts accumulated over one run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub session_id: i64,
    pub discovery: Option<DiscoveryReport>,
    /// Articles processed this run, successful or not
    pub articles_processed: u64,
    pub articles_scraped: u64,
    pub articles_unavailable: u64,
    pub articles_failed: u64,
    pub comments_scraped: u64,
    pub comments_demoted: u64,
    pub images_downloaded: u64,
    pub cancelled: bool,
}

/// Closes a crawl session exactly once
///
/// [`close`](Self::close) records the final counts; if the guard is dropped
/// first (error path, panic unwind, dropped future) `Drop` closes it with
/// whatever counts were recorded so far.
pub struct SessionGuard {
    store: SharedStore,
    session_id: i64,
    articles: u64,
    comments: u64,
    closed: bool,
}

impl SessionGuard {
    /// Starts a new session in the ledger
    pub fn open(store: SharedStore) -> StorageResult<Self> {
        let session_id = with_store(&store, |s| s.start_session())?;
        tracing::info!("Started crawl session {}", session_id);
        Ok(Self {
            store,
            session_id,
            articles: 0,
            comments: 0,
            closed: false,
        })
    }

    pub fn id(&self) -> i64 {
        self.session_id
    }

    pub fn record(&mut self, articles: u64, comments: u64) {
        self.articles += articles;
        self.comments += comments;
    }

    /// Closes the session; later calls are no-ops returning `false`
    pub fn close(&mut self) -> StorageResult<bool> {
        if self.closed {
            return Ok(false);
        }
        self.closed = true;
        let (articles, comments) = (self.articles, self.comments);
        let closed = with_store(&self.store, |s| {
            s.end_session(self.session_id, articles, comments)
        })?;
        tracing::info!(
            "Closed crawl session {} ({} articles, {} comments)",
            self.session_id,
            articles,
            comments
        );
        Ok(closed)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!("Failed to close crawl session {}: {}", self.session_id, e);
        }
    }
}

/// Drives discovery and scraping over one ledger
pub struct CrawlOrchestrator {
    store: SharedStore,
    fetcher: Arc<RateLimitedFetcher>,
    discoverer: ArchiveDiscoverer,
    articles: ArticleAcquirer,
    comments: CommentAcquirer,
    sink: Arc<dyn ArticleSink>,
    images: Option<Arc<dyn ImageFetcher>>,
    crawl: CrawlConfig,
    images_dir: PathBuf,
    cancel: CancellationToken,
    limit: Option<usize>,
}

impl CrawlOrchestrator {
    /// Wires the crawl components from `config` around one shared fetcher
    ///
    /// Images are fetched through that fetcher when `download-images` is on.
    pub fn new(
        config: &Config,
        store: SharedStore,
        extractors: Extractors,
        sink: Arc<dyn ArticleSink>,
    ) -> Result<Self, HarvestError> {
        let fetcher = Arc::new(RateLimitedFetcher::new(&config.fetch)?);

        let discoverer = ArchiveDiscoverer::new(
            fetcher.clone(),
            store.clone(),
            extractors.listing.clone(),
            &config.site.base_url,
            config.site.start_date,
            config.site.effective_end_date(),
            config.crawl.max_archive_pages,
        );
        let articles = ArticleAcquirer::new(fetcher.clone(), store.clone(), extractors.article.clone());
        let comments = CommentAcquirer::new(
            fetcher.clone(),
            extractors.comments.clone(),
            config.crawl.max_comment_load_attempts,
        );
        let images: Option<Arc<dyn ImageFetcher>> = if config.crawl.download_images {
            Some(Arc::new(HttpImageFetcher::new(fetcher.clone())))
        } else {
            None
        };

        Ok(Self {
            store,
            fetcher,
            discoverer,
            articles,
            comments,
            sink,
            images,
            crawl: config.crawl.clone(),
            images_dir: config.output.images_dir.clone(),
            cancel: CancellationToken::new(),
            limit: None,
        })
    }

    /// Stops the run between units of work once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Caps the number of articles processed in one run
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit.filter(|&l| l > 0);
        self
    }

    /// Replaces (or with `None`, disables) the image fetcher
    pub fn with_image_fetcher(mut self, images: Option<Arc<dyn ImageFetcher>>) -> Self {
        self.images = images;
        self
    }

    pub fn fetcher(&self) -> &Arc<RateLimitedFetcher> {
        &self.fetcher
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the phases selected by `mode` inside one session
    pub async fn run(&self, mode: RunMode) -> Result<RunSummary, HarvestError> {
        let mut guard = SessionGuard::open(self.store.clone())?;
        let mut summary = RunSummary {
            session_id: guard.id(),
            ..Default::default()
        };
        let start_time = Instant::now();

        let result = self.run_phases(mode, &mut guard, &mut summary).await;
        let closed = guard.close();

        tracing::info!(
            "Run finished in {:?}: {} scraped, {} unavailable, {} failed, {} comments, {} requests",
            start_time.elapsed(),
            summary.articles_scraped,
            summary.articles_unavailable,
            summary.articles_failed,
            summary.comments_scraped,
            self.fetcher.request_count()
        );

        result?;
        closed?;
        Ok(summary)
    }

    async fn run_phases(
        &self,
        mode: RunMode,
        guard: &mut SessionGuard,
        summary: &mut RunSummary,
    ) -> Result<(), HarvestError> {
        if mode.discovers() {
            tracing::info!("Phase 1: discovering articles from archives");
            let report = self.discoverer.discover_all(&self.cancel).await?;
            summary.cancelled |= report.cancelled;
            summary.discovery = Some(report);
        }

        if mode.scrapes() && !summary.cancelled {
            tracing::info!("Phase 2: scraping articles and comments");
            self.scrape_phase(guard, summary).await?;
        }

        if mode == RunMode::CommentsOnly {
            tracing::info!("Re-acquiring comments for scraped articles");
            self.comments_phase(guard, summary).await?;
        }

        Ok(())
    }

    fn limit_reached(&self, summary: &RunSummary) -> bool {
        self.limit
            .map_or(false, |limit| summary.articles_processed as usize >= limit)
    }

    /// Pending articles in FIFO batches, then one pass over retriable failures
    async fn scrape_phase(
        &self,
        guard: &mut SessionGuard,
        summary: &mut RunSummary,
    ) -> Result<(), HarvestError> {
        let batch_size = self.crawl.batch_size.max(1) as usize;
        let mut seen = HashSet::new();

        'batches: loop {
            let want = match self.limit {
                Some(limit) => batch_size.min(limit.saturating_sub(summary.articles_processed as usize)),
                None => batch_size,
            };
            if want == 0 {
                break;
            }

            let pending = with_store(&self.store, |s| s.pending_articles(want))?;
            let batch: Vec<String> = pending.into_iter().filter(|url| !seen.contains(url)).collect();
            if batch.is_empty() {
                tracing::info!("No more pending articles");
                break;
            }

            for url in batch {
                if self.cancel.is_cancelled() {
                    tracing::info!("Scrape cancelled");
                    summary.cancelled = true;
                    return Ok(());
                }
                seen.insert(url.clone());
                self.scrape_article(&url, guard, summary).await;
                if self.limit_reached(summary) {
                    tracing::info!("Article limit reached");
                    break 'batches;
                }
            }
        }

        if self.limit_reached(summary) {
            return Ok(());
        }

        let failed = with_store(&self.store, |s| {
            s.failed_articles(self.crawl.max_article_retries)
        })?;
        if !failed.is_empty() {
            tracing::info!("Retrying {} failed articles", failed.len());
        }
        for url in failed {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                return Ok(());
            }
            self.scrape_article(&url, guard, summary).await;
            if self.limit_reached(summary) {
                break;
            }
        }

        Ok(())
    }

    /// Acquires one article end to end, recording any failure against it
    async fn scrape_article(&self, url: &str, guard: &mut SessionGuard, summary: &mut RunSummary) {
        let outcome = match self.articles.acquire(url).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Error processing {}: {}", url, e);
                summary.articles_processed += 1;
                summary.articles_failed += 1;
                self.record_failure(url, &e.to_string());
                return;
            }
        };

        match outcome {
            ArticleOutcome::AlreadyScraped => {}
            ArticleOutcome::Unavailable => {
                summary.articles_processed += 1;
                summary.articles_unavailable += 1;
            }
            ArticleOutcome::Failed(_) => {
                summary.articles_processed += 1;
                summary.articles_failed += 1;
            }
            ArticleOutcome::Scraped { article, html } => {
                summary.articles_processed += 1;
                match self.complete_article(&article, &html, summary).await {
                    Ok(comments) => {
                        summary.articles_scraped += 1;
                        summary.comments_scraped += comments as u64;
                        guard.record(1, comments as u64);
                        tracing::info!(
                            "Scraped [{}]: {} ({} comments)",
                            summary.articles_scraped,
                            article.title,
                            comments
                        );
                    }
                    Err(e) => {
                        tracing::error!("Error processing {}: {}", url, e);
                        summary.articles_failed += 1;
                        self.record_failure(url, &e.to_string());
                    }
                }
            }
        }
    }

    fn record_failure(&self, url: &str, error: &str) {
        if let Err(e) = with_store(&self.store, |s| s.mark_failed(url, error)) {
            tracing::error!("Could not record failure for {}: {}", url, e);
        }
    }

    /// Re-acquires and replaces comments of scraped articles, oldest first
    async fn comments_phase(
        &self,
        guard: &mut SessionGuard,
        summary: &mut RunSummary,
    ) -> Result<(), HarvestError> {
        let limit = self.limit.unwrap_or(i64::MAX as usize);
        let scraped = with_store(&self.store, |s| s.scraped_articles(limit))?;
        tracing::info!("Processing comments for {} articles", scraped.len());

        for url in scraped {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            summary.articles_processed += 1;

            let (article, html) = match self.articles.load(&url).await {
                PageLoad::Loaded { article, html } => (article, html),
                PageLoad::NotFound => {
                    tracing::warn!("Scraped article now returns 404, keeping stored comments: {}", url);
                    continue;
                }
                PageLoad::Failed(error) => {
                    tracing::warn!("Could not reload {}: {}", url, error);
                    continue;
                }
            };

            match self.complete_article(&article, &html, summary).await {
                Ok(comments) => {
                    summary.comments_scraped += comments as u64;
                    guard.record(0, comments as u64);
                    tracing::info!("Refreshed {} comments for {}", comments, url);
                }
                Err(e) => tracing::error!("Error refreshing comments for {}: {}", url, e),
            }
        }

        Ok(())
    }

    /// Comments, images, persistence and output for an acquired article
    ///
    /// Returns the number of comments stored.
    async fn complete_article(
        &self,
        article: &Article,
        html: &str,
        summary: &mut RunSummary,
    ) -> Result<usize, HarvestError> {
        let batches = self.comments.acquire(&article.url, Some(html)).await;
        let report = merge_with_report(batches);
        if report.demoted > 0 {
            tracing::warn!(
                "{} comment(s) on {} had unresolvable parents and were demoted to roots",
                report.demoted,
                article.url
            );
            summary.comments_demoted += report.demoted as u64;
        }
        if report.duplicates > 0 {
            tracing::debug!("Dropped {} duplicate comments on {}", report.duplicates, article.url);
        }

        let mut comments = report.comments;
        if let Some(images) = &self.images {
            summary.images_downloaded += self.acquire_images(images.as_ref(), article, &mut comments).await?;
        }

        let stored = with_store(&self.store, |s| s.save_comments(&article.url, &comments))?;
        self.sink.write_article(article, &comments)?;
        Ok(stored)
    }

    /// Registers and downloads comment images, each at most once
    async fn acquire_images(
        &self,
        fetcher: &dyn ImageFetcher,
        article: &Article,
        comments: &mut [Comment],
    ) -> StorageResult<u64> {
        let max_bytes = self.crawl.max_image_bytes();
        let mut downloaded = 0;

        for comment in comments.iter_mut() {
            for (index, image) in comment.images.iter_mut().enumerate() {
                let url = image.original_url.clone();
                with_store(&self.store, |s| s.add_image(&url, &article.url, &comment.id))?;

                if let Some(record) = with_store(&self.store, |s| s.get_image(&url))?
                    .filter(|r| r.downloaded)
                {
                    image.local_path = record.local_path.unwrap_or_default();
                    image.filename = record.filename.unwrap_or_default();
                    image.downloaded = true;
                    continue;
                }

                let filename = image_filename(&article.id, &comment.id, index, &url);
                let dest = self.images_dir.join(&filename);
                match fetcher.fetch_image(&url, &dest, max_bytes).await {
                    DownloadOutcome::Saved { bytes } => {
                        let local_path = dest.to_string_lossy().to_string();
                        if with_store(&self.store, |s| {
                            s.mark_image_downloaded(&url, &local_path, &filename)
                        })? {
                            downloaded += 1;
                        }
                        tracing::debug!("Saved image {} ({} bytes)", filename, bytes);
                        image.local_path = local_path;
                        image.filename = filename;
                        image.downloaded = true;
                    }
                    DownloadOutcome::TooLarge { size } => {
                        let error = format!("too large: {} bytes exceeds {}", size, max_bytes);
                        with_store(&self.store, |s| s.mark_image_error(&url, &error))?;
                    }
                    DownloadOutcome::NotFound => {
                        with_store(&self.store, |s| s.mark_image_error(&url, "HTTP 404"))?;
                    }
                    DownloadOutcome::Failed(error) => {
                        tracing::warn!("Image download failed for {}: {}", url, error);
                        with_store(&self.store, |s| s.mark_image_error(&url, &error))?;
                    }
                }
            }
        }

        Ok(downloaded)
    }
}
