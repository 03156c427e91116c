//! Crawler module: the resumable crawl engine
//!
//! This module contains the core crawling logic, including:
//! - Rate-limited HTTP fetching with retry and backoff
//! - Month-by-month archive discovery
//! - Article and comment acquisition
//! - Comment tree reconstruction
//! - Overall crawl orchestration and session bookkeeping

mod article;
mod backoff;
mod comments;
mod discovery;
mod fetcher;
mod orchestrator;
mod thread;
mod throttle;

pub use article::{ArticleAcquirer, ArticleOutcome, PageLoad};
pub use backoff::RetryBackoff;
pub use comments::CommentAcquirer;
pub use discovery::{ArchiveDiscoverer, DiscoveryReport, MonthOutcome};
pub use fetcher::{
    build_http_client, AgentRotation, Attempt, DownloadOutcome, FetchOutcome, RateLimitedFetcher,
};
pub use orchestrator::{CrawlOrchestrator, RunMode, RunSummary, SessionGuard};
pub use thread::{merge, merge_with_report, short_id, threaded_order, MergeReport, ThreadEntry};
pub use throttle::RateGate;
