use chrono::NaiveDate;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Archivist
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// The site being harvested and the date range to cover
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Site root, without a trailing slash (default `https://wattsupwiththat.com`)
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// First day of the harvest range, inclusive (default 2017-01-20)
    #[serde(rename = "start-date", default = "default_start_date")]
    pub start_date: NaiveDate,

    /// Last day of the harvest range, inclusive; absent means today
    #[serde(rename = "end-date", default)]
    pub end_date: Option<NaiveDate>,
}

/// Rate limiting and retry behavior of the fetcher
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Minimum time between two requests (milliseconds, default 2000)
    #[serde(rename = "request-delay-ms", default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Attempts per request before giving up (default 5)
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Whole-request timeout (seconds, default 30)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Upper bound of the random jitter added to retry backoff (milliseconds, default 1000)
    #[serde(rename = "retry-jitter-ms", default = "default_retry_jitter_ms")]
    pub retry_jitter_ms: u64,

    /// Cap for the request interval after repeated HTTP 429s (milliseconds, default 30000)
    #[serde(rename = "rate-limit-ceiling-ms", default = "default_rate_limit_ceiling_ms")]
    pub rate_limit_ceiling_ms: u64,

    /// Rotate the user agent every N requests (default 10)
    #[serde(rename = "rotate-agent-every", default = "default_rotate_agent_every")]
    pub rotate_agent_every: u32,

    /// User agent pool; defaults to a fixed set of desktop browsers
    #[serde(rename = "user-agents", default = "default_user_agents")]
    pub user_agents: Vec<String>,
}

/// Crawl loop behavior
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Pending articles pulled from the store per batch (default 100)
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: u32,

    /// Failed articles are retried while their retry count is below this (default 3)
    #[serde(rename = "max-article-retries", default = "default_max_article_retries")]
    pub max_article_retries: u32,

    /// Maximum incremental "load more" requests per article (default 50)
    #[serde(
        rename = "max-comment-load-attempts",
        default = "default_max_comment_load_attempts"
    )]
    pub max_comment_load_attempts: u32,

    /// Safety cap on listing pages walked per archive month (default 50)
    #[serde(rename = "max-archive-pages", default = "default_max_archive_pages")]
    pub max_archive_pages: u32,

    /// Download images referenced by comments (default true)
    #[serde(rename = "download-images", default = "default_true")]
    pub download_images: bool,

    /// Images larger than this are rejected before writing (megabytes, default 10)
    #[serde(rename = "max-image-size-mb", default = "default_max_image_size_mb")]
    pub max_image_size_mb: u64,
}

/// Output locations
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite progress ledger
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: PathBuf,

    /// Directory receiving one JSON document per article
    #[serde(rename = "corpus-dir", default = "default_corpus_dir")]
    pub corpus_dir: PathBuf,

    /// Directory receiving downloaded comment images
    #[serde(rename = "images-dir", default = "default_images_dir")]
    pub images_dir: PathBuf,
}

impl FetchConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_jitter(&self) -> Duration {
        Duration::from_millis(self.retry_jitter_ms)
    }

    pub fn rate_limit_ceiling(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ceiling_ms)
    }
}

impl CrawlConfig {
    /// Image size cap in bytes
    pub fn max_image_bytes(&self) -> u64 {
        self.max_image_size_mb.saturating_mul(1024 * 1024)
    }
}

impl SiteConfig {
    /// End of the harvest range, resolving an open end to today
    pub fn effective_end_date(&self) -> NaiveDate {
        self.end_date
            .unwrap_or_else(|| chrono::Utc::now().date_naive())
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            start_date: default_start_date(),
            end_date: None,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: default_request_delay_ms(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            retry_jitter_ms: default_retry_jitter_ms(),
            rate_limit_ceiling_ms: default_rate_limit_ceiling_ms(),
            rotate_agent_every: default_rotate_agent_every(),
            user_agents: default_user_agents(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_article_retries: default_max_article_retries(),
            max_comment_load_attempts: default_max_comment_load_attempts(),
            max_archive_pages: default_max_archive_pages(),
            download_images: true,
            max_image_size_mb: default_max_image_size_mb(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            corpus_dir: default_corpus_dir(),
            images_dir: default_images_dir(),
        }
    }
}

fn default_base_url() -> String {
    "https://wattsupwiththat.com".to_string()
}

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2017, 1, 20).unwrap_or_default()
}

fn default_request_delay_ms() -> u64 {
    2000
}

fn default_max_retries() -> u32 {
    5
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_jitter_ms() -> u64 {
    1000
}

fn default_rate_limit_ceiling_ms() -> u64 {
    30_000
}

fn default_rotate_agent_every() -> u32 {
    10
}

fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_batch_size() -> u32 {
    100
}

fn default_max_article_retries() -> u32 {
    3
}

fn default_max_comment_load_attempts() -> u32 {
    50
}

fn default_max_archive_pages() -> u32 {
    50
}

fn default_true() -> bool {
    true
}

fn default_max_image_size_mb() -> u64 {
    10
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./output/scraper_progress.db")
}

fn default_corpus_dir() -> PathBuf {
    PathBuf::from("./output/corpus")
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("./output/images")
}
