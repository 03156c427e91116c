//! Extraction collaborators
//!
//! The crawl engine never inspects markup itself. It asks three extractor
//! capabilities for typed records and is handed an [`Extractors`] bundle at
//! construction time, so the strategy is chosen once by the caller rather
//! than through process-wide state.

mod dates;
mod html;

pub use dates::{parse_site_date, url_date, UrlDate};
pub use html::HtmlExtractor;

use crate::model::{Article, ArticleStub, Comment};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while turning a page into a record
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Missing required field '{field}' on {url}")]
    MissingField { field: &'static str, url: String },

    #[error("Malformed page {url}: {reason}")]
    Malformed { url: String, reason: String },
}

/// Where and how to request incremental "load more" comment batches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadMoreEndpoint {
    pub endpoint: String,
    pub post_id: String,
    /// Anti-forgery token, when the page exposes one
    pub nonce: Option<String>,
}

/// Produces article stubs from an archive listing page
pub trait ListingExtractor: Send + Sync {
    fn extract_stubs(&self, html: &str, page_url: &str) -> Vec<ArticleStub>;
}

/// Produces a full article from its page
pub trait ArticleExtractor: Send + Sync {
    fn extract_article(&self, html: &str, url: &str) -> Result<Article, ExtractError>;
}

/// Produces comments from a page or fragment and reads comment navigation markers
pub trait CommentExtractor: Send + Sync {
    fn extract_comments(&self, html: &str, article_url: &str) -> Vec<Comment>;

    /// Total number of comment pages, when the page is paginated
    fn comment_page_count(&self, html: &str) -> Option<u32>;

    /// Incremental loading parameters, when the page offers more comments
    fn load_more(&self, html: &str) -> Option<LoadMoreEndpoint>;
}

/// The extraction strategy injected into the crawl components
#[derive(Clone)]
pub struct Extractors {
    pub listing: Arc<dyn ListingExtractor>,
    pub article: Arc<dyn ArticleExtractor>,
    pub comments: Arc<dyn CommentExtractor>,
}

impl Extractors {
    /// All three capabilities backed by one [`HtmlExtractor`]
    pub fn html(base_url: &str) -> Self {
        let extractor = Arc::new(HtmlExtractor::new(base_url));
        Self {
            listing: extractor.clone(),
            article: extractor.clone(),
            comments: extractor,
        }
    }
}
