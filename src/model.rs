//! Transient typed records exchanged between the crawl engine and its
//! extraction and output collaborators.
//!
//! These values are built by extractors, passed through the crawler and handed
//! to the store for durability. None of them is authoritative once persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// Minimal article reference captured from an archive listing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleStub {
    pub url: String,
    pub title: String,
    /// Date text found next to the link, if any
    pub date_hint: Option<String>,
    pub comment_count_hint: Option<u32>,
}

impl ArticleStub {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            date_hint: None,
            comment_count_hint: None,
        }
    }
}

/// A fully extracted article page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub url: String,
    pub title: String,
    pub author: String,
    pub date_published: Option<DateTime<Utc>>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub content_html: String,
    pub content_text: String,
    pub comment_count: u32,
}

/// One comment as extracted from a page, a comment page or a load-more batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub article_url: String,
    pub author_name: String,
    pub author_url: Option<String>,
    /// `None` when the page carried no parseable date; sorts earliest
    pub timestamp: Option<DateTime<Utc>>,
    pub text_html: String,
    pub text_clean: String,
    pub upvotes: i64,
    pub downvotes: i64,
    pub vote_score: i64,
    pub parent_id: Option<String>,
    pub depth: u32,
    pub images: Vec<ImageRef>,
}

impl Comment {
    /// Creates a root comment with no votes or images
    pub fn new(id: impl Into<String>, article_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            article_url: article_url.into(),
            author_name: "Anonymous".to_string(),
            author_url: None,
            timestamp: None,
            text_html: String::new(),
            text_clean: String::new(),
            upvotes: 0,
            downvotes: 0,
            vote_score: 0,
            parent_id: None,
            depth: 0,
            images: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.text_html = format!("<p>{}</p>", text);
        self.text_clean = text;
        self
    }
}

/// Reference to an image embedded in or linked from a comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub original_url: String,
    #[serde(default)]
    pub local_path: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub downloaded: bool,
}

impl ImageRef {
    pub fn new(original_url: impl Into<String>) -> Self {
        Self {
            original_url: original_url.into(),
            local_path: String::new(),
            filename: String::new(),
            downloaded: false,
        }
    }
}

/// Derives a stable article identifier from its URL
///
/// `/YYYY/MM/DD/slug/` becomes `YYYYMMDD_slug`, `/YYYY/MM/slug/` becomes
/// `YYYYMM_slug`. Anything else, including deeper paths under a permalink,
/// falls back to a short content hash of the URL.
pub fn derive_article_id(url: &str) -> String {
    let segments: Vec<String> = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .map(|s| s.filter(|p| !p.is_empty()).map(str::to_string).collect())
        })
        .unwrap_or_default();

    match segments.as_slice() {
        [y, m, d, slug] if is_digits(y, 4) && is_digits(m, 2) && is_digits(d, 2) => {
            format!("{}{}{}_{}", y, m, d, slug)
        }
        [y, m, slug] if is_digits(y, 4) && is_digits(m, 2) => format!("{}{}_{}", y, m, slug),
        _ => short_hash(url),
    }
}

fn is_digits(segment: &str, len: usize) -> bool {
    segment.len() == len && segment.bytes().all(|b| b.is_ascii_digit())
}

/// First 12 hex characters of the SHA-256 of `input`
pub fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_id_from_dated_url() {
        assert_eq!(
            derive_article_id("https://wattsupwiththat.com/2020/03/14/some-post/"),
            "20200314_some-post"
        );
    }

    #[test]
    fn test_article_id_from_month_url() {
        assert_eq!(
            derive_article_id("https://wattsupwiththat.com/2020/03/some-post/"),
            "202003_some-post"
        );
    }

    #[test]
    fn test_article_id_fallback_is_stable_hash() {
        let a = derive_article_id("https://wattsupwiththat.com/about/");
        let b = derive_article_id("https://wattsupwiththat.com/about/");
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_article_id_rejects_undated_and_nested_paths() {
        let listing = "https://wattsupwiththat.com/category/news/page/2/";
        assert_eq!(derive_article_id(listing), short_hash(listing));

        let post = derive_article_id("https://wattsupwiththat.com/2020/03/14/post/");
        let amp = derive_article_id("https://wattsupwiththat.com/2020/03/14/post/amp/");
        assert_eq!(post, "20200314_post");
        assert_ne!(amp, post);
        assert_eq!(amp.len(), 12);

        let tag = "https://wattsupwiththat.com/tag/co2/x/";
        assert_eq!(derive_article_id(tag), short_hash(tag));
    }

    #[test]
    fn test_comment_builders() {
        let c = Comment::new("9", "https://example.com/a/")
            .with_parent("5")
            .with_text("hello");
        assert_eq!(c.parent_id.as_deref(), Some("5"));
        assert_eq!(c.text_clean, "hello");
        assert_eq!(c.depth, 0);
    }
}
