//! Comment acquisition across page, pagination and "load more" batches
//!
//! The acquirer only gathers. Batches are concatenated in fetch order and
//! returned unmerged; overlap between paths is expected and resolved by
//! [`merge`](crate::crawler::thread::merge).

use crate::crawler::fetcher::{FetchOutcome, RateLimitedFetcher};
use crate::extract::{CommentExtractor, LoadMoreEndpoint};
use crate::model::Comment;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

const LOAD_MORE_ACTION: &str = "wpdLoadMoreComments";

/// JSON envelope returned by the incremental comment endpoint
#[derive(Debug, Deserialize)]
struct LoadMoreResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Value,
}

/// One decoded incremental response
#[derive(Debug, PartialEq)]
enum LoadMoreBatch {
    /// Markup plus whether the server says more remain
    Markup { html: String, more: bool },
    /// The server reported failure
    Rejected,
}

fn decode_load_more(body: &str) -> LoadMoreBatch {
    let Ok(response) = serde_json::from_str::<LoadMoreResponse>(body) else {
        // Not JSON: the body is the fragment itself
        return LoadMoreBatch::Markup {
            html: body.to_string(),
            more: true,
        };
    };

    if !response.success {
        return LoadMoreBatch::Rejected;
    }

    match response.data {
        Value::Object(map) => {
            let html = ["message", "comments"]
                .iter()
                .filter_map(|key| map.get(*key).and_then(Value::as_str))
                .find(|s| !s.is_empty())
                .unwrap_or_default()
                .to_string();
            let more = map.get("loadMore").map_or(true, |v| match v {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_i64() != Some(0),
                Value::String(s) => !matches!(s.as_str(), "" | "0" | "false"),
                _ => true,
            });
            LoadMoreBatch::Markup { html, more }
        }
        Value::String(html) => LoadMoreBatch::Markup { html, more: true },
        Value::Null => LoadMoreBatch::Markup {
            html: String::new(),
            more: false,
        },
        other => LoadMoreBatch::Markup {
            html: other.to_string(),
            more: true,
        },
    }
}

/// Primary comment page URL: `{article}/comment-page-N/`
fn comment_page_url(article_url: &str, page: u32) -> String {
    format!("{}/comment-page-{}/", article_url.trim_end_matches('/'), page)
}

/// Fallback comment page URL: `{article}?cpage=N`
fn comment_page_query_url(article_url: &str, page: u32) -> Option<String> {
    let mut url = Url::parse(article_url).ok()?;
    url.set_fragment(None);
    url.query_pairs_mut().append_pair("cpage", &page.to_string());
    Some(url.to_string())
}

/// Gathers every comment batch for one article
pub struct CommentAcquirer {
    fetcher: Arc<RateLimitedFetcher>,
    extractor: Arc<dyn CommentExtractor>,
    max_load_attempts: u32,
}

impl CommentAcquirer {
    pub fn new(
        fetcher: Arc<RateLimitedFetcher>,
        extractor: Arc<dyn CommentExtractor>,
        max_load_attempts: u32,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            max_load_attempts,
        }
    }

    /// Collects the initial, paginated and incremental batches in that order
    ///
    /// `page_html` is reused when the caller already holds the article page;
    /// otherwise it is fetched. An unreachable article page yields no comments.
    pub async fn acquire(&self, article_url: &str, page_html: Option<&str>) -> Vec<Comment> {
        let fetched;
        let html = match page_html {
            Some(html) => html,
            None => match self.fetcher.fetch(article_url).await {
                FetchOutcome::Success(body) => {
                    fetched = body;
                    fetched.as_str()
                }
                FetchOutcome::NotFound => {
                    warn!("Article page gone while fetching comments: {}", article_url);
                    return Vec::new();
                }
                FetchOutcome::Failed(error) => {
                    warn!("Could not fetch {} for comments: {}", article_url, error);
                    return Vec::new();
                }
            },
        };

        let mut comments = self.extractor.extract_comments(html, article_url);
        debug!("{} comments on the article page {}", comments.len(), article_url);

        if let Some(total_pages) = self.extractor.comment_page_count(html) {
            let paged = self.fetch_comment_pages(article_url, total_pages).await;
            comments.extend(paged);
        }

        if let Some(endpoint) = self.extractor.load_more(html) {
            let loaded = self
                .load_more(article_url, &endpoint, comments.len())
                .await;
            comments.extend(loaded);
        }

        info!("Gathered {} comment records for {}", comments.len(), article_url);
        comments
    }

    /// Fetches comment pages `2..=total_pages`
    async fn fetch_comment_pages(&self, article_url: &str, total_pages: u32) -> Vec<Comment> {
        let mut comments = Vec::new();

        for page in 2..=total_pages {
            let primary = comment_page_url(article_url, page);
            let body = match self.fetcher.fetch(&primary).await {
                FetchOutcome::Success(body) => Some(body),
                outcome => {
                    debug!("Comment page {} unavailable ({:?}); trying query form", primary, outcome);
                    match comment_page_query_url(article_url, page) {
                        Some(fallback) => self.fetcher.fetch(&fallback).await.into_body(),
                        None => None,
                    }
                }
            };

            match body {
                Some(body) => {
                    let batch = self.extractor.extract_comments(&body, article_url);
                    debug!("Comment page {}/{}: {} comments", page, total_pages, batch.len());
                    comments.extend(batch);
                }
                None => warn!(
                    "Skipping comment page {} of {} for {}",
                    page, total_pages, article_url
                ),
            }
        }

        comments
    }

    /// Issues bounded incremental requests starting at `offset`
    async fn load_more(
        &self,
        article_url: &str,
        endpoint: &LoadMoreEndpoint,
        mut offset: usize,
    ) -> Vec<Comment> {
        let mut comments = Vec::new();

        for attempt in 0..self.max_load_attempts {
            let mut form = vec![
                ("action", LOAD_MORE_ACTION.to_string()),
                ("postId", endpoint.post_id.clone()),
                ("offset", offset.to_string()),
                ("ordering", "desc".to_string()),
                ("lastParentId", "0".to_string()),
                ("isFirstLoad", "0".to_string()),
            ];
            if let Some(nonce) = &endpoint.nonce {
                form.push(("_wpnonce", nonce.clone()));
            }

            let body = match self.fetcher.post_form(&endpoint.endpoint, &form).await {
                FetchOutcome::Success(body) => body,
                outcome => {
                    warn!("Load-more request for {} stopped: {:?}", article_url, outcome);
                    break;
                }
            };

            let (html, more) = match decode_load_more(&body) {
                LoadMoreBatch::Markup { html, more } => (html, more),
                LoadMoreBatch::Rejected => {
                    debug!("Load-more rejected for {}", article_url);
                    break;
                }
            };

            let batch = if html.trim().is_empty() {
                Vec::new()
            } else {
                self.extractor.extract_comments(&html, article_url)
            };
            if batch.is_empty() {
                break;
            }

            offset += batch.len();
            debug!(
                "Load-more batch {} for {}: {} comments (offset {})",
                attempt + 1,
                article_url,
                batch.len(),
                offset
            );
            comments.extend(batch);

            if !more {
                break;
            }
        }

        if !comments.is_empty() {
            info!("Loaded {} additional comments for {}", comments.len(), article_url);
        }
        comments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_page_urls() {
        let url = "https://e.com/2020/03/14/post/";
        assert_eq!(
            comment_page_url(url, 2),
            "https://e.com/2020/03/14/post/comment-page-2/"
        );
        assert_eq!(
            comment_page_query_url(url, 3).unwrap(),
            "https://e.com/2020/03/14/post/?cpage=3"
        );
    }

    #[test]
    fn test_decode_structured_payload() {
        let body = r#"{"success":true,"data":{"message":"<div class=\"wpd-comment\"></div>","loadMore":false}}"#;
        assert_eq!(
            decode_load_more(body),
            LoadMoreBatch::Markup {
                html: "<div class=\"wpd-comment\"></div>".to_string(),
                more: false
            }
        );
    }

    #[test]
    fn test_decode_comments_key_and_string_data() {
        let body = r#"{"success":true,"data":{"comments":"<li></li>"}}"#;
        assert_eq!(
            decode_load_more(body),
            LoadMoreBatch::Markup {
                html: "<li></li>".to_string(),
                more: true
            }
        );

        let body = r#"{"success":true,"data":"<li></li>"}"#;
        assert!(matches!(decode_load_more(body), LoadMoreBatch::Markup { more: true, .. }));
    }

    #[test]
    fn test_decode_failure_and_raw_markup() {
        assert_eq!(
            decode_load_more(r#"{"success":false,"data":null}"#),
            LoadMoreBatch::Rejected
        );
        assert_eq!(
            decode_load_more("<div class=\"wpd-comment\">x</div>"),
            LoadMoreBatch::Markup {
                html: "<div class=\"wpd-comment\">x</div>".to_string(),
                more: true
            }
        );
    }

    #[test]
    fn test_decode_numeric_load_more_flag() {
        let body = r#"{"success":true,"data":{"message":"<li></li>","loadMore":0}}"#;
        assert!(matches!(decode_load_more(body), LoadMoreBatch::Markup { more: false, .. }));
    }
}
