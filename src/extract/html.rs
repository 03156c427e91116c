//! Default extractor for WordPress pages with wpDiscuz comment threads
//!
//! Field extraction tries a list of selectors in priority order and takes
//! the first match, falling back to meta tags and finally to the permalink.

use crate::crawler::short_id;
use crate::extract::dates::{parse_site_date, url_date};
use crate::extract::{
    ArticleExtractor, CommentExtractor, ExtractError, ListingExtractor, LoadMoreEndpoint,
};
use crate::model::{derive_article_id, short_hash, Article, ArticleStub, Comment, ImageRef};
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

const COMMENT_SELECTOR: &str = ".wpd-comment, li.comment";

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// Elements whose text never belongs to article or comment prose
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript"];
const SKIPPED_CLASSES: &[&str] = &["sharedaddy", "jp-relatedposts", "comments"];

/// scraper-backed implementation of all three extractor capabilities
#[derive(Debug, Clone)]
pub struct HtmlExtractor {
    base_url: String,
}

fn sel(selector: &str) -> Option<Selector> {
    Selector::parse(selector).ok()
}

fn first<'a>(scope: ElementRef<'a>, selector: &str) -> Option<ElementRef<'a>> {
    let selector = sel(selector)?;
    let found = scope.select(&selector).next();
    found
}

fn first_in_doc<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = sel(selector)?;
    let found = document.select(&selector).next();
    found
}

/// First element matching the earliest selector in `selectors` that matches at all
fn first_by_priority<'a>(document: &'a Html, selectors: &[&str]) -> Option<ElementRef<'a>> {
    selectors.iter().find_map(|s| first_in_doc(document, s))
}

/// Same as [`first_by_priority`], but only keeps matches with non-empty text
fn first_text_by_priority(document: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|s| {
        first_in_doc(document, s)
            .map(element_text)
            .filter(|t| !t.is_empty())
    })
}

/// Unique non-empty texts of every match, in document order
fn collect_unique(scope: ElementRef<'_>, selector: &str) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();
    if let Some(s) = sel(selector) {
        for element in scope.select(&s) {
            let text = element_text(element);
            if !text.is_empty() && !values.contains(&text) {
                values.push(text);
            }
        }
    }
    values
}

fn attr(element: ElementRef<'_>, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: ElementRef<'_>) -> String {
    squash_whitespace(&element.text().collect::<String>())
}

fn is_skipped(element: ElementRef<'_>) -> bool {
    let value = element.value();
    SKIPPED_TAGS.contains(&value.name())
        || value.id() == Some("comments")
        || value.classes().any(|c| SKIPPED_CLASSES.contains(&c))
}

fn collect_prose(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    if !is_skipped(child) {
                        collect_prose(child, out);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Visible prose of an element, excluding scripts and sharing widgets
fn prose_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_prose(element, &mut out);
    squash_whitespace(&out)
}

/// Parses a signed integer out of text such as "+12" or "-3 votes"
fn parse_count(text: &str) -> Option<i64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-')
        .collect();
    cleaned.parse().ok()
}

fn first_number(text: &str) -> Option<u32> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Reads `key: "value"` or `key: 123` out of inline script text
fn script_value(script: &str, key: &str) -> Option<String> {
    let start = script.find(key)? + key.len();
    let rest = script[start..].trim_start_matches(|c: char| c == '"' || c == '\'');
    let rest = rest.trim_start().strip_prefix(':')?.trim_start();

    let value = match rest.chars().next()? {
        quote @ ('"' | '\'') => {
            let body = &rest[1..];
            let end = body.find(quote)?;
            body[..end].to_string()
        }
        _ => rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect(),
    };

    let value = value.replace("\\/", "/");
    (!value.is_empty()).then_some(value)
}

/// Page number from a `comment-page-N` path or `cpage=N` query
fn comment_page_number(href: &str) -> Option<u32> {
    ["comment-page-", "cpage="].iter().find_map(|marker| {
        let start = href.find(marker)? + marker.len();
        first_number(&href[start..]).filter(|_| {
            href[start..]
                .chars()
                .next()
                .map_or(false, |c| c.is_ascii_digit())
        })
    })
}

impl HtmlExtractor {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn base(&self) -> Option<Url> {
        Url::parse(&format!("{}/", self.base_url)).ok()
    }

    /// Resolves `href` against `page_url`, dropping query and fragment
    fn canonical_link(&self, href: &str, page_url: &str) -> Option<Url> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            return None;
        }
        let base = Url::parse(page_url).ok().or_else(|| self.base())?;
        let mut url = base.join(href).ok()?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return None;
        }
        url.set_query(None);
        url.set_fragment(None);
        Some(url)
    }

    fn resolve_asset(&self, src: &str) -> Option<String> {
        let base = self.base()?;
        base.join(src.trim()).ok().map(|u| u.to_string())
    }

    /// Permalinks look like `/YYYY/MM/DD/slug/` or `/YYYY/MM/slug/` on the site host
    fn is_article_url(&self, url: &Url) -> bool {
        if let Some(base) = self.base() {
            if url.host_str() != base.host_str() {
                return false;
            }
        }

        let segments: Vec<&str> = match url.path_segments() {
            Some(s) => s.filter(|p| !p.is_empty()).collect(),
            None => return false,
        };
        let is_num = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());

        match segments.as_slice() {
            [y, m, d, slug] => {
                is_num(y, 4) && is_num(m, 2) && is_num(d, 2) && *slug != "page"
            }
            [y, m, slug] => {
                is_num(y, 4) && is_num(m, 2) && !is_num(slug, 2) && *slug != "page"
            }
            _ => false,
        }
    }

    fn comment_id(&self, element: ElementRef<'_>) -> Option<String> {
        attr(element, "data-comment-id")
            .or_else(|| attr(element, "data-wpd-id"))
            .or_else(|| {
                attr(element, "id").map(|id| {
                    id.strip_prefix("comment-")
                        .map(str::to_string)
                        .unwrap_or_else(|| id.clone())
                })
            })
    }

    /// Parent id from data attributes, then the enclosing comment, then the reply link
    ///
    /// A reply link that points back at the comment itself is ignored.
    fn parent_reference(
        &self,
        element: ElementRef<'_>,
        own_id: &str,
        comment_sel: &Selector,
    ) -> Option<String> {
        let explicit = attr(element, "data-parent-id")
            .or_else(|| attr(element, "data-wpd-parent"))
            .filter(|p| p != "0" && p != "null");
        if explicit.is_some() {
            return explicit;
        }

        let enclosing = element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|ancestor| comment_sel.matches(ancestor))
            .and_then(|ancestor| self.comment_id(ancestor));
        if enclosing.is_some() {
            return enclosing;
        }

        first(element, "a.comment-reply-link, a.wpd-reply-button")
            .and_then(|link| attr(link, "href"))
            .and_then(|href| {
                let start = href.find("replytocom=")? + "replytocom=".len();
                first_number(&href[start..]).map(|n| n.to_string())
            })
            .filter(|target| target.as_str() != own_id && short_id(own_id) != Some(target.as_str()))
    }

    fn nesting_depth(&self, element: ElementRef<'_>) -> u32 {
        if let Some(depth) = attr(element, "data-depth")
            .or_else(|| attr(element, "data-level"))
            .and_then(|d| d.parse::<u32>().ok())
        {
            return depth;
        }

        if let Some(level) = element
            .value()
            .classes()
            .find_map(|c| c.strip_prefix("wpd_comment_level-"))
            .and_then(|l| l.parse::<u32>().ok())
        {
            return level.saturating_sub(1);
        }

        element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .filter(|a| {
                a.value()
                    .classes()
                    .any(|c| matches!(c, "children" | "wpd-comment-replies" | "comment-replies"))
            })
            .count() as u32
    }

    fn votes(&self, element: ElementRef<'_>) -> (i64, i64) {
        let up = first(
            element,
            ".wpd-vote-up .wpd-vote-count, .wpd-up .wpd-vote-count, .vote-up",
        )
        .and_then(|e| parse_count(&element_text(e)))
        .unwrap_or(0);
        let down = first(
            element,
            ".wpd-vote-down .wpd-vote-count, .wpd-down .wpd-vote-count, .vote-down",
        )
        .and_then(|e| parse_count(&element_text(e)))
        .map(i64::abs)
        .unwrap_or(0);

        if up == 0 && down == 0 {
            // Only a net score is shown
            if let Some(score) = first(element, ".wpd-vote-result, .vote-count, .wpd-vote-count")
                .and_then(|e| parse_count(&element_text(e)))
            {
                return if score >= 0 { (score, 0) } else { (0, -score) };
            }
        }
        (up, down)
    }

    fn images(&self, text_element: ElementRef<'_>) -> Vec<ImageRef> {
        let mut seen = HashSet::new();
        let mut images = Vec::new();

        if let Some(img_sel) = sel("img") {
            for img in text_element.select(&img_sel) {
                let src = attr(img, "src").or_else(|| attr(img, "data-src"));
                if let Some(url) = src.and_then(|s| self.resolve_asset(&s)) {
                    if seen.insert(url.clone()) {
                        images.push(ImageRef::new(url));
                    }
                }
            }
        }

        if let Some(link_sel) = sel("a[href]") {
            for link in text_element.select(&link_sel) {
                let Some(href) = attr(link, "href") else {
                    continue;
                };
                let path = href.split(['?', '#']).next().unwrap_or("").to_lowercase();
                if !IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
                    continue;
                }
                if let Some(url) = self.resolve_asset(&href) {
                    if seen.insert(url.clone()) {
                        images.push(ImageRef::new(url));
                    }
                }
            }
        }

        images
    }

    fn parse_comment(
        &self,
        element: ElementRef<'_>,
        article_url: &str,
        comment_sel: &Selector,
    ) -> Comment {
        let text_element = first(
            element,
            ".wpd-comment-text, .wc-comment-text, .comment-content, .wpd-comment-body, .comment-text",
        );
        let (text_html, text_clean) = text_element
            .map(|t| (t.html(), prose_text(t)))
            .unwrap_or_default();

        let id = self.comment_id(element).unwrap_or_else(|| {
            let sample: String = element_text(element).chars().take(100).collect();
            short_hash(&sample)
        });

        let author = first(
            element,
            ".wpd-comment-author, .wc-comment-author, .comment-author, .wpd-comment-author-name, .fn",
        );
        let author_name = author
            .map(element_text)
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| "Anonymous".to_string());
        let author_url = first(element, ".wpd-comment-author a, .comment-author a")
            .and_then(|a| attr(a, "href"));

        let timestamp = first(
            element,
            ".wpd-comment-date, .wc-comment-date, time, .comment-date",
        )
        .and_then(|t| {
            attr(t, "datetime")
                .and_then(|d| parse_site_date(&d))
                .or_else(|| attr(t, "title").and_then(|d| parse_site_date(&d)))
                .or_else(|| parse_site_date(&element_text(t)))
        });

        let (upvotes, downvotes) = self.votes(element);
        let parent_id = self.parent_reference(element, &id, comment_sel);

        Comment {
            id,
            article_url: article_url.to_string(),
            author_name,
            author_url,
            timestamp,
            text_html,
            text_clean,
            upvotes,
            downvotes,
            vote_score: upvotes - downvotes,
            parent_id,
            depth: self.nesting_depth(element),
            images: text_element.map(|t| self.images(t)).unwrap_or_default(),
        }
    }
}

impl ListingExtractor for HtmlExtractor {
    fn extract_stubs(&self, html: &str, page_url: &str) -> Vec<ArticleStub> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut stubs = Vec::new();

        // Post containers carry the date and comment count next to the link
        if let Some(container_sel) = sel("article, .post, .hentry") {
            for container in document.select(&container_sel) {
                let link = first(
                    container,
                    "h2 a, .entry-title a, .post-title a, a[href*='/20']",
                );
                let Some(link) = link else { continue };
                let Some(url) = attr(link, "href").and_then(|h| self.canonical_link(&h, page_url))
                else {
                    continue;
                };
                if !self.is_article_url(&url) || !seen.insert(url.to_string()) {
                    continue;
                }

                let mut stub = ArticleStub::new(url.to_string(), element_text(link));
                stub.date_hint = first(container, "time[datetime]")
                    .and_then(|t| attr(t, "datetime"));
                stub.comment_count_hint = first(container, ".comments-link, .comment-count")
                    .and_then(|c| first_number(&element_text(c)));
                stubs.push(stub);
            }
        }

        if let Some(link_sel) = sel("h2.entry-title a, .post-title a, h2 a") {
            for link in document.select(&link_sel) {
                let Some(url) = attr(link, "href").and_then(|h| self.canonical_link(&h, page_url))
                else {
                    continue;
                };
                if self.is_article_url(&url) && seen.insert(url.to_string()) {
                    stubs.push(ArticleStub::new(url.to_string(), element_text(link)));
                }
            }
        }

        stubs
    }
}

impl ArticleExtractor for HtmlExtractor {
    fn extract_article(&self, html: &str, url: &str) -> Result<Article, ExtractError> {
        let document = Html::parse_document(html);

        let title = first_text_by_priority(
            &document,
            &["h1.entry-title", "h1.post-title", "article h1", ".entry-header h1", "h1"],
        )
        .or_else(|| {
            first_in_doc(&document, "meta[property='og:title']").and_then(|m| attr(m, "content"))
        })
        .ok_or_else(|| ExtractError::MissingField {
            field: "title",
            url: url.to_string(),
        })?;

        let author = first_text_by_priority(
            &document,
            &[
                ".author a",
                ".entry-author a",
                ".post-author a",
                "a[rel='author']",
                ".byline a",
                ".author-name",
            ],
        )
        .or_else(|| first_in_doc(&document, "meta[name='author']").and_then(|m| attr(m, "content")))
        .unwrap_or_else(|| "Unknown".to_string());

        let date_published = first_in_doc(&document, "time[datetime]")
            .and_then(|t| attr(t, "datetime"))
            .and_then(|d| parse_site_date(&d))
            .or_else(|| {
                [
                    "meta[property='article:published_time']",
                    "meta[property='og:published_time']",
                    "meta[name='date']",
                ]
                .iter()
                .find_map(|s| {
                    first_in_doc(&document, s)
                        .and_then(|m| attr(m, "content"))
                        .and_then(|d| parse_site_date(&d))
                })
            })
            .or_else(|| {
                first_in_doc(&document, ".entry-date, .post-date, .published")
                    .and_then(|e| parse_site_date(&element_text(e)))
            })
            .or_else(|| {
                url_date(url)
                    .filter(|d| d.day.is_some())
                    .and_then(|d| d.to_date())
                    .and_then(|d| parse_site_date(&d.to_string()))
            });

        // Taxonomy links are scoped to the post so site navigation stays out
        let post = first_by_priority(&document, &["article", ".post", ".hentry"])
            .unwrap_or_else(|| document.root_element());
        let categories = collect_unique(
            post,
            "a[href*='/category/'], .cat-links a, .entry-categories a, .post-categories a",
        );
        let tags = collect_unique(
            post,
            "a[rel='tag'], .tag-links a, .entry-tags a, .post-tags a, a[href*='/tag/']",
        );

        let content = first_by_priority(
            &document,
            &[
                ".entry-content",
                "article .content",
                ".post-content",
                ".article-content",
                "article",
            ],
        );
        let (content_html, content_text) = content
            .map(|c| (c.html(), prose_text(c)))
            .unwrap_or_default();

        let comment_count = [
            ".comments-link",
            "a[href*='#comments']",
            ".comment-count",
            "#comments h2",
            "#comments h3",
        ]
        .iter()
        .find_map(|s| first_in_doc(&document, s).and_then(|e| first_number(&element_text(e))))
        .unwrap_or(0);

        Ok(Article {
            id: derive_article_id(url),
            url: url.to_string(),
            title,
            author,
            date_published,
            categories,
            tags,
            content_html,
            content_text,
            comment_count,
        })
    }
}

impl CommentExtractor for HtmlExtractor {
    fn extract_comments(&self, html: &str, article_url: &str) -> Vec<Comment> {
        let document = Html::parse_document(html);
        let Some(comment_sel) = sel(COMMENT_SELECTOR) else {
            return Vec::new();
        };

        // Full pages scope to the comment list; fragments have no container
        let container = first_in_doc(
            &document,
            "#comments, .wpdiscuz-comment-list, .wpd-thread-list, .comment-list",
        );
        let elements: Vec<ElementRef<'_>> = match container {
            Some(container) => container.select(&comment_sel).collect(),
            None => document.select(&comment_sel).collect(),
        };

        elements
            .into_iter()
            .map(|element| self.parse_comment(element, article_url, &comment_sel))
            .collect()
    }

    fn comment_page_count(&self, html: &str) -> Option<u32> {
        let document = Html::parse_document(html);
        let link_sel = sel("a[href]")?;
        document
            .select(&link_sel)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(comment_page_number)
            .max()
            .filter(|&pages| pages >= 2)
    }

    fn load_more(&self, html: &str) -> Option<LoadMoreEndpoint> {
        let document = Html::parse_document(html);
        first_in_doc(&document, ".wpd-load-more-submit, .wpdiscuz-loadmore, .wpd-load-more")?;

        let mut endpoint = None;
        let mut post_id = None;
        if let Some(script_sel) = sel("script") {
            for script in document.select(&script_sel) {
                let text: String = script.text().collect();
                if !text.contains("wpdiscuzAjaxObj") {
                    continue;
                }
                endpoint = endpoint.or_else(|| script_value(&text, "ajax_url"));
                post_id = post_id.or_else(|| script_value(&text, "postId"));
            }
        }

        let post_id = post_id
            .or_else(|| {
                first_in_doc(&document, "input[name='postId'], input[name='post_id']")
                    .and_then(|i| attr(i, "value"))
            })
            .filter(|id| id.bytes().all(|b| b.is_ascii_digit()))?;

        let nonce = first_in_doc(&document, "input[name='_wpnonce'], input[id*='wpd-nonce']")
            .and_then(|i| attr(i, "value"));

        Some(LoadMoreEndpoint {
            endpoint: endpoint
                .unwrap_or_else(|| format!("{}/wp-admin/admin-ajax.php", self.base_url)),
            post_id,
            nonce,
        })
    }
}
