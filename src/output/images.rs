//! Comment image downloads

use crate::crawler::{DownloadOutcome, RateLimitedFetcher};
use crate::output::traits::ImageFetcher;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

const KNOWN_EXTENSIONS: &[&str] = &["jpeg", "jpg", "png", "gif", "webp", "svg"];

/// Downloads through the shared rate-limited fetcher
pub struct HttpImageFetcher {
    fetcher: Arc<RateLimitedFetcher>,
}

impl HttpImageFetcher {
    pub fn new(fetcher: Arc<RateLimitedFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch_image(&self, url: &str, dest: &Path, max_bytes: u64) -> DownloadOutcome {
        self.fetcher.download(url, dest, max_bytes).await
    }
}

/// File extension for an image URL, `jpg` when none is recognised
pub fn image_extension(url: &str) -> &'static str {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_else(|_| url.to_ascii_lowercase());
    KNOWN_EXTENSIONS
        .iter()
        .find(|ext| path.ends_with(&format!(".{}", ext)))
        .or_else(|| {
            KNOWN_EXTENSIONS
                .iter()
                .find(|ext| path.contains(&format!(".{}", ext)))
        })
        .copied()
        .unwrap_or("jpg")
}

/// Local file name `{article_id}_{comment_id}_{index}.{ext}`
pub fn image_filename(article_id: &str, comment_id: &str, index: usize, url: &str) -> String {
    let safe_comment: String = comment_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!(
        "{}_{}_{}.{}",
        article_id,
        safe_comment,
        index,
        image_extension(url)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_detection() {
        assert_eq!(image_extension("https://e.com/a/photo.PNG"), "png");
        assert_eq!(image_extension("https://e.com/a/photo.jpeg?w=300"), "jpeg");
        assert_eq!(image_extension("https://i.e.com/a.gif.html"), "gif");
        assert_eq!(image_extension("https://e.com/render?id=7"), "jpg");
    }

    #[test]
    fn test_filename_layout() {
        assert_eq!(
            image_filename("20200314_post", "wpd-comm-9_5", 0, "https://e.com/x.png"),
            "20200314_post_wpd-comm-9_5_0.png"
        );
        assert_eq!(
            image_filename("a", "we/ird", 2, "https://e.com/x"),
            "a_we_ird_2.jpg"
        );
    }
}
