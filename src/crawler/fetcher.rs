//! Rate-limited HTTP fetcher
//!
//! Every request the harvester makes goes through one `RateLimitedFetcher`:
//! - a global minimum interval between requests (see [`RateGate`])
//! - user agent rotation every N requests
//! - exponential backoff retries for transient failures
//! - adaptive widening of the interval on HTTP 429
//! - size-capped streaming downloads for images
//!
//! # Outcome classification
//!
//! | Condition | Action |
//! |-----------|--------|
//! | HTTP 2xx | Success |
//! | HTTP 404 | Immediate → NotFound, never retried |
//! | HTTP 429 | Widen interval, retry with backoff |
//! | Other status | Retry with backoff |
//! | Network error / timeout | Retry with backoff |

use crate::config::FetchConfig;
use crate::crawler::backoff::RetryBackoff;
use crate::crawler::throttle::RateGate;
use reqwest::header::USER_AGENT;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const FALLBACK_AGENT: &str = "Mozilla/5.0 (compatible; archivist)";

/// Result of a single request attempt
#[derive(Debug)]
pub enum Attempt {
    Success(String),
    TerminalNotFound,
    Retryable(String),
}

/// Final result of a fetch after retries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success(String),
    /// The server answered 404
    NotFound,
    /// Retries exhausted; carries the last error
    Failed(String),
}

impl FetchOutcome {
    pub fn into_body(self) -> Option<String> {
        match self {
            Self::Success(body) => Some(body),
            _ => None,
        }
    }
}

/// Final result of a streaming download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved { bytes: u64 },
    /// Rejected before anything was kept on disk
    TooLarge { size: u64 },
    NotFound,
    Failed(String),
}

/// Round-robin user agent selection, advancing every `every` requests
#[derive(Debug, Clone)]
pub struct AgentRotation {
    agents: Vec<String>,
    every: u64,
}

impl AgentRotation {
    pub fn new(agents: Vec<String>, every: u32) -> Self {
        Self {
            agents,
            every: u64::from(every.max(1)),
        }
    }

    /// Agent used for the request with zero-based index `request_index`
    pub fn agent_for(&self, request_index: u64) -> &str {
        if self.agents.is_empty() {
            return FALLBACK_AGENT;
        }
        let idx = (request_index / self.every) % self.agents.len() as u64;
        self.agents
            .get(idx as usize)
            .map(String::as_str)
            .unwrap_or(FALLBACK_AGENT)
    }
}

/// Response classification shared by text fetches and downloads
enum Sent {
    Ok(Response),
    NotFound,
    Retry(String),
}

/// HTTP client enforcing the global request interval and retry policy
pub struct RateLimitedFetcher {
    client: Client,
    gate: RateGate,
    backoff: RetryBackoff,
    max_retries: u32,
    rate_limit_ceiling: Duration,
    agents: AgentRotation,
    requests: AtomicU64,
}

/// Builds the underlying HTTP client
///
/// The user agent is set per request by the rotation, not on the client.
pub fn build_http_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(config.timeout())
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

impl RateLimitedFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            gate: RateGate::new(config.request_delay()),
            backoff: RetryBackoff::new(config.request_delay(), config.retry_jitter()),
            max_retries: config.max_retries.max(1),
            rate_limit_ceiling: config.rate_limit_ceiling(),
            agents: AgentRotation::new(config.user_agents.clone(), config.rotate_agent_every),
            requests: AtomicU64::new(0),
        })
    }

    /// GET `url` and return its body
    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        self.request_text(url, |agent| {
            self.client.get(url).header(USER_AGENT, agent)
        })
        .await
    }

    /// POST a form to `url` as an XHR and return the response body
    pub async fn post_form(&self, url: &str, form: &[(&str, String)]) -> FetchOutcome {
        self.request_text(url, |agent| {
            self.client
                .post(url)
                .header(USER_AGENT, agent)
                .header("X-Requested-With", "XMLHttpRequest")
                .form(form)
        })
        .await
    }

    /// Streams `url` into `dest`, refusing bodies larger than `max_bytes`
    ///
    /// The body is written to a sibling `.part` file and renamed into place
    /// only once complete, so an aborted download never leaves `dest` behind.
    pub async fn download(&self, url: &str, dest: &Path, max_bytes: u64) -> DownloadOutcome {
        let mut last_error = String::new();

        for attempt in 0..self.max_retries {
            let request = self.client.get(url).header(USER_AGENT, self.next_agent());
            self.gate.wait().await;
            let result = match self.send_once(request).await {
                Sent::Ok(response) => write_capped(response, dest, max_bytes).await,
                Sent::NotFound => Ok(DownloadOutcome::NotFound),
                Sent::Retry(error) => Err(error),
            };
            self.gate.mark_complete().await;

            match result {
                Ok(outcome) => return outcome,
                Err(error) => {
                    warn!(
                        "Download {} failed (attempt {}/{}): {}",
                        url,
                        attempt + 1,
                        self.max_retries,
                        error
                    );
                    last_error = error;
                }
            }

            if attempt + 1 < self.max_retries {
                tokio::time::sleep(self.backoff.delay(attempt)).await;
            }
        }

        DownloadOutcome::Failed(last_error)
    }

    /// Current enforced interval between requests
    pub async fn current_delay(&self) -> Duration {
        self.gate.interval().await
    }

    /// Total requests issued so far
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    fn next_agent(&self) -> &str {
        let index = self.requests.fetch_add(1, Ordering::Relaxed);
        self.agents.agent_for(index)
    }

    async fn request_text<F>(&self, url: &str, build: F) -> FetchOutcome
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let mut last_error = String::new();

        for attempt in 0..self.max_retries {
            let request = build(self.next_agent());
            match self.attempt_text(request).await {
                Attempt::Success(body) => {
                    debug!("Fetched {} ({} bytes)", url, body.len());
                    return FetchOutcome::Success(body);
                }
                Attempt::TerminalNotFound => {
                    debug!("Not found: {}", url);
                    return FetchOutcome::NotFound;
                }
                Attempt::Retryable(error) => {
                    warn!(
                        "Request {} failed (attempt {}/{}): {}",
                        url,
                        attempt + 1,
                        self.max_retries,
                        error
                    );
                    last_error = error;
                }
            }

            if attempt + 1 < self.max_retries {
                tokio::time::sleep(self.backoff.delay(attempt)).await;
            }
        }

        FetchOutcome::Failed(last_error)
    }

    async fn attempt_text(&self, request: RequestBuilder) -> Attempt {
        self.gate.wait().await;
        let attempt = match self.send_once(request).await {
            Sent::Ok(response) => match response.text().await {
                Ok(body) => Attempt::Success(body),
                Err(e) => Attempt::Retryable(e.to_string()),
            },
            Sent::NotFound => Attempt::TerminalNotFound,
            Sent::Retry(error) => Attempt::Retryable(error),
        };
        self.gate.mark_complete().await;
        attempt
    }

    async fn send_once(&self, request: RequestBuilder) -> Sent {
        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    Sent::Ok(response)
                } else if status == StatusCode::NOT_FOUND {
                    Sent::NotFound
                } else if status == StatusCode::TOO_MANY_REQUESTS {
                    let widened = self.gate.widen(self.rate_limit_ceiling).await;
                    warn!("Rate limited (429); request interval now {:?}", widened);
                    Sent::Retry(format!("HTTP {}", status.as_u16()))
                } else {
                    Sent::Retry(format!("HTTP {}", status.as_u16()))
                }
            }
            Err(e) => Sent::Retry(e.to_string()),
        }
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Writes a response body to `dest` unless it exceeds `max_bytes`
///
/// `Err` carries a retryable error text.
async fn write_capped(
    mut response: Response,
    dest: &Path,
    max_bytes: u64,
) -> Result<DownloadOutcome, String> {
    if let Some(length) = response.content_length() {
        if length > max_bytes {
            warn!(
                "Refusing {}: Content-Length {} exceeds {} bytes",
                response.url(),
                length,
                max_bytes
            );
            return Ok(DownloadOutcome::TooLarge { size: length });
        }
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }

    let partial = partial_path(dest);
    let mut file = tokio::fs::File::create(&partial)
        .await
        .map_err(|e| e.to_string())?;
    let mut written: u64 = 0;

    loop {
        let chunk = match response.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e.to_string());
            }
        };

        written += chunk.len() as u64;
        if written > max_bytes {
            drop(file);
            let _ = tokio::fs::remove_file(&partial).await;
            warn!("Aborted download over {} bytes: {}", max_bytes, dest.display());
            return Ok(DownloadOutcome::TooLarge { size: written });
        }

        if let Err(e) = file.write_all(&chunk).await {
            drop(file);
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.to_string());
        }
    }

    file.flush().await.map_err(|e| e.to_string())?;
    drop(file);
    tokio::fs::rename(&partial, dest)
        .await
        .map_err(|e| e.to_string())?;

    Ok(DownloadOutcome::Saved { bytes: written })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agents() -> Vec<String> {
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    }

    #[test]
    fn test_agent_rotates_every_n_requests() {
        let rotation = AgentRotation::new(agents(), 2);
        let picked: Vec<&str> = (0..8).map(|i| rotation.agent_for(i)).collect();
        assert_eq!(picked, vec!["a", "a", "b", "b", "c", "c", "a", "a"]);
    }

    #[test]
    fn test_empty_agent_pool_falls_back() {
        let rotation = AgentRotation::new(Vec::new(), 10);
        assert_eq!(rotation.agent_for(3), FALLBACK_AGENT);
    }

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/tmp/img/a_1_0.png")),
            PathBuf::from("/tmp/img/a_1_0.png.part")
        );
    }

    #[test]
    fn test_fetch_outcome_body() {
        assert_eq!(
            FetchOutcome::Success("x".to_string()).into_body(),
            Some("x".to_string())
        );
        assert_eq!(FetchOutcome::NotFound.into_body(), None);
    }
}
