//! Timeout-guarded page fetching
//!
//! One reqwest client shared across the fan-out. Every request carries the
//! crawler user agent and is bounded by the configured timeouts; a hung
//! origin times out without stalling the rest of the run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use scraper::Html;
use thiserror::Error;
use url::Url;

use crate::config::ExtractionConfig;

/// Errors that can occur during fetching
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected status {0}")]
    BadStatus(u16),
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),
    #[error("Content too large: {0} bytes")]
    ContentTooLarge(usize),
    #[error("Failed to parse URL: {0}")]
    InvalidUrl(String),
}

/// Result of a successful page fetch
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Final URL after redirects; this is what gets recorded as a candidate
    pub final_url: Url,
    pub status_code: u16,
    pub body: String,
    pub content_type: String,
    pub fetch_duration: Duration,
}

impl FetchResult {
    pub fn is_html(&self) -> bool {
        self.content_type.contains("text/html") || self.content_type.contains("application/xhtml")
    }
}

/// Counters kept across a run
#[derive(Debug, Default)]
pub struct FetchStats {
    pub attempts: AtomicU64,
    pub successes: AtomicU64,
    pub failures: AtomicU64,
}

/// HTTP fetch engine shared by discovery and deterministic extraction
pub struct FetchEngine {
    client: reqwest::Client,
    max_content_size: usize,
    stats: FetchStats,
}

impl FetchEngine {
    pub fn new(config: &ExtractionConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.clone())
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            max_content_size: config.max_content_size,
            stats: FetchStats::default(),
        })
    }

    /// Fetch an HTML page. Non-HTML responses are rejected so binary
    /// documents never reach the parsers.
    pub async fn fetch_page(&self, url: &Url) -> Result<FetchResult, FetchError> {
        let result = self
            .fetch_inner(url, &["text/html", "application/xhtml", "text/plain"])
            .await;
        self.record(&result);
        result
    }

    /// Fetch a script bundle for the SPA-rendering fallback
    pub async fn fetch_script(&self, url: &Url) -> Result<FetchResult, FetchError> {
        let result = self
            .fetch_inner(
                url,
                &["javascript", "ecmascript", "text/plain", "application/octet-stream"],
            )
            .await;
        self.record(&result);
        result
    }

    async fn fetch_inner(
        &self,
        url: &Url,
        allowed_types: &[&str],
    ) -> Result<FetchResult, FetchError> {
        let start = Instant::now();

        let response = self.client.get(url.as_str()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::BadStatus(status.as_u16()));
        }

        let final_url = Url::parse(response.url().as_str())
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();

        if !allowed_types.iter().any(|t| content_type.contains(t)) {
            return Err(FetchError::InvalidContentType(content_type));
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.max_content_size {
                return Err(FetchError::ContentTooLarge(len as usize));
            }
        }

        let body = response.text().await?;
        if body.len() > self.max_content_size {
            return Err(FetchError::ContentTooLarge(body.len()));
        }

        Ok(FetchResult {
            final_url,
            status_code: status.as_u16(),
            body,
            content_type,
            fetch_duration: start.elapsed(),
        })
    }

    fn record(&self, result: &Result<FetchResult, FetchError>) {
        self.stats.attempts.fetch_add(1, Ordering::Relaxed);
        match result {
            Ok(_) => self.stats.successes.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.stats.failures.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.stats.attempts.load(Ordering::Relaxed),
            self.stats.successes.load(Ordering::Relaxed),
            self.stats.failures.load(Ordering::Relaxed),
        )
    }
}

/// Extract readable text from HTML, skipping script and style content.
/// Used for prompt excerpts, thin-page detection and raw_text persistence.
pub fn extract_page_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();

    for node in document.root_element().descendants() {
        if let Some(text) = node.value().as_text() {
            let in_script = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .map(|e| matches!(e.name(), "script" | "style" | "noscript"))
                    .unwrap_or(false)
            });
            if in_script {
                continue;
            }
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(trimmed);
            }
        }
    }

    out
}
