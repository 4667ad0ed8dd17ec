//! Course intelligence extraction subsystem
//!
//! Given a course identified by a handful of seed URLs, this module produces
//! one canonical syllabus: a dated list of weekly sessions with categorized
//! links, a deduplicated resource list, and a grading-weight breakdown. Two
//! independently unreliable strategies are reconciled: rule-based page
//! parsing and generative-model-assisted parsing.
//!
//! Key components:
//! - `links`: URL normalization, domain dedup, noisy-host filtering
//! - `discovery`: ranked same-site subpage discovery from seed URLs
//! - `fetcher`: timeout-guarded page fetching with thin-page detection
//! - `deterministic`: heuristic parser strategies over page structure
//! - `genai`: generative extraction with a quality-gate retry ladder
//! - `merge`: reconciliation of all signal sources into one schedule
//! - `materialize`: final resource list and assignment records
//! - `coordinator`: orchestrates one extraction run end to end

pub mod coordinator;
pub mod dates;
pub mod deterministic;
pub mod discovery;
pub mod fetcher;
pub mod genai;
pub mod links;
pub mod materialize;
pub mod merge;

pub use coordinator::ExtractionCoordinator;
pub use discovery::SubpageDiscoverer;
pub use fetcher::FetchEngine;
pub use genai::GenAiClient;

/// Tracking/session query parameters stripped during normalization
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "sid",
    "sessionid",
    "ref",
];

/// Normalize a URL for deduplication
///
/// - Strips fragments
/// - Removes `www.` prefix from hostnames
/// - Removes trailing slashes from non-root paths
/// - Strips tracking/session query parameters, sorts the rest
/// - Lowercases the result
pub(crate) fn normalize_url(url: &url::Url) -> String {
    let mut normalized = url.clone();

    normalized.set_fragment(None);

    if let Some(host) = normalized.host_str().map(|h| h.to_string()) {
        if let Some(stripped) = host.strip_prefix("www.") {
            if let Err(e) = normalized.set_host(Some(stripped)) {
                tracing::warn!("Failed to strip www. from {}: {}", host, e);
            }
        }
    }

    let path = normalized.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        normalized.set_path(&path[..path.len() - 1]);
    }

    if let Some(query) = normalized.query() {
        let mut params: Vec<_> = query
            .split('&')
            .filter(|p| {
                let key = p.split('=').next().unwrap_or("").to_lowercase();
                !TRACKING_PARAMS.contains(&key.as_str())
            })
            .collect();

        if params.is_empty() {
            normalized.set_query(None);
        } else {
            params.sort_unstable();
            normalized.set_query(Some(&params.join("&")));
        }
    }

    normalized.as_str().to_lowercase()
}

/// Normalized hostname of a URL string, if it parses
pub(crate) fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url).ok().and_then(|u| {
        u.host_str()
            .map(|h| h.trim_start_matches("www.").to_lowercase())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_fragment_and_tracking() {
        let url =
            url::Url::parse("https://www.Example.com/Page/?utm_source=x&b=2&a=1#top").unwrap();
        assert_eq!(normalize_url(&url), "https://example.com/page?a=1&b=2");
    }

    #[test]
    fn test_host_of() {
        assert_eq!(
            host_of("https://www.CS.Example.edu/syllabus"),
            Some("cs.example.edu".to_string())
        );
        assert_eq!(host_of("not a url"), None);
    }
}
