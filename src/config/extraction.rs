//! Fetch and discovery configuration

use serde::{Deserialize, Serialize};

use super::DEFAULT_USER_AGENT;

/// Page fetching and deterministic extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Maximum simultaneous page fetches during the deterministic fan-out
    pub max_concurrent_fetches: usize,
    /// Per-request timeout (seconds)
    pub request_timeout_secs: u64,
    /// Connection timeout (seconds)
    pub connect_timeout_secs: u64,
    /// Maximum response body size (bytes)
    pub max_content_size: usize,
    /// Maximum redirects to follow
    pub max_redirects: usize,
    /// User agent string
    pub user_agent: String,
    /// Extracted-text length below which a page is treated as
    /// script-rendered and the script-bundle fallback runs
    pub thin_page_threshold: usize,
    /// Maximum script bundles to fetch per thin page
    pub max_script_bundles: usize,
    /// Year assumed for dates that omit one (e.g. "Sep 8"); 0 means the
    /// current year at run time
    pub academic_year: i32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 6,
            request_timeout_secs: 20,
            connect_timeout_secs: 10,
            max_content_size: 5 * 1024 * 1024,
            max_redirects: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            thin_page_threshold: 400,
            max_script_bundles: 4,
            academic_year: 0,
        }
    }
}

impl ExtractionConfig {
    /// Year to assume for year-less dates
    pub fn resolve_academic_year(&self) -> i32 {
        if self.academic_year > 0 {
            self.academic_year
        } else {
            use chrono::Datelike;
            chrono::Utc::now().year()
        }
    }
}

/// Subpage discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Maximum seed URLs fetched per run
    pub max_seed_urls: usize,
    /// Maximum discovered candidates kept (ranked by score)
    pub max_candidates: usize,
    /// Maximum anchors examined per seed page
    pub max_anchors_per_page: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_seed_urls: 4,
            max_candidates: 8,
            max_anchors_per_page: 300,
        }
    }
}
