//! Course-subpage discovery
//!
//! Given a handful of seed URLs, fetch each, pull out same-site (or
//! companion-host) anchors that look like syllabus/calendar/resource pages,
//! score them, and keep a bounded ranked set. A failed seed never aborts the
//! others; an empty result is valid and callers fall back to seeds only.

use std::collections::HashSet;

use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use super::fetcher::{FetchEngine, FetchResult};
use super::{links, normalize_url};
use crate::config::DiscoveryConfig;

/// Learning-platform and hosting domains worth following off-site
const COMPANION_HOSTS: &[&str] = &[
    "github.com",
    "gitlab.com",
    "bitbucket.org",
    "docs.google.com",
    "drive.google.com",
    "canvas.instructure.com",
    "gradescope.com",
    "edstem.org",
];

/// A discovered URL with its relevance score. Transient to the discovery
/// phase; never persisted.
#[derive(Debug, Clone)]
pub struct CandidateUrl {
    pub url: Url,
    pub score: f32,
    /// Discovery order, used to break score ties
    pub rank: usize,
}

/// Result of the discovery phase: the fetched seed pages (reused downstream
/// so seeds are not fetched twice) plus the ranked discovered subpages.
#[derive(Debug, Default)]
pub struct DiscoveryOutcome {
    pub seed_pages: Vec<FetchResult>,
    pub candidates: Vec<CandidateUrl>,
}

/// Discovers syllabus-adjacent subpages from course seed URLs
pub struct SubpageDiscoverer<'a> {
    fetcher: &'a FetchEngine,
    config: &'a DiscoveryConfig,
}

impl<'a> SubpageDiscoverer<'a> {
    pub fn new(fetcher: &'a FetchEngine, config: &'a DiscoveryConfig) -> Self {
        Self { fetcher, config }
    }

    /// Fetch each seed and collect scored candidate subpages.
    pub async fn discover(&self, seeds: &[String]) -> DiscoveryOutcome {
        let mut outcome = DiscoveryOutcome::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut rank = 0usize;

        for seed in seeds.iter().take(self.config.max_seed_urls) {
            let Ok(url) = Url::parse(seed) else {
                warn!("Skipping unparsable seed URL: {}", seed);
                continue;
            };

            let page = match self.fetcher.fetch_page(&url).await {
                Ok(page) => page,
                Err(e) => {
                    warn!("Seed fetch failed for {}: {}", url, e);
                    continue;
                }
            };

            // The final redirected URL is the candidate, not the request URL
            seen.insert(normalize_url(&page.final_url));

            if page.is_html() {
                for (link, score) in self.scored_anchors(&page) {
                    let key = normalize_url(&link);
                    if seen.insert(key) {
                        outcome.candidates.push(CandidateUrl {
                            url: link,
                            score,
                            rank,
                        });
                        rank += 1;
                    }
                }
            }

            outcome.seed_pages.push(page);
        }

        // Highest score first; ties in discovery order
        outcome
            .candidates
            .sort_by(|a, b| b.score.total_cmp(&a.score).then(a.rank.cmp(&b.rank)));
        outcome.candidates.truncate(self.config.max_candidates);

        debug!(
            "Discovery kept {} candidates from {} seed pages",
            outcome.candidates.len(),
            outcome.seed_pages.len()
        );
        outcome
    }

    /// Extract anchors from a seed page and score the relevant ones
    fn scored_anchors(&self, page: &FetchResult) -> Vec<(Url, f32)> {
        let document = Html::parse_document(&page.body);
        let selector = match Selector::parse("a[href]") {
            Ok(s) => s,
            Err(_) => return Vec::new(),
        };

        let base = &page.final_url;
        let base_host = base
            .host_str()
            .unwrap_or_default()
            .trim_start_matches("www.")
            .to_lowercase();

        let mut scored = Vec::new();
        for element in document
            .select(&selector)
            .take(self.config.max_anchors_per_page)
        {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Ok(resolved) = base.join(href) else {
                continue;
            };
            if resolved.scheme() != "http" && resolved.scheme() != "https" {
                continue;
            }
            if links::is_noisy(resolved.as_str()) {
                continue;
            }

            let host = resolved
                .host_str()
                .unwrap_or_default()
                .trim_start_matches("www.")
                .to_lowercase();
            if !same_site(&host, &base_host) && !is_companion_host(&host) {
                continue;
            }

            let text = element.text().collect::<String>();
            let haystack = format!("{} {}", text.to_lowercase(), resolved.path().to_lowercase());
            if let Some(score) = score_link(&haystack) {
                scored.push((resolved, score));
            }
        }

        scored
    }
}

/// Score a link by its anchor text + path vocabulary. None means the link
/// does not look course-related at all.
fn score_link(haystack: &str) -> Option<f32> {
    if haystack.contains("syllabus") {
        return Some(5.0);
    }
    if haystack.contains("calendar") || haystack.contains("schedule") {
        return Some(4.0);
    }
    if haystack.contains("resource") || haystack.contains("material") {
        return Some(3.0);
    }
    if haystack.contains("assignment")
        || haystack.contains("homework")
        || haystack.contains("policy")
        || haystack.contains("grading")
    {
        return Some(2.0);
    }
    if haystack.contains("week") || haystack.contains("lecture") || haystack.contains("reading") {
        return Some(1.0);
    }
    None
}

fn is_companion_host(host: &str) -> bool {
    COMPANION_HOSTS
        .iter()
        .any(|c| host == *c || host.ends_with(&format!(".{c}")))
}

/// Same host, or both under the same registrable parent (cs.example.edu is
/// same-site as example.edu)
fn same_site(host: &str, base_host: &str) -> bool {
    if host == base_host {
        return true;
    }
    let tail = |h: &str| {
        let labels: Vec<&str> = h.split('.').collect();
        if labels.len() >= 2 {
            labels[labels.len() - 2..].join(".")
        } else {
            h.to_string()
        }
    };
    tail(host) == tail(base_host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_tiers() {
        assert_eq!(score_link("course syllabus /cs101/syllabus"), Some(5.0));
        assert_eq!(score_link("class schedule"), Some(4.0));
        assert_eq!(score_link("course materials"), Some(3.0));
        assert_eq!(score_link("homework page"), Some(2.0));
        assert_eq!(score_link("lecture notes"), Some(1.0));
        assert_eq!(score_link("contact us"), None);
    }

    #[test]
    fn test_syllabus_beats_schedule() {
        let syllabus = score_link("/syllabus").unwrap();
        let schedule = score_link("/schedule").unwrap();
        assert!(syllabus > schedule);
    }

    #[test]
    fn test_same_site() {
        assert!(same_site("cs.example.edu", "example.edu"));
        assert!(same_site("example.edu", "example.edu"));
        assert!(!same_site("other.edu", "example.edu"));
    }

    #[test]
    fn test_companion_hosts() {
        assert!(is_companion_host("github.com"));
        assert!(is_companion_host("gist.github.com"));
        assert!(!is_companion_host("example.edu"));
    }
}
