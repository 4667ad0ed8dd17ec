//! Link normalization and noise filtering
//!
//! Canonicalizes URLs, deduplicates by hostname (with path-sensitive
//! exceptions for code/document hosting) and rejects known-noisy hosts
//! before any fetch occurs. Pure functions, no side effects.

use std::collections::HashSet;
use url::Url;

use super::{host_of, normalize_url};

/// Hosts where distinct paths are distinct resources, so dedup uses the
/// full normalized URL instead of the hostname
const PATH_SENSITIVE_HOSTS: &[&str] = &[
    "github.com",
    "gitlab.com",
    "bitbucket.org",
    "docs.google.com",
    "drive.google.com",
    "dropbox.com",
    "slideshare.net",
    "notion.so",
    "canvas.instructure.com",
];

/// Social/video/blogging hosts that never carry syllabus content
const NOISY_HOSTS: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "tiktok.com",
    "linkedin.com",
    "pinterest.com",
    "youtube.com",
    "youtu.be",
    "vimeo.com",
    "twitch.tv",
    "medium.com",
];

/// Forum-style hosts that pass only when the path points at a specific
/// invite or resource rather than the site at large
const FORUM_HOSTS: &[&str] = &["discord.com", "discord.gg", "reddit.com"];

fn host_matches(host: &str, candidates: &[&str]) -> bool {
    candidates
        .iter()
        .any(|c| host == *c || host.ends_with(&format!(".{c}")))
}

/// True when dedup for this host must consider the full URL path
pub fn is_path_sensitive(host: &str) -> bool {
    host_matches(host, PATH_SENSITIVE_HOSTS)
}

/// True for hosts that should be rejected before any fetch
pub fn is_noisy(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return true;
    };
    let Some(host) = parsed.host_str() else {
        return true;
    };
    let host = host.trim_start_matches("www.").to_lowercase();

    if host_matches(&host, NOISY_HOSTS) {
        return true;
    }

    if host_matches(&host, FORUM_HOSTS) {
        // Invites and specific threads are allowed; bare profiles and
        // frontpage links are noise
        let path = parsed.path().to_lowercase();
        let specific = host == "discord.gg"
            || path.contains("/invite")
            || path.contains("/comments/")
            || path.split('/').filter(|s| !s.is_empty()).count() >= 3;
        return !specific;
    }

    false
}

/// Deduplicate a list of URLs by normalized hostname, except for
/// path-sensitive hosts which dedup by full normalized URL. Unparsable
/// URLs are dropped. First occurrence wins; input order is preserved.
pub fn normalize_domain(urls: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept = Vec::new();

    for raw in urls {
        let Ok(parsed) = Url::parse(raw.trim()) else {
            continue;
        };
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            continue;
        }
        let Some(host) = host_of(raw) else {
            continue;
        };

        let key = if is_path_sensitive(&host) {
            normalize_url(&parsed)
        } else {
            host
        };

        if seen.insert(key) {
            kept.push(raw.trim().to_string());
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_dedup_keeps_first_per_host() {
        let urls = vec![
            "https://cs.example.edu/syllabus".to_string(),
            "https://cs.example.edu/schedule".to_string(),
            "https://other.edu/page".to_string(),
        ];
        let kept = normalize_domain(&urls);
        assert_eq!(
            kept,
            vec![
                "https://cs.example.edu/syllabus".to_string(),
                "https://other.edu/page".to_string(),
            ]
        );
    }

    #[test]
    fn test_path_sensitive_hosts_dedup_by_url() {
        let urls = vec![
            "https://github.com/course/hw1".to_string(),
            "https://github.com/course/hw2".to_string(),
            "https://github.com/course/hw1#readme".to_string(),
        ];
        let kept = normalize_domain(&urls);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_unparsable_and_non_http_dropped() {
        let urls = vec![
            "not a url".to_string(),
            "ftp://example.com/file".to_string(),
            "https://example.com/ok".to_string(),
        ];
        assert_eq!(normalize_domain(&urls), vec!["https://example.com/ok"]);
    }

    #[test]
    fn test_noisy_hosts() {
        assert!(is_noisy("https://www.facebook.com/someclass"));
        assert!(is_noisy("https://youtu.be/abc123"));
        assert!(is_noisy("https://reddit.com/r/compsci"));
        assert!(!is_noisy("https://reddit.com/r/compsci/comments/xyz/post"));
        assert!(!is_noisy("https://discord.gg/abc123"));
        assert!(!is_noisy("https://cs.example.edu/syllabus"));
    }
}
