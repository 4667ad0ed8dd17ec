//! Deterministic signal extraction
//!
//! A fixed ordered list of parser strategies runs over every fetched page
//! and their outputs are unioned. New site patterns slot in as additional
//! strategies without touching existing ones. The script-bundle fallback
//! (for client-rendered pages) lives in `script_bundle` and is driven by the
//! coordinator because it needs the fetcher.

pub mod generic;
pub mod grading;
pub mod script_bundle;
pub mod site_pattern;

use scraper::Html;
use tracing::debug;
use url::Url;

use crate::types::DeterministicSignals;

/// One heuristic parsing strategy over page structure
pub trait PageParser {
    fn name(&self) -> &'static str;
    fn extract(&self, html: &Html, url: &Url, year: i32) -> DeterministicSignals;
}

/// Run every parser strategy over a page and union the results.
/// `year` is the academic year assumed for year-less dates.
pub fn extract_signals(html_src: &str, url: &Url, year: i32) -> DeterministicSignals {
    let html = Html::parse_document(html_src);
    let text = super::fetcher::extract_page_text(html_src);

    let parsers: [&dyn PageParser; 2] =
        [&site_pattern::SitePatternParser, &generic::GenericParser];

    let mut out = DeterministicSignals::default();
    for parser in parsers {
        let signals = parser.extract(&html, url, year);
        if !signals.is_empty() {
            debug!(
                "{} parser: {} rows, {} resources from {}",
                parser.name(),
                signals.schedule_rows.len(),
                signals.extra_resources.len(),
                url
            );
        }
        out.absorb(signals);
    }

    let grading = grading::extract_grading(&html, &text);
    out.absorb(DeterministicSignals {
        grading_signals: grading,
        ..Default::default()
    });

    out
}

/// Link category inferred from a label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkCategory {
    Slides,
    Video,
    Reading,
    Lab,
    Project,
    Assignment,
    Other,
}

/// Classify a link by its label keywords
pub(crate) fn classify_link(label: &str) -> LinkCategory {
    let lower = label.to_lowercase();
    if lower.contains("slide") || lower.contains("deck") || lower.contains("notes") {
        LinkCategory::Slides
    } else if lower.contains("video") || lower.contains("recording") || lower.contains("lecture capture") {
        LinkCategory::Video
    } else if lower.contains("reading") || lower.contains("chapter") || lower.contains("textbook") || lower.contains("paper") {
        LinkCategory::Reading
    } else if lower.contains("lab") {
        LinkCategory::Lab
    } else if lower.contains("project") {
        LinkCategory::Project
    } else if lower.contains("assignment")
        || lower.contains("homework")
        || lower.contains("hw")
        || lower.contains("pset")
        || lower.contains("problem set")
    {
        LinkCategory::Assignment
    } else {
        LinkCategory::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_link() {
        assert_eq!(classify_link("Lecture Slides"), LinkCategory::Slides);
        assert_eq!(classify_link("Recording (Zoom)"), LinkCategory::Video);
        assert_eq!(classify_link("Chapter 3"), LinkCategory::Reading);
        assert_eq!(classify_link("Homework 2"), LinkCategory::Assignment);
        assert_eq!(classify_link("Lab 1 handout"), LinkCategory::Lab);
        assert_eq!(classify_link("Final Project"), LinkCategory::Project);
        assert_eq!(classify_link("Course forum"), LinkCategory::Other);
    }

    #[test]
    fn test_strategies_union() {
        // A page with both a site-pattern schedule list and a generic table
        let html = r#"
        <html><body>
          <div class="schedule-item">
            <span class="date">Sep 8, 2025</span>
            <h3 class="title">Introduction</h3>
            <ul class="resources"><li><a href="https://x.edu/w1.pdf">Slides</a></li></ul>
          </div>
          <table>
            <tr><th>Date</th><th>Topic</th></tr>
            <tr><td>Sep 15, 2025</td><td>Week 2 <a href="https://x.edu/hw1">Homework 1</a></td></tr>
          </table>
        </body></html>"#;
        let url = Url::parse("https://x.edu/syllabus").unwrap();
        let signals = extract_signals(html, &url, 2025);
        assert!(signals.schedule_rows.len() >= 2);
    }
}
