//! Script-bundle fallback for client-rendered pages
//!
//! When a fetched page's extracted text is too short to parse, the schedule
//! usually lives inside a bundled script payload. This pass locates
//! referenced same-host bundles, fetches them, and regex-scans the source
//! for link/label pairs near "Week N:" markers, reconstructing week-indexed
//! link signals plus any percentage-bearing grading lines.

use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use tracing::{debug, warn};
use url::Url;

use super::grading;
use crate::extraction::deterministic::{classify_link, LinkCategory};
use crate::extraction::fetcher::FetchEngine;
use crate::types::{GradingSignal, LinkRef, WeekSignal};

static RE_WEEK_MARKER: OnceLock<Regex> = OnceLock::new();
static RE_HREF_PAIR: OnceLock<Regex> = OnceLock::new();
static RE_GRADING_LINE: OnceLock<Regex> = OnceLock::new();

fn re_week_marker() -> &'static Regex {
    RE_WEEK_MARKER
        .get_or_init(|| Regex::new(r#"Week\s*(\d{1,2})\s*:?\s*([^"\\]{0,80})"#).unwrap())
}

/// `href:"…"` with a nearby `label:"…"`/`text:"…"`/`title:"…"` in either order
fn re_href_pair() -> &'static Regex {
    RE_HREF_PAIR.get_or_init(|| {
        Regex::new(
            r#"(?:(?:label|text|title)\s*:\s*"([^"]{1,80})"\s*,\s*)?href\s*:\s*"(https?://[^"]+)"(?:\s*,\s*(?:label|text|title)\s*:\s*"([^"]{1,80})")?"#,
        )
        .unwrap()
    })
}

fn re_grading_line() -> &'static Regex {
    RE_GRADING_LINE.get_or_init(|| Regex::new(r#""([^"]{3,120}%[^"]{0,40})""#).unwrap())
}

/// Bundle URLs referenced by a page, same-host `.js` only
pub fn bundle_urls(html_src: &str, base: &Url, cap: usize) -> Vec<Url> {
    let document = Html::parse_document(html_src);
    let Ok(selector) = Selector::parse("script[src]") else {
        return Vec::new();
    };

    let base_host = base.host_str().unwrap_or_default();
    let mut urls = Vec::new();

    for element in document.select(&selector) {
        let Some(src) = element.value().attr("src") else {
            continue;
        };
        let Ok(resolved) = base.join(src) else {
            continue;
        };
        if resolved.host_str() != Some(base_host) {
            continue;
        }
        if !resolved.path().ends_with(".js") {
            continue;
        }
        urls.push(resolved);
        if urls.len() >= cap {
            break;
        }
    }

    urls
}

/// Fetch a thin page's script bundles and recover week-indexed link signals
/// and grading lines from them. Fetch failures shrink the result, never
/// propagate.
pub async fn recover_from_scripts(
    fetcher: &FetchEngine,
    html_src: &str,
    base: &Url,
    cap: usize,
) -> (Vec<WeekSignal>, Vec<GradingSignal>) {
    let mut weeks: Vec<WeekSignal> = Vec::new();
    let mut grading_signals: Vec<GradingSignal> = Vec::new();

    for bundle_url in bundle_urls(html_src, base, cap) {
        let body = match fetcher.fetch_script(&bundle_url).await {
            Ok(result) => result.body,
            Err(e) => {
                warn!("Script bundle fetch failed for {}: {}", bundle_url, e);
                continue;
            }
        };

        let (bundle_weeks, bundle_grading) = scan_bundle(&body);
        debug!(
            "Bundle {} yielded {} week signals, {} grading lines",
            bundle_url,
            bundle_weeks.len(),
            bundle_grading.len()
        );

        for week in bundle_weeks {
            merge_week(&mut weeks, week);
        }
        for signal in bundle_grading {
            let dup = grading_signals
                .iter()
                .any(|g| g.component.eq_ignore_ascii_case(&signal.component));
            if !dup {
                grading_signals.push(signal);
            }
        }
    }

    weeks.sort_by_key(|w| w.week);
    (weeks, grading_signals)
}

/// Scan one bundle's source for week markers and link pairs
pub fn scan_bundle(js: &str) -> (Vec<WeekSignal>, Vec<GradingSignal>) {
    let markers: Vec<(usize, u32, String)> = re_week_marker()
        .captures_iter(js)
        .filter_map(|caps| {
            let pos = caps.get(0)?.start();
            let week: u32 = caps[1].parse().ok()?;
            let title = caps[2].trim().trim_end_matches(['"', ',']).to_string();
            Some((pos, week, title))
        })
        .collect();

    let mut weeks: Vec<WeekSignal> = Vec::new();

    for (i, (start, week, title)) in markers.iter().enumerate() {
        let end = markers
            .get(i + 1)
            .map(|(next, _, _)| *next)
            .unwrap_or(js.len());
        let segment = &js[*start..end];

        let mut signal = WeekSignal {
            week: *week,
            title: if title.is_empty() {
                format!("Week {week}")
            } else {
                format!("Week {week}: {title}")
            },
            ..Default::default()
        };

        for caps in re_href_pair().captures_iter(segment) {
            let url = caps[2].to_string();
            let label = caps
                .get(1)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "link".to_string());
            let link = LinkRef::new(label.clone(), url);
            match classify_link(&label) {
                LinkCategory::Assignment | LinkCategory::Lab | LinkCategory::Project => {
                    push_unique(&mut signal.assignments, link)
                }
                LinkCategory::Reading => push_unique(&mut signal.readings, link),
                _ => push_unique(&mut signal.slides, link),
            }
        }

        if !signal.slides.is_empty()
            || !signal.readings.is_empty()
            || !signal.assignments.is_empty()
        {
            merge_week(&mut weeks, signal);
        }
    }

    // Grading lines hide in string literals
    let mut grading_signals = Vec::new();
    for caps in re_grading_line().captures_iter(js) {
        if let Some(signal) = grading::grading_line(&caps[1]) {
            let dup = grading_signals
                .iter()
                .any(|g: &GradingSignal| g.component.eq_ignore_ascii_case(&signal.component));
            if !dup {
                grading_signals.push(signal);
            }
        }
    }

    (weeks, grading_signals)
}

/// Union a week signal into the set; same week numbers merge with
/// link-level dedup. Also used by the coordinator to accumulate signals
/// across pages.
pub(crate) fn merge_week(weeks: &mut Vec<WeekSignal>, incoming: WeekSignal) {
    if let Some(existing) = weeks.iter_mut().find(|w| w.week == incoming.week) {
        for link in incoming.slides {
            push_unique(&mut existing.slides, link);
        }
        for link in incoming.readings {
            push_unique(&mut existing.readings, link);
        }
        for link in incoming.assignments {
            push_unique(&mut existing.assignments, link);
        }
    } else {
        weeks.push(incoming);
    }
}

fn push_unique(list: &mut Vec<LinkRef>, link: LinkRef) {
    if !list.iter().any(|l| l.same_url(&link)) {
        list.push(link);
    }
}
