//! Site-pattern parser for known structural conventions
//!
//! Matches the repeating "schedule item" container shape used by common
//! course-site templates: a date label, a title, a resource-link list, and a
//! logistics/description block whose embedded links are task handouts. Also
//! reads a labeled grading-list container when present.

use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use url::Url;

use super::{classify_link, grading, LinkCategory, PageParser};
use crate::extraction::dates;
use crate::types::{DeterministicSignals, LinkRef, ScheduleRow, TaskRef};

fn sel(src: &str) -> Selector {
    Selector::parse(src).expect("static selector")
}

struct Selectors {
    item: Selector,
    date: Selector,
    title: Selector,
    resources: Selector,
    logistics: Selector,
    anchor: Selector,
    grading: Selector,
}

static SELECTORS: OnceLock<Selectors> = OnceLock::new();

fn selectors() -> &'static Selectors {
    SELECTORS.get_or_init(|| Selectors {
        item: sel(".schedule-item, li.session, .lecture-item, .class-session"),
        date: sel(".date, .session-date, time"),
        title: sel(".title, .topic, h3, h4"),
        resources: sel(".resources a, .links a, .materials a, ul a"),
        logistics: sel(".logistics, .notes, .description, .details"),
        anchor: sel("a[href]"),
        grading: sel(".grading li, #grading li, .assessment li, .grade-breakdown li"),
    })
}

pub struct SitePatternParser;

impl PageParser for SitePatternParser {
    fn name(&self) -> &'static str {
        "site-pattern"
    }

    fn extract(&self, html: &Html, url: &Url, year: i32) -> DeterministicSignals {
        let s = selectors();
        let mut out = DeterministicSignals::default();

        for (idx, item) in html.select(&s.item).enumerate() {
            if let Some(row) = parse_item(&item, url, year, idx) {
                out.schedule_rows.push(row);
            }
        }

        for entry in html.select(&s.grading) {
            let text = element_text(&entry);
            if let Some(signal) = grading::grading_line(&text) {
                let dup = out
                    .grading_signals
                    .iter()
                    .any(|g| g.component.eq_ignore_ascii_case(&signal.component));
                if !dup {
                    out.grading_signals.push(signal);
                }
            }
        }

        out
    }
}

fn parse_item(item: &ElementRef, base: &Url, year: i32, idx: usize) -> Option<ScheduleRow> {
    let s = selectors();

    let date_text = item.select(&s.date).next().map(|e| element_text(&e));
    let title = item
        .select(&s.title)
        .next()
        .map(|e| element_text(&e))
        .filter(|t| !t.is_empty());

    let date = date_text
        .as_deref()
        .and_then(|t| dates::parse_date(t, year));

    // A container with neither a date nor a title is not a session
    if date.is_none() && title.is_none() {
        return None;
    }

    let mut row = ScheduleRow {
        sequence: Some(format!("{}", idx + 1)),
        title,
        date,
        ..Default::default()
    };

    for anchor in item.select(&s.resources) {
        let Some((label, href)) = resolve_anchor(&anchor, base) else {
            continue;
        };
        let link = LinkRef::new(label.clone(), href.clone());
        match classify_link(&label) {
            LinkCategory::Video => push_link(&mut row.videos, link),
            LinkCategory::Slides => push_link(&mut row.slides, link),
            _ => push_link(&mut row.modules, link),
        }
    }

    if let Some(logistics) = item.select(&s.logistics).next() {
        let text = element_text(&logistics);
        if !text.is_empty() {
            row.description = Some(text);
        }
        // Links inside the logistics block are task handouts
        for anchor in logistics.select(&s.anchor) {
            let Some((label, href)) = resolve_anchor(&anchor, base) else {
                continue;
            };
            let mut task = TaskRef::new(label.clone(), href);
            task.due_date = row
                .description
                .as_deref()
                .and_then(|d| dates::find_date_in_text(d, year));
            match classify_link(&label) {
                LinkCategory::Lab => row.labs.push(task),
                LinkCategory::Project => row.projects.push(task),
                _ => row.assignments.push(task),
            }
        }
    }

    Some(row)
}

fn push_link(list: &mut Vec<LinkRef>, link: LinkRef) {
    if !list.iter().any(|l| l.same_url(&link)) {
        list.push(link);
    }
}

fn resolve_anchor(anchor: &ElementRef, base: &Url) -> Option<(String, String)> {
    let href = anchor.value().attr("href")?;
    let resolved = base.join(href).ok()?;
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }
    let label = element_text(anchor);
    let label = if label.is_empty() {
        resolved
            .path_segments()
            .and_then(|mut s| s.next_back())
            .unwrap_or("link")
            .to_string()
    } else {
        label
    };
    Some((label, resolved.to_string()))
}

fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
