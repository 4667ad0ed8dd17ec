//! Generic fallback parser
//!
//! Builds schedule rows from table rows and heading blocks carrying
//! week/lecture/date vocabulary when no known structural pattern matches,
//! and separately scans short text blocks for assignment-like sentences
//! (task keyword + deadline keyword).

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use url::Url;

use super::{classify_link, LinkCategory, PageParser};
use crate::extraction::dates;
use crate::types::{DeterministicSignals, LinkRef, ScheduleRow, TaskRef};

static RE_SESSION_VOCAB: OnceLock<Regex> = OnceLock::new();
static RE_TASK_KEYWORD: OnceLock<Regex> = OnceLock::new();
static RE_DEADLINE_KEYWORD: OnceLock<Regex> = OnceLock::new();

fn re_session_vocab() -> &'static Regex {
    RE_SESSION_VOCAB
        .get_or_init(|| Regex::new(r"(?i)\b(week|lecture|session|class|unit)\s*\d+").unwrap())
}

fn re_task_keyword() -> &'static Regex {
    RE_TASK_KEYWORD.get_or_init(|| {
        Regex::new(r"(?i)\b(assignment|homework|hw\s*\d|lab|project|quiz|exam|pset|problem\s+set)")
            .unwrap()
    })
}

fn re_deadline_keyword() -> &'static Regex {
    RE_DEADLINE_KEYWORD
        .get_or_init(|| Regex::new(r"(?i)\b(due|deadline|submit|released|out)\b").unwrap())
}

fn sel(src: &str) -> Selector {
    Selector::parse(src).expect("static selector")
}

pub struct GenericParser;

impl PageParser for GenericParser {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn extract(&self, html: &Html, url: &Url, year: i32) -> DeterministicSignals {
        let mut out = DeterministicSignals::default();

        out.schedule_rows.extend(rows_from_tables(html, url, year));
        out.schedule_rows.extend(rows_from_headings(html, url, year));

        let inferred = assignment_sentences(html, url, year);
        if !inferred.is_empty() {
            // Keyless row; the reconciliation step appends it verbatim
            out.schedule_rows.push(ScheduleRow {
                assignments: inferred,
                ..Default::default()
            });
        }

        out
    }
}

/// Rows from tables whose text carries schedule vocabulary
fn rows_from_tables(html: &Html, base: &Url, year: i32) -> Vec<ScheduleRow> {
    let table_sel = sel("table");
    let tr_sel = sel("tr");
    let cell_sel = sel("td");
    let anchor_sel = sel("a[href]");

    let mut rows = Vec::new();

    for table in html.select(&table_sel) {
        let table_text = element_text(&table).to_lowercase();
        let relevant = re_session_vocab().is_match(&table_text)
            || (table_text.contains("date")
                && (table_text.contains("topic") || table_text.contains("lecture")));
        if !relevant {
            continue;
        }

        for tr in table.select(&tr_sel) {
            let cells: Vec<ElementRef> = tr.select(&cell_sel).collect();
            if cells.is_empty() {
                continue; // header row
            }

            let mut date = None;
            let mut date_cell = usize::MAX;
            for (i, cell) in cells.iter().enumerate() {
                let text = element_text(cell);
                if let Some(parsed) = dates::parse_date(&text, year) {
                    date = Some(parsed);
                    date_cell = i;
                    break;
                }
            }

            let title = cells
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != date_cell)
                .map(|(_, c)| first_line(&element_text(c)))
                .find(|t| !t.is_empty());

            if date.is_none() && !title.as_deref().map(has_session_vocab).unwrap_or(false) {
                continue;
            }

            let mut row = ScheduleRow {
                title,
                date,
                ..Default::default()
            };
            for anchor in tr.select(&anchor_sel) {
                attach_link(&mut row, &anchor, base, year);
            }
            rows.push(row);
        }
    }

    rows
}

/// Rows from heading blocks ("Week 3: Memory") and the content that follows
/// them up to the next heading of the same rank
fn rows_from_headings(html: &Html, base: &Url, year: i32) -> Vec<ScheduleRow> {
    let heading_sel = sel("h2, h3");
    let anchor_sel = sel("a[href]");

    let mut rows = Vec::new();

    for heading in html.select(&heading_sel) {
        let text = element_text(&heading);
        let date = dates::find_date_in_text(&text, year);
        if !has_session_vocab(&text) && date.is_none() {
            continue;
        }

        let mut row = ScheduleRow {
            title: Some(text.clone()),
            date,
            ..Default::default()
        };

        for sibling in heading.next_siblings().filter_map(ElementRef::wrap) {
            let name = sibling.value().name();
            if matches!(name, "h1" | "h2" | "h3") {
                break;
            }
            for anchor in sibling.select(&anchor_sel) {
                attach_link(&mut row, &anchor, base, year);
            }
            if name == "a" {
                attach_link(&mut row, &sibling, base, year);
            }
        }

        rows.push(row);
    }

    rows
}

/// Scan short list/paragraph/table-cell text for assignment-like sentences
/// containing both a task keyword and a deadline keyword
fn assignment_sentences(html: &Html, base: &Url, year: i32) -> Vec<TaskRef> {
    let block_sel = sel("li, p, td");
    let anchor_sel = sel("a[href]");

    let mut tasks: Vec<TaskRef> = Vec::new();

    for block in html.select(&block_sel) {
        let text = element_text(&block);
        if text.len() < 10 || text.len() > 300 {
            continue;
        }
        if !re_task_keyword().is_match(&text) || !re_deadline_keyword().is_match(&text) {
            continue;
        }

        let url = block
            .select(&anchor_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| base.join(href).ok())
            .map(|u| u.to_string())
            .unwrap_or_default();

        let label = label_from_sentence(&text);
        if tasks
            .iter()
            .any(|t| t.label.eq_ignore_ascii_case(&label))
        {
            continue;
        }

        tasks.push(TaskRef {
            label,
            url,
            due_date: dates::find_date_in_text(&text, year),
        });
    }

    tasks
}

/// Shorten a sentence to a usable task label
fn label_from_sentence(text: &str) -> String {
    let first = text
        .split(|c| c == '.' || c == ';' || c == '\n')
        .next()
        .unwrap_or(text)
        .trim();
    let mut label: String = first.chars().take(80).collect();
    if first.chars().count() > 80 {
        label.push('…');
    }
    label
}

fn has_session_vocab(text: &str) -> bool {
    re_session_vocab().is_match(text)
}

fn attach_link(row: &mut ScheduleRow, anchor: &ElementRef, base: &Url, year: i32) {
    let Some(href) = anchor.value().attr("href") else {
        return;
    };
    let Ok(resolved) = base.join(href) else {
        return;
    };
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return;
    }

    let label = element_text(anchor);
    let label = if label.is_empty() {
        "link".to_string()
    } else {
        label
    };
    let url = resolved.to_string();

    match classify_link(&label) {
        LinkCategory::Slides => push_unique(&mut row.slides, LinkRef::new(label, url)),
        LinkCategory::Video => push_unique(&mut row.videos, LinkRef::new(label, url)),
        LinkCategory::Reading => push_unique(&mut row.readings, LinkRef::new(label, url)),
        LinkCategory::Lab => push_task(&mut row.labs, label, url, year),
        LinkCategory::Project => push_task(&mut row.projects, label, url, year),
        LinkCategory::Assignment => push_task(&mut row.assignments, label, url, year),
        LinkCategory::Other => push_unique(&mut row.modules, LinkRef::new(label, url)),
    }
}

fn push_unique(list: &mut Vec<LinkRef>, link: LinkRef) {
    if !list.iter().any(|l| l.same_url(&link)) {
        list.push(link);
    }
}

fn push_task(list: &mut Vec<TaskRef>, label: String, url: String, year: i32) {
    if list.iter().any(|t| t.url.eq_ignore_ascii_case(&url)) {
        return;
    }
    let due_date = dates::find_date_in_text(&label, year);
    list.push(TaskRef {
        label,
        url,
        due_date,
    });
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or("").trim().to_string()
}

fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
