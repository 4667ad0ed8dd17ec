//! Grading-breakdown extraction
//!
//! Scans the page's grading/assessment sections line by line, or a text
//! window around the first "grading" mention when no labeled section
//! exists. A line counts when it carries a percentage and a grading
//! category keyword; lateness/penalty policy lines are excluded. The
//! weight is the first percentage unless an "X% × Y" multiplier pattern
//! is present, in which case the product is used when it stays <= 100.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

use crate::types::GradingSignal;

static RE_PERCENT: OnceLock<Regex> = OnceLock::new();
static RE_MULTIPLIER: OnceLock<Regex> = OnceLock::new();
static RE_CATEGORY: OnceLock<Regex> = OnceLock::new();
static RE_PENALTY: OnceLock<Regex> = OnceLock::new();

fn re_percent() -> &'static Regex {
    RE_PERCENT.get_or_init(|| Regex::new(r"(\d{1,3}(?:\.\d+)?)\s*%").unwrap())
}

fn re_multiplier() -> &'static Regex {
    RE_MULTIPLIER
        .get_or_init(|| Regex::new(r"(\d{1,3}(?:\.\d+)?)\s*%\s*(?:×|x|\*)\s*(\d{1,2})").unwrap())
}

fn re_category() -> &'static Regex {
    RE_CATEGORY.get_or_init(|| {
        Regex::new(
            r"(?i)\b(homework|assignments?|exams?|midterms?|finals?|quiz(?:zes)?|projects?|labs?|participation|attendance|papers?|presentations?|discussions?|readings?)\b",
        )
        .unwrap()
    })
}

fn re_penalty() -> &'static Regex {
    RE_PENALTY
        .get_or_init(|| Regex::new(r"(?i)\b(late|penalty|deduct|per day|extension)\b").unwrap())
}

/// Extract grading signals from a page. `text` is the page's extracted
/// plain text, used for the unlabeled-section fallback.
pub fn extract_grading(html: &Html, text: &str) -> Vec<GradingSignal> {
    let section = grading_section_text(html)
        .unwrap_or_else(|| grading_window(text).unwrap_or_default());

    let mut signals: Vec<GradingSignal> = Vec::new();
    for line in section.lines() {
        if let Some(signal) = grading_line(line) {
            let dup = signals
                .iter()
                .any(|g| g.component.eq_ignore_ascii_case(&signal.component));
            if !dup {
                signals.push(signal);
            }
        }
    }
    signals
}

/// Parse one candidate grading line
pub fn grading_line(line: &str) -> Option<GradingSignal> {
    let line = line.trim();
    if line.is_empty() || line.len() > 200 {
        return None;
    }
    if re_penalty().is_match(line) {
        return None;
    }

    let category = re_category().find(line)?;
    let percent_caps = re_percent().captures(line)?;
    let first_percent: f32 = percent_caps[1].parse().ok()?;

    let weight = match re_multiplier().captures(line) {
        Some(caps) => {
            let each: f32 = caps[1].parse().ok()?;
            let count: f32 = caps[2].parse().ok()?;
            let product = each * count;
            if product <= 100.0 {
                product
            } else {
                first_percent
            }
        }
        None => first_percent,
    };

    if weight <= 0.0 || weight > 100.0 {
        return None;
    }

    // Component name: text up to the percentage, falling back to the
    // matched category keyword for layouts like "40% Homework"
    let percent_start = re_percent().find(line)?.start();
    let digits_start = line[..percent_start]
        .rfind(|c: char| !c.is_ascii_digit() && c != '.' && c != ' ')
        .map(|i| i + 1)
        .unwrap_or(0);
    let mut component = line[..digits_start]
        .trim_end_matches([':', '-', '(', ',', ' '])
        .trim()
        .to_string();
    if component.is_empty() {
        component = category.as_str().to_string();
    }

    Some(GradingSignal { component, weight })
}

/// Text of a labeled grading/assessment section, if the page has one
fn grading_section_text(html: &Html) -> Option<String> {
    let heading_sel = Selector::parse("h1, h2, h3, h4").ok()?;

    for heading in html.select(&heading_sel) {
        let text = heading.text().collect::<String>().to_lowercase();
        if !(text.contains("grading") || text.contains("assessment") || text.contains("evaluation"))
        {
            continue;
        }

        let mut lines = Vec::new();
        for sibling in heading.next_siblings().filter_map(ElementRef::wrap) {
            if matches!(sibling.value().name(), "h1" | "h2" | "h3" | "h4") {
                break;
            }
            collect_lines(&sibling, &mut lines);
        }
        if !lines.is_empty() {
            return Some(lines.join("\n"));
        }
    }

    None
}

/// Fallback: a text window around the first "grading" occurrence
fn grading_window(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let pos = lower.find("grading")?.min(text.len());
    let mut start = pos.saturating_sub(100);
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (pos + 1000).min(text.len());
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }
    Some(text[start..end].to_string())
}

/// Flatten an element into trimmed text lines, one per list item/row
fn collect_lines(element: &ElementRef, lines: &mut Vec<String>) {
    let item_sel = Selector::parse("li, tr, p").expect("static selector");
    let items: Vec<ElementRef> = element.select(&item_sel).collect();

    if items.is_empty() {
        let text = element
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if !text.is_empty() {
            lines.push(text);
        }
    } else {
        for item in items {
            let text = item
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if !text.is_empty() {
                lines.push(text);
            }
        }
    }
}
