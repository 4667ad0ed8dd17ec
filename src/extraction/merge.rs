//! Merge and reconciliation of schedule signals
//!
//! Combines deterministic rows, generative rows, and week-indexed link
//! signals into one canonical schedule. Rows match on `(date, lowercased
//! title)`; link categories union with case-insensitive URL dedup keeping
//! the first-seen label; scalar fields prefer the deterministic value, then
//! the generative one.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::types::{LinkRef, ScheduleRow, TaskRef, WeekSignal};

static RE_WEEK_NUMBER: OnceLock<Regex> = OnceLock::new();

fn re_week_number() -> &'static Regex {
    RE_WEEK_NUMBER.get_or_init(|| Regex::new(r"(?i)\bweek\s*(\d{1,2})\b").unwrap())
}

/// Collapse rows sharing a `(date, lowercased title)` key. Keyless rows are
/// appended untouched. Used both for cross-URL deterministic merging and
/// inside reconciliation.
pub fn merge_rows_by_key(rows: Vec<ScheduleRow>) -> Vec<ScheduleRow> {
    let mut merged: Vec<ScheduleRow> = Vec::new();
    let mut index: HashMap<(chrono::NaiveDate, String), usize> = HashMap::new();

    for row in rows {
        match row.merge_key() {
            Some(key) => {
                if let Some(&i) = index.get(&key) {
                    let mut existing = std::mem::take(&mut merged[i]);
                    merge_into(&mut existing, row);
                    merged[i] = existing;
                } else {
                    index.insert(key, merged.len());
                    merged.push(row);
                }
            }
            None => merged.push(row),
        }
    }

    merged
}

/// Produce the canonical schedule from all three signal sources.
///
/// Generative rows set the base order; matching deterministic rows merge in
/// with scalar precedence; unmatched deterministic rows append after. When
/// the generative pass returned nothing the deterministic set is used as-is.
/// Week signals then fold in, and the result sorts by date (dateless rows
/// last, stable).
pub fn reconcile(
    deterministic: Vec<ScheduleRow>,
    generative: Vec<ScheduleRow>,
    week_signals: Vec<WeekSignal>,
) -> Vec<ScheduleRow> {
    let deterministic = merge_rows_by_key(deterministic);

    let mut rows: Vec<ScheduleRow> = if generative.is_empty() {
        deterministic
    } else {
        let mut det_by_key: HashMap<(chrono::NaiveDate, String), ScheduleRow> = HashMap::new();
        let mut det_keyless: Vec<ScheduleRow> = Vec::new();
        for row in deterministic {
            match row.merge_key() {
                Some(key) => {
                    det_by_key.insert(key, row);
                }
                None => det_keyless.push(row),
            }
        }

        let mut rows = Vec::new();
        for gen_row in merge_rows_by_key(generative) {
            match gen_row.merge_key().and_then(|k| det_by_key.remove(&k)) {
                Some(mut det_row) => {
                    // Deterministic scalars win; links union
                    merge_into(&mut det_row, gen_row);
                    rows.push(det_row);
                }
                None => rows.push(gen_row),
            }
        }

        // Unmatched deterministic rows append after merged ones
        let mut leftover: Vec<ScheduleRow> = det_by_key.into_values().collect();
        leftover.sort_by_key(|r| r.date);
        rows.extend(leftover);
        rows.extend(det_keyless);
        rows
    };

    fold_week_signals(&mut rows, week_signals);

    // Date ascending; dateless rows last, original order otherwise
    rows.sort_by_key(|r| (r.date.is_none(), r.date));
    rows
}

/// Merge `source` into `target`: target's non-empty scalars win, link
/// categories union with case-insensitive URL dedup.
fn merge_into(target: &mut ScheduleRow, source: ScheduleRow) {
    fn prefer<T>(target: &mut Option<T>, source: Option<T>) {
        if target.is_none() {
            *target = source;
        }
    }

    // Blank strings count as absent so they never block a real value
    fn prefer_text(target: &mut Option<String>, source: Option<String>) {
        let blank = target
            .as_deref()
            .map(str::trim)
            .map_or(true, str::is_empty);
        if blank {
            if let Some(s) = source.filter(|s| !s.trim().is_empty()) {
                *target = Some(s);
            }
        }
    }

    prefer_text(&mut target.sequence, source.sequence);
    prefer_text(&mut target.title, source.title);
    prefer(&mut target.date, source.date);
    prefer(&mut target.date_end, source.date_end);
    prefer_text(&mut target.instructor, source.instructor);
    prefer_text(&mut target.description, source.description);
    for topic in source.topics {
        if !target.topics.iter().any(|t| t.eq_ignore_ascii_case(&topic)) {
            target.topics.push(topic);
        }
    }

    union_links(&mut target.slides, source.slides);
    union_links(&mut target.videos, source.videos);
    union_links(&mut target.readings, source.readings);
    union_links(&mut target.modules, source.modules);
    union_tasks(&mut target.assignments, source.assignments);
    union_tasks(&mut target.labs, source.labs);
    union_tasks(&mut target.exams, source.exams);
    union_tasks(&mut target.projects, source.projects);
}

/// Union link lists, first-seen label wins per URL
pub fn union_links(target: &mut Vec<LinkRef>, source: Vec<LinkRef>) {
    for link in source {
        if !target.iter().any(|l| l.same_url(&link)) {
            target.push(link);
        }
    }
}

/// Union task lists. Tasks match on case-insensitive URL, or on label when
/// one side has no URL (the week-signal gap-fill case). Two tasks with
/// distinct non-empty URLs both survive even under the same label.
fn union_tasks(target: &mut Vec<TaskRef>, source: Vec<TaskRef>) {
    for task in source {
        match target.iter_mut().find(|t| {
            (!t.url.is_empty() && t.url.eq_ignore_ascii_case(&task.url))
                || ((t.url.is_empty() || task.url.is_empty())
                    && t.label.eq_ignore_ascii_case(&task.label))
        }) {
            Some(existing) => {
                if existing.due_date.is_none() {
                    existing.due_date = task.due_date;
                }
                if existing.url.is_empty() {
                    existing.url = task.url;
                }
            }
            None => target.push(task),
        }
    }
}

/// Week number of a row, from its sequence or title, else the positional
/// fallback (1-based row order)
fn detect_week(row: &ScheduleRow, position: usize) -> u32 {
    for field in [row.sequence.as_deref(), row.title.as_deref()].into_iter().flatten() {
        if let Some(caps) = re_week_number().captures(field) {
            if let Ok(week) = caps[1].parse() {
                return week;
            }
        }
        // A bare numeric sequence is a week number on weekly schedules
        if let Ok(week) = field.trim().parse::<u32>() {
            return week;
        }
    }
    (position + 1) as u32
}

/// Fold week-indexed link signals into matching rows; weeks without a row
/// become synthesized rows. Week-signal assignments carry no dates.
fn fold_week_signals(rows: &mut Vec<ScheduleRow>, signals: Vec<WeekSignal>) {
    if signals.is_empty() {
        return;
    }

    let week_of: Vec<u32> = rows
        .iter()
        .enumerate()
        .map(|(i, r)| detect_week(r, i))
        .collect();

    for signal in signals {
        match week_of.iter().position(|w| *w == signal.week) {
            Some(i) => {
                let row = &mut rows[i];
                union_links(&mut row.slides, signal.slides);
                union_links(&mut row.readings, signal.readings);
                let tasks = signal
                    .assignments
                    .into_iter()
                    .map(|l| TaskRef::new(l.label, l.url))
                    .collect();
                union_tasks(&mut row.assignments, tasks);
            }
            None => rows.push(ScheduleRow {
                title: Some(signal.title.clone()),
                slides: signal.slides,
                readings: signal.readings,
                assignments: signal
                    .assignments
                    .into_iter()
                    .map(|l| TaskRef::new(l.label, l.url))
                    .collect(),
                ..Default::default()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn row(date: Option<NaiveDate>, title: &str) -> ScheduleRow {
        ScheduleRow {
            title: Some(title.to_string()),
            date,
            ..Default::default()
        }
    }

    #[test]
    fn test_same_key_rows_collapse_with_link_union() {
        let mut det = row(Some(d(2025, 9, 8)), "Week 1");
        det.slides.push(LinkRef::new("Slides", "https://x.com/w1.pdf"));

        let mut gen = row(Some(d(2025, 9, 8)), "Week 1");
        gen.assignments.push(TaskRef {
            label: "HW1".to_string(),
            url: "https://x.com/hw1".to_string(),
            due_date: Some(d(2025, 9, 15)),
        });

        let merged = reconcile(vec![det], vec![gen], vec![]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].slides.len(), 1);
        assert_eq!(merged[0].assignments.len(), 1);
        assert_eq!(merged[0].assignments[0].due_date, Some(d(2025, 9, 15)));
    }

    #[test]
    fn test_key_matching_is_case_insensitive_on_title() {
        let a = row(Some(d(2025, 9, 8)), "WEEK 1");
        let b = row(Some(d(2025, 9, 8)), "week 1");
        assert_eq!(merge_rows_by_key(vec![a, b]).len(), 1);
    }

    #[test]
    fn test_deterministic_scalars_win() {
        let mut det = row(Some(d(2025, 9, 8)), "Week 1");
        det.instructor = Some("Prof. Chen".to_string());

        let mut gen = row(Some(d(2025, 9, 8)), "Week 1");
        gen.instructor = Some("Unknown".to_string());
        gen.description = Some("Intro lecture".to_string());

        let merged = reconcile(vec![det], vec![gen], vec![]);
        assert_eq!(merged[0].instructor.as_deref(), Some("Prof. Chen"));
        // Gaps fill from the generative row
        assert_eq!(merged[0].description.as_deref(), Some("Intro lecture"));
    }

    #[test]
    fn test_same_label_distinct_urls_both_kept() {
        let mut a = row(Some(d(2025, 9, 8)), "Week 1");
        a.assignments
            .push(TaskRef::new("Homework", "https://x.com/hw1"));
        let mut b = row(Some(d(2025, 9, 8)), "Week 1");
        b.assignments
            .push(TaskRef::new("Homework", "https://x.com/hw2"));

        let merged = merge_rows_by_key(vec![a, b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].assignments.len(), 2);
    }

    #[test]
    fn test_label_match_fills_missing_url() {
        let mut a = row(Some(d(2025, 9, 8)), "Week 1");
        a.assignments.push(TaskRef::new("HW1", ""));
        let mut b = row(Some(d(2025, 9, 8)), "Week 1");
        b.assignments.push(TaskRef {
            label: "hw1".to_string(),
            url: "https://x.com/hw1".to_string(),
            due_date: Some(d(2025, 9, 15)),
        });

        let merged = merge_rows_by_key(vec![a, b]);
        assert_eq!(merged[0].assignments.len(), 1);
        assert_eq!(merged[0].assignments[0].url, "https://x.com/hw1");
        assert_eq!(merged[0].assignments[0].due_date, Some(d(2025, 9, 15)));
    }

    #[test]
    fn test_blank_scalar_does_not_block_real_value() {
        let mut det = row(Some(d(2025, 9, 8)), "Week 1");
        det.description = Some(String::new());
        let mut gen = row(Some(d(2025, 9, 8)), "Week 1");
        gen.description = Some("Intro lecture".to_string());

        let merged = reconcile(vec![det], vec![gen], vec![]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].description.as_deref(), Some("Intro lecture"));
    }

    #[test]
    fn test_unmatched_deterministic_rows_appended_and_sorted() {
        let det = vec![
            row(Some(d(2025, 9, 22)), "Week 3"),
            row(Some(d(2025, 9, 8)), "Week 1"),
        ];
        let gen = vec![row(Some(d(2025, 9, 15)), "Week 2")];

        let merged = reconcile(det, gen, vec![]);
        let dates: Vec<_> = merged.iter().map(|r| r.date.unwrap()).collect();
        assert_eq!(dates, vec![d(2025, 9, 8), d(2025, 9, 15), d(2025, 9, 22)]);
    }

    #[test]
    fn test_dateless_rows_sort_last() {
        let det = vec![row(None, "Reading period"), row(Some(d(2025, 9, 8)), "Week 1")];
        let merged = reconcile(det, vec![], vec![]);
        assert_eq!(merged[0].date, Some(d(2025, 9, 8)));
        assert_eq!(merged[1].date, None);
    }

    #[test]
    fn test_zero_generative_rows_degrades_to_deterministic() {
        let det = vec![row(Some(d(2025, 9, 8)), "Week 1")];
        let merged = reconcile(det, vec![], vec![]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title.as_deref(), Some("Week 1"));
    }

    #[test]
    fn test_week_signal_folds_into_matching_row() {
        let mut gen = row(Some(d(2025, 9, 8)), "Week 1: Intro");
        gen.slides.push(LinkRef::new("Slides", "https://x.com/w1.pdf"));

        let signal = WeekSignal {
            week: 1,
            title: "Week 1".to_string(),
            slides: vec![
                LinkRef::new("Deck", "https://X.com/W1.PDF"),
                LinkRef::new("Extra", "https://x.com/extra.pdf"),
            ],
            readings: vec![LinkRef::new("Ch 1", "https://x.com/ch1")],
            assignments: vec![LinkRef::new("HW1", "https://x.com/hw1")],
        };

        let merged = reconcile(vec![], vec![gen], vec![signal]);
        assert_eq!(merged.len(), 1);
        // Duplicate slide deduped case-insensitively, first label kept
        assert_eq!(merged[0].slides.len(), 2);
        assert_eq!(merged[0].slides[0].label, "Slides");
        assert_eq!(merged[0].readings.len(), 1);
        // Week-signal assignments carry no due date
        assert_eq!(merged[0].assignments[0].due_date, None);
    }

    #[test]
    fn test_missing_week_synthesizes_row() {
        let gen = vec![row(Some(d(2025, 9, 8)), "Week 1")];
        let signal = WeekSignal {
            week: 4,
            title: "Week 4: Scheduling".to_string(),
            slides: vec![LinkRef::new("Slides", "https://x.com/w4.pdf")],
            ..Default::default()
        };

        let merged = reconcile(vec![], gen, vec![signal]);
        assert_eq!(merged.len(), 2);
        let synthesized = merged.iter().find(|r| r.date.is_none()).unwrap();
        assert_eq!(synthesized.title.as_deref(), Some("Week 4: Scheduling"));
    }

    #[test]
    fn test_positional_week_fallback() {
        let rows = vec![
            row(Some(d(2025, 9, 8)), "Intro"),
            row(Some(d(2025, 9, 15)), "Memory"),
        ];
        let signal = WeekSignal {
            week: 2,
            title: "Week 2".to_string(),
            slides: vec![LinkRef::new("Slides", "https://x.com/w2.pdf")],
            ..Default::default()
        };

        let merged = reconcile(rows, vec![], vec![signal]);
        assert_eq!(merged[1].slides.len(), 1);
    }

    #[test]
    fn test_idempotent_merge() {
        let mut det = row(Some(d(2025, 9, 8)), "Week 1");
        det.slides.push(LinkRef::new("Slides", "https://x.com/w1.pdf"));

        let once = reconcile(vec![det.clone()], vec![], vec![]);
        let twice = reconcile(once.clone(), vec![], vec![]);
        assert_eq!(
            serde_json::to_string(&once).unwrap(),
            serde_json::to_string(&twice).unwrap()
        );
    }
}
