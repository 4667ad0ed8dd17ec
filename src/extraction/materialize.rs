//! Final resource list and assignment records
//!
//! Derives the course's resource list (domain-deduplicated and
//! relevance-filtered) and a flat assignment set from the merged schedule
//! via three complementary passes. The replace-or-preserve safety gate is
//! enforced at the store, which only swaps persisted rows for a non-empty
//! derived set.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use uuid::Uuid;

use super::genai::ModelAssignment;
use super::{dates, host_of, links};
use crate::types::{
    AssignmentKind, AssignmentRecord, CourseIdentity, ScheduleRow,
};

/// Resources kept after relevance filtering
const MAX_RESOURCES: usize = 25;

static RE_TASK_KEYWORD: OnceLock<Regex> = OnceLock::new();
static RE_DUE_KEYWORD: OnceLock<Regex> = OnceLock::new();
static RE_EXAM_KEYWORD: OnceLock<Regex> = OnceLock::new();

fn re_task_keyword() -> &'static Regex {
    RE_TASK_KEYWORD.get_or_init(|| {
        Regex::new(r"(?i)\b(assignment|homework|hw|pset|problem\s+set|lab|project|quiz)\b").unwrap()
    })
}

fn re_due_keyword() -> &'static Regex {
    RE_DUE_KEYWORD
        .get_or_init(|| Regex::new(r"(?i)\b(due|deadline|out|submit|released)\b").unwrap())
}

fn re_exam_keyword() -> &'static Regex {
    RE_EXAM_KEYWORD.get_or_init(|| Regex::new(r"(?i)\b(exam|midterm|final)\b").unwrap())
}

/// Everything that can contribute resource URLs, in precedence order
pub struct ResourceInputs<'a> {
    pub generative: &'a [String],
    pub recovered: &'a [String],
    pub deterministic_extra: &'a [String],
    pub schedule: &'a [ScheduleRow],
    pub source_url: Option<&'a str>,
    pub previous: &'a [String],
}

/// Union all resource sources, dedup by domain, filter by relevance, keep
/// the top 25.
pub fn derive_resources(course: &CourseIdentity, inputs: &ResourceInputs) -> Vec<String> {
    let mut pool: Vec<String> = Vec::new();
    let mut push = |url: &str| {
        let url = url.trim();
        if !url.is_empty() && !pool.iter().any(|u| u.eq_ignore_ascii_case(url)) {
            pool.push(url.to_string());
        }
    };

    for url in inputs.generative {
        push(url);
    }
    for url in inputs.recovered {
        push(url);
    }
    for url in inputs.deterministic_extra {
        push(url);
    }
    for row in inputs.schedule {
        for url in row.all_link_urls() {
            push(&url);
        }
    }
    if let Some(url) = inputs.source_url {
        push(url);
    }
    for url in inputs.previous {
        push(url);
    }

    let pool: Vec<String> = pool
        .into_iter()
        .filter(|u| !links::is_noisy(u))
        .collect();
    let deduped = links::normalize_domain(&pool);

    let seed_hosts: HashSet<String> = course
        .seed_urls(8)
        .iter()
        .filter_map(|u| host_of(u))
        .collect();

    let mut scored: Vec<(f32, String)> = deduped
        .into_iter()
        .filter_map(|url| {
            let score = score_resource(&url, course, &seed_hosts);
            if score > 0.0 {
                Some((score, url))
            } else {
                None
            }
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored
        .into_iter()
        .take(MAX_RESOURCES)
        .map(|(_, url)| url)
        .collect()
}

/// Relevance score for one resource URL
fn score_resource(url: &str, course: &CourseIdentity, seed_hosts: &HashSet<String>) -> f32 {
    let lower = url.to_lowercase();
    let mut score = 0.0;

    if let Some(host) = host_of(url) {
        if seed_hosts.contains(&host) {
            score += 3.0;
        }
        if host.ends_with(".edu")
            || host.ends_with(".ac.uk")
            || links::is_path_sensitive(&host)
            || host.contains("gradescope")
            || host.contains("edstem")
        {
            score += 2.0;
        }
    }

    for vocab in [
        "syllabus",
        "calendar",
        "schedule",
        "resource",
        "material",
        "assignment",
        "lecture",
    ] {
        if lower.contains(vocab) {
            score += 2.0;
            break;
        }
    }

    if let Some(code) = &course.code {
        let compact = code.replace(' ', "").to_lowercase();
        if !compact.is_empty() && lower.replace(' ', "").contains(&compact) {
            score += 2.0;
        }
    }
    let title_hit = course
        .title
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .any(|w| lower.contains(w));
    if title_hit {
        score += 1.0;
    }

    score
}

/// Derive the flat assignment set from the merged schedule plus the model's
/// top-level assignments array. Three passes, deduped by
/// `(kind, lowercased label, due_on)` with earlier passes winning.
pub fn derive_assignments(
    course_id: Uuid,
    syllabus_id: Uuid,
    schedule: &[ScheduleRow],
    model_assignments: &[ModelAssignment],
    year: i32,
    now: DateTime<Utc>,
) -> Vec<AssignmentRecord> {
    let mut records: Vec<AssignmentRecord> = Vec::new();
    let mut seen: HashSet<(AssignmentKind, String, Option<chrono::NaiveDate>)> = HashSet::new();

    let mut push = |record: AssignmentRecord| {
        if record.label.trim().is_empty() {
            return;
        }
        if seen.insert(record.dedup_key()) {
            records.push(record);
        }
    };

    // Pass 1: explicit per-row task entries, highest confidence
    for row in schedule {
        let categories = [
            (AssignmentKind::Assignment, &row.assignments),
            (AssignmentKind::Lab, &row.labs),
            (AssignmentKind::Exam, &row.exams),
            (AssignmentKind::Project, &row.projects),
        ];
        for (kind, tasks) in categories {
            for task in tasks.iter() {
                push(AssignmentRecord {
                    course_id,
                    syllabus_id,
                    kind,
                    label: task.label.clone(),
                    due_on: task.due_date.or(row.date),
                    url: non_empty(&task.url),
                    description: None,
                    source_sequence: row.sequence.clone(),
                    source_row_date: row.date,
                    retrieved_at: now,
                    updated_at: now,
                });
            }
        }
    }

    // Pass 2: heuristic inference from row title + description text
    for row in schedule {
        let text = format!(
            "{} {}",
            row.title.as_deref().unwrap_or(""),
            row.description.as_deref().unwrap_or("")
        );
        let task_hit = re_task_keyword().is_match(&text) && re_due_keyword().is_match(&text);
        let exam_hit = re_exam_keyword().is_match(&text);
        if !task_hit && !exam_hit {
            continue;
        }

        let kind = infer_kind(&text);
        let label = row
            .title
            .clone()
            .unwrap_or_else(|| text.trim().chars().take(80).collect());
        let due_on = row
            .description
            .as_deref()
            .and_then(|d| dates::find_date_in_text(d, year))
            .or(row.date);

        push(AssignmentRecord {
            course_id,
            syllabus_id,
            kind,
            label,
            due_on,
            url: None,
            description: row.description.clone(),
            source_sequence: row.sequence.clone(),
            source_row_date: row.date,
            retrieved_at: now,
            updated_at: now,
        });
    }

    // Pass 3: the model's top-level assignments array, looser schema
    for assignment in model_assignments {
        let Some(label) = assignment.label.as_deref().filter(|l| !l.trim().is_empty()) else {
            continue;
        };
        let kind = assignment
            .kind
            .as_deref()
            .map(AssignmentKind::parse)
            .unwrap_or_else(|| infer_kind(label));
        push(AssignmentRecord {
            course_id,
            syllabus_id,
            kind,
            label: label.to_string(),
            due_on: assignment
                .due_date
                .as_deref()
                .and_then(|d| dates::parse_date(d, year)),
            url: assignment.url.as_deref().and_then(non_empty),
            description: assignment.description.clone(),
            source_sequence: None,
            source_row_date: None,
            retrieved_at: now,
            updated_at: now,
        });
    }

    records
}

/// Kind inferred from free text keywords
fn infer_kind(text: &str) -> AssignmentKind {
    let lower = text.to_lowercase();
    let has = |w: &str| {
        lower
            .split(|c: char| !c.is_alphanumeric())
            .any(|token| token == w)
    };
    if has("lab") || has("labs") {
        AssignmentKind::Lab
    } else if has("project") || has("projects") {
        AssignmentKind::Project
    } else if re_exam_keyword().is_match(&lower) {
        AssignmentKind::Exam
    } else if has("quiz") || has("quizzes") {
        AssignmentKind::Quiz
    } else if has("homework") || has("assignment") || has("hw") || has("pset") {
        AssignmentKind::Assignment
    } else {
        AssignmentKind::Other
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskRef;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn course() -> CourseIdentity {
        CourseIdentity {
            id: Uuid::new_v4(),
            code: Some("CS 4410".to_string()),
            title: "Operating Systems".to_string(),
            institution: None,
            homepage: Some("https://cs.example.edu/cs4410".to_string()),
            known_urls: vec![],
            resources: vec![],
        }
    }

    #[test]
    fn test_resources_domain_dedup_and_ranking() {
        let course = course();
        let schedule = vec![];
        let inputs = ResourceInputs {
            generative: &[
                "https://cs.example.edu/cs4410/syllabus".to_string(),
                "https://cs.example.edu/cs4410/staff".to_string(),
                "https://github.com/cs4410/hw1".to_string(),
                "https://github.com/cs4410/hw2".to_string(),
                "https://facebook.com/cs4410".to_string(),
            ],
            recovered: &[],
            deterministic_extra: &[],
            schedule: &schedule,
            source_url: None,
            previous: &[],
        };

        let resources = derive_resources(&course, &inputs);
        // One per plain domain, noisy host dropped, github path-sensitive
        assert!(resources.contains(&"https://cs.example.edu/cs4410/syllabus".to_string()));
        assert!(resources.contains(&"https://github.com/cs4410/hw1".to_string()));
        assert!(resources.contains(&"https://github.com/cs4410/hw2".to_string()));
        assert!(!resources.iter().any(|u| u.contains("facebook")));
        assert_eq!(
            resources
                .iter()
                .filter(|u| u.contains("cs.example.edu"))
                .count(),
            1
        );
        // Syllabus URL outranks the bare code-hosting links
        assert_eq!(resources[0], "https://cs.example.edu/cs4410/syllabus");
    }

    #[test]
    fn test_resources_capped() {
        let course = course();
        let urls: Vec<String> = (0..40)
            .map(|i| format!("https://host{i}.edu/cs4410/syllabus"))
            .collect();
        let schedule = vec![];
        let inputs = ResourceInputs {
            generative: &urls,
            recovered: &[],
            deterministic_extra: &[],
            schedule: &schedule,
            source_url: None,
            previous: &[],
        };
        assert_eq!(derive_resources(&course, &inputs).len(), MAX_RESOURCES);
    }

    #[test]
    fn test_explicit_tasks_extracted() {
        let mut row = ScheduleRow {
            title: Some("Week 2".to_string()),
            date: Some(d(2025, 9, 15)),
            ..Default::default()
        };
        row.assignments.push(TaskRef {
            label: "HW1".to_string(),
            url: "https://x.edu/hw1".to_string(),
            due_date: Some(d(2025, 9, 22)),
        });
        row.labs.push(TaskRef::new("Lab 1", "https://x.edu/lab1"));

        let records = derive_assignments(
            Uuid::new_v4(),
            Uuid::new_v4(),
            &[row],
            &[],
            2025,
            Utc::now(),
        );

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, AssignmentKind::Assignment);
        assert_eq!(records[0].due_on, Some(d(2025, 9, 22)));
        // Task without its own due date inherits the row date
        assert_eq!(records[1].kind, AssignmentKind::Lab);
        assert_eq!(records[1].due_on, Some(d(2025, 9, 15)));
    }

    #[test]
    fn test_heuristic_pass_from_description() {
        let row = ScheduleRow {
            title: Some("Week 5".to_string()),
            date: Some(d(2025, 10, 6)),
            description: Some("Homework 3 due Oct 13 before class".to_string()),
            ..Default::default()
        };

        let records = derive_assignments(
            Uuid::new_v4(),
            Uuid::new_v4(),
            &[row],
            &[],
            2025,
            Utc::now(),
        );

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, AssignmentKind::Assignment);
        assert_eq!(records[0].due_on, Some(d(2025, 10, 13)));
    }

    #[test]
    fn test_exam_keyword_alone_suffices() {
        let row = ScheduleRow {
            title: Some("Midterm exam".to_string()),
            date: Some(d(2025, 10, 20)),
            ..Default::default()
        };
        let records = derive_assignments(
            Uuid::new_v4(),
            Uuid::new_v4(),
            &[row],
            &[],
            2025,
            Utc::now(),
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, AssignmentKind::Exam);
    }

    #[test]
    fn test_model_assignments_validated_and_deduped() {
        let mut row = ScheduleRow {
            title: Some("Week 2".to_string()),
            date: Some(d(2025, 9, 15)),
            ..Default::default()
        };
        row.assignments.push(TaskRef {
            label: "HW1".to_string(),
            url: "https://x.edu/hw1".to_string(),
            due_date: Some(d(2025, 9, 22)),
        });

        let model = vec![
            ModelAssignment {
                kind: Some("homework".to_string()),
                label: Some("hw1".to_string()),
                due_date: Some("2025-09-22".to_string()),
                ..Default::default()
            },
            ModelAssignment {
                label: Some("Final project".to_string()),
                due_date: Some("2025-12-10".to_string()),
                ..Default::default()
            },
            ModelAssignment {
                label: Some("   ".to_string()),
                ..Default::default()
            },
        ];

        let records = derive_assignments(
            Uuid::new_v4(),
            Uuid::new_v4(),
            &[row],
            &model,
            2025,
            Utc::now(),
        );

        // hw1 duplicate collapses onto the explicit pass 1 record; blank
        // label dropped; project kind inferred from its label
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].kind, AssignmentKind::Project);
    }
}
