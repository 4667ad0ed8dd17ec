//! Integration tests for courseintel
//!
//! These exercise the full deterministic-parse, reconcile, materialize and
//! persist pipeline on fixture pages, without any network traffic.

use chrono::{NaiveDate, Utc};
use courseintel::{
    extraction::{
        deterministic::extract_signals,
        genai::lenient_parse,
        materialize::{derive_assignments, derive_resources, ResourceInputs},
        merge::reconcile,
    },
    store::Store,
    types::{AssignmentOutcome, CourseIdentity, SyllabusRecord},
};
use std::sync::Arc;
use tempfile::TempDir;
use url::Url;
use uuid::Uuid;

const SYLLABUS_PAGE: &str = r#"
<html><body>
  <h1>CS 4410 Operating Systems</h1>
  <table>
    <tr><th>Date</th><th>Topic</th><th>Materials</th></tr>
    <tr><td>Sep 8, 2025</td><td>Introduction</td>
        <td><a href="https://cs.example.edu/w1.pdf">Slides</a></td></tr>
    <tr><td>Sep 15, 2025</td><td>Processes</td>
        <td><a href="https://cs.example.edu/hw1">Homework 1</a></td></tr>
  </table>
  <h2>Grading</h2>
  <ul>
    <li>Homework: 40%</li>
    <li>Final exam: 60%</li>
    <li>Late penalty: 10% per day</li>
  </ul>
</body></html>"#;

const GEN_RESPONSE: &str = r#"{
  "source_url": "https://cs.example.edu/syllabus",
  "resources": ["https://cs.example.edu/syllabus", "https://github.com/cs4410/handouts"],
  "schedule": [
    {"title": "Introduction", "date": "2025-09-08",
     "videos": [{"label": "Recording", "url": "https://cs.example.edu/w1.mp4"}]},
    {"title": "Threads", "date": "2025-09-22",
     "assignments": [{"label": "HW2", "url": "https://cs.example.edu/hw2", "due_date": "2025-09-29"}]}
  ],
  "assignments": [{"kind": "exam", "label": "Final exam", "due_date": "2025-12-15"}]
}"#;

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

fn pipeline(
    course: &CourseIdentity,
) -> (
    Vec<courseintel::types::ScheduleRow>,
    Vec<String>,
    Vec<courseintel::types::AssignmentRecord>,
) {
    let url = Url::parse("https://cs.example.edu/cs4410/syllabus").unwrap();
    let signals = extract_signals(SYLLABUS_PAGE, &url, 2025);
    assert!(signals.schedule_rows.len() >= 2);
    assert_eq!(signals.grading_signals.len(), 2);

    let parsed = lenient_parse(GEN_RESPONSE).unwrap();
    let gen_rows: Vec<_> = parsed
        .schedule
        .into_iter()
        .map(|r| r.into_schedule_row(2025))
        .collect();

    let schedule = reconcile(signals.schedule_rows.clone(), gen_rows, vec![]);
    let resources = derive_resources(
        course,
        &ResourceInputs {
            generative: &parsed.resources,
            recovered: &[],
            deterministic_extra: &signals.extra_resources,
            schedule: &schedule,
            source_url: parsed.source_url.as_deref(),
            previous: &course.resources,
        },
    );
    let assignments = derive_assignments(
        course.id,
        Uuid::new_v4(),
        &schedule,
        &parsed.assignments,
        2025,
        Utc::now(),
    );
    (schedule, resources, assignments)
}

#[test]
fn test_full_reconciliation_pipeline() {
    let course = course();
    let (schedule, resources, assignments) = pipeline(&course);

    // Sep 8 appears in both passes and merges into one row carrying the
    // deterministic slide link and the generative video link
    let sep8: Vec<_> = schedule
        .iter()
        .filter(|r| r.date == NaiveDate::from_ymd_opt(2025, 9, 8))
        .collect();
    assert_eq!(sep8.len(), 1);
    assert!(!sep8[0].slides.is_empty());
    assert!(!sep8[0].videos.is_empty());

    // Generative-only row survives
    assert!(schedule
        .iter()
        .any(|r| r.title.as_deref() == Some("Threads")));

    // Dated rows come out in order
    let dates: Vec<_> = schedule.iter().filter_map(|r| r.date).collect();
    let mut sorted = dates.clone();
    sorted.sort();
    assert_eq!(dates, sorted);

    // Resource list keeps the syllabus URL and the companion repo
    assert!(resources.iter().any(|u| u.contains("syllabus")));
    assert!(resources.iter().any(|u| u.contains("github.com")));

    // HW1 (deterministic), HW2 (generative) and the final exam all land
    assert!(assignments.iter().any(|a| a.label == "Homework 1"));
    assert!(assignments
        .iter()
        .any(|a| a.label == "HW2"
            && a.due_on == NaiveDate::from_ymd_opt(2025, 9, 29)));
    assert!(assignments.iter().any(|a| a.label == "Final exam"));
}

#[test]
fn test_pipeline_is_idempotent() {
    let course = course();
    let (schedule_a, resources_a, assignments_a) = pipeline(&course);
    let (schedule_b, resources_b, assignments_b) = pipeline(&course);

    assert_eq!(schedule_a.len(), schedule_b.len());
    assert_eq!(resources_a, resources_b);
    let labels_a: Vec<_> = assignments_a.iter().map(|a| &a.label).collect();
    let labels_b: Vec<_> = assignments_b.iter().map(|a| &a.label).collect();
    assert_eq!(labels_a, labels_b);
}

#[test]
fn test_persistence_and_never_erase() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(Store::open(temp_dir.path()).unwrap());
    let course = course();
    let (schedule, resources, assignments) = pipeline(&course);
    assert!(!assignments.is_empty());

    let now = Utc::now();
    let syllabus = SyllabusRecord {
        id: Uuid::new_v4(),
        course_id: course.id,
        source_url: Some("https://cs.example.edu/syllabus".to_string()),
        raw_text: GEN_RESPONSE.to_string(),
        content: serde_json::json!({}),
        schedule: schedule.clone(),
        retrieved_at: now,
        updated_at: now,
    };
    store.put_syllabus(&syllabus).unwrap();
    store.put_resources(&course.id, &resources).unwrap();

    let outcome = store.replace_assignments(&course.id, &assignments).unwrap();
    assert_eq!(outcome, AssignmentOutcome::Persisted(assignments.len()));

    // A later run that derives nothing must not erase what's stored
    let outcome = store.replace_assignments(&course.id, &[]).unwrap();
    assert_eq!(outcome, AssignmentOutcome::Preserved(assignments.len()));
    assert_eq!(
        store.assignments(&course.id).unwrap().len(),
        assignments.len()
    );

    // Syllabus round-trips with its schedule intact
    let loaded = store.syllabus(&course.id).unwrap().unwrap();
    assert_eq!(loaded.schedule.len(), schedule.len());
    assert_eq!(store.resources(&course.id).unwrap(), resources);
}

#[test]
fn test_empty_generative_pass_falls_back_to_deterministic() {
    let url = Url::parse("https://cs.example.edu/cs4410/syllabus").unwrap();
    let signals = extract_signals(SYLLABUS_PAGE, &url, 2025);
    let schedule = reconcile(signals.schedule_rows.clone(), vec![], vec![]);

    assert!(schedule
        .iter()
        .any(|r| r.date == NaiveDate::from_ymd_opt(2025, 9, 8)));
    assert!(schedule.iter().any(|r| !r.assignments.is_empty()));
}
