//! Core data types for the extraction and reconciliation engine

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A labeled hyperlink. Dedup equality is case-insensitive URL match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkRef {
    pub label: String,
    pub url: String,
}

impl LinkRef {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }

    /// Case-insensitive URL equality used for link-level dedup
    pub fn same_url(&self, other: &LinkRef) -> bool {
        self.url.eq_ignore_ascii_case(&other.url)
    }
}

/// A link that carries an optional due date (assignments, labs, exams, projects)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRef {
    pub label: String,
    pub url: String,
    pub due_date: Option<NaiveDate>,
}

impl TaskRef {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
            due_date: None,
        }
    }
}

/// Link data keyed by week number, reconstructed independently of row-level
/// schedule parsing (e.g. from script bundles on client-rendered pages).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeekSignal {
    pub week: u32,
    pub title: String,
    pub slides: Vec<LinkRef>,
    pub readings: Vec<LinkRef>,
    pub assignments: Vec<LinkRef>,
}

/// One grading category with its weight in percent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradingSignal {
    pub component: String,
    pub weight: f32,
}

/// The canonical per-session schedule unit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleRow {
    pub sequence: Option<String>,
    pub title: Option<String>,
    pub date: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub instructor: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub slides: Vec<LinkRef>,
    #[serde(default)]
    pub videos: Vec<LinkRef>,
    #[serde(default)]
    pub readings: Vec<LinkRef>,
    #[serde(default)]
    pub modules: Vec<LinkRef>,
    #[serde(default)]
    pub assignments: Vec<TaskRef>,
    #[serde(default)]
    pub labs: Vec<TaskRef>,
    #[serde(default)]
    pub exams: Vec<TaskRef>,
    #[serde(default)]
    pub projects: Vec<TaskRef>,
}

impl ScheduleRow {
    /// Identity key for merge purposes. Rows without both a date and a title
    /// have no usable key and are appended rather than merged.
    pub fn merge_key(&self) -> Option<(NaiveDate, String)> {
        match (self.date, self.title.as_deref()) {
            (Some(date), Some(title)) if !title.trim().is_empty() => {
                Some((date, title.trim().to_lowercase()))
            }
            _ => None,
        }
    }

    /// True when the row carries no links in any category
    pub fn has_no_links(&self) -> bool {
        self.slides.is_empty()
            && self.videos.is_empty()
            && self.readings.is_empty()
            && self.modules.is_empty()
            && self.assignments.is_empty()
            && self.labs.is_empty()
            && self.exams.is_empty()
            && self.projects.is_empty()
    }

    /// Every link URL embedded anywhere in the row
    pub fn all_link_urls(&self) -> Vec<String> {
        let mut urls = Vec::new();
        for link in self
            .slides
            .iter()
            .chain(&self.videos)
            .chain(&self.readings)
            .chain(&self.modules)
        {
            urls.push(link.url.clone());
        }
        for task in self
            .assignments
            .iter()
            .chain(&self.labs)
            .chain(&self.exams)
            .chain(&self.projects)
        {
            urls.push(task.url.clone());
        }
        urls
    }
}

/// Per-URL output bundle of the deterministic extraction pass
#[derive(Debug, Clone, Default)]
pub struct DeterministicSignals {
    pub schedule_rows: Vec<ScheduleRow>,
    pub grading_signals: Vec<GradingSignal>,
    pub extra_resources: Vec<String>,
}

impl DeterministicSignals {
    pub fn is_empty(&self) -> bool {
        self.schedule_rows.is_empty()
            && self.grading_signals.is_empty()
            && self.extra_resources.is_empty()
    }

    /// Fold another bundle into this one. Grading components collapse
    /// case-insensitively, first seen wins. Schedule rows are concatenated
    /// here; key-based row merging happens in the reconciliation step.
    pub fn absorb(&mut self, other: DeterministicSignals) {
        self.schedule_rows.extend(other.schedule_rows);
        for signal in other.grading_signals {
            let dup = self
                .grading_signals
                .iter()
                .any(|g| g.component.eq_ignore_ascii_case(&signal.component));
            if !dup {
                self.grading_signals.push(signal);
            }
        }
        self.extra_resources.extend(other.extra_resources);
    }
}

/// Kind of a derived task record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentKind {
    Assignment,
    Lab,
    Exam,
    Project,
    Quiz,
    Other,
}

impl AssignmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::Lab => "lab",
            Self::Exam => "exam",
            Self::Project => "project",
            Self::Quiz => "quiz",
            Self::Other => "other",
        }
    }

    /// Lenient parse used for model-returned kind strings
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "assignment" | "homework" | "hw" | "problem set" | "pset" => Self::Assignment,
            "lab" | "laboratory" => Self::Lab,
            "exam" | "midterm" | "final" | "test" => Self::Exam,
            "project" => Self::Project,
            "quiz" => Self::Quiz,
            _ => Self::Other,
        }
    }
}

/// A persisted task record derived from the merged schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub course_id: Uuid,
    pub syllabus_id: Uuid,
    pub kind: AssignmentKind,
    pub label: String,
    pub due_on: Option<NaiveDate>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub source_sequence: Option<String>,
    pub source_row_date: Option<NaiveDate>,
    pub retrieved_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AssignmentRecord {
    /// Dedup key across the three extraction passes
    pub fn dedup_key(&self) -> (AssignmentKind, String, Option<NaiveDate>) {
        (self.kind, self.label.trim().to_lowercase(), self.due_on)
    }
}

/// The persisted one-per-course syllabus record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyllabusRecord {
    pub id: Uuid,
    pub course_id: Uuid,
    pub source_url: Option<String>,
    pub raw_text: String,
    /// Structured content including the grading breakdown
    pub content: serde_json::Value,
    pub schedule: Vec<ScheduleRow>,
    pub retrieved_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Course identity and known context, supplied by the course store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseIdentity {
    pub id: Uuid,
    pub code: Option<String>,
    pub title: String,
    pub institution: Option<String>,
    pub homepage: Option<String>,
    #[serde(default)]
    pub known_urls: Vec<String>,
    /// Previously persisted resources for this course
    #[serde(default)]
    pub resources: Vec<String>,
}

impl CourseIdentity {
    /// Seed URLs for discovery: homepage plus known resource URLs, capped
    pub fn seed_urls(&self, cap: usize) -> Vec<String> {
        let mut seeds: Vec<String> = Vec::new();
        if let Some(home) = &self.homepage {
            seeds.push(home.clone());
        }
        for url in &self.known_urls {
            if !seeds.iter().any(|s| s.eq_ignore_ascii_case(url)) {
                seeds.push(url.clone());
            }
        }
        seeds.truncate(cap);
        seeds
    }
}

/// Usage-accounting event emitted once per generative run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    pub provider: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub feature: String,
    pub prompt_excerpt: String,
    pub response_excerpt: String,
    pub recorded_at: DateTime<Utc>,
}

/// Outcome of the assignment safety gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentOutcome {
    /// Derived rows replaced the persisted set
    Persisted(usize),
    /// Derived set was empty; existing rows were left untouched
    Preserved(usize),
}

/// Caller-visible summary of one extraction run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub resource_count: usize,
    pub schedule_entries: usize,
    pub assignments: AssignmentOutcome,
}
