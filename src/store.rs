//! Embedded persistence for courses, syllabi, assignments and usage
//!
//! One sled database with a tree per record family. Values are JSON; keys
//! are the course id (one syllabus, one assignment set and one resource
//! list per course) except usage events, which key by timestamp so they
//! accumulate. Assignment replacement goes through a safety gate: an empty
//! derived set never erases previously persisted rows.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{AssignmentOutcome, AssignmentRecord, SyllabusRecord, UsageEvent};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Embedded store backing the extraction engine
pub struct Store {
    db: sled::Db,
    syllabi: sled::Tree,
    assignments: sled::Tree,
    resources: sled::Tree,
    usage: sled::Tree,
}

impl Store {
    /// Open (or create) the database under the given data directory.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let db = sled::open(data_dir)?;
        let syllabi = db.open_tree("syllabi")?;
        let assignments = db.open_tree("assignments")?;
        let resources = db.open_tree("resources")?;
        let usage = db.open_tree("usage")?;
        debug!("Store opened at {}", data_dir.display());
        Ok(Self {
            db,
            syllabi,
            assignments,
            resources,
            usage,
        })
    }

    /// The persisted syllabus for a course, if any
    pub fn syllabus(&self, course_id: &Uuid) -> Result<Option<SyllabusRecord>, StoreError> {
        match self.syllabi.get(course_id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Insert or replace the course's syllabus record. The record id stays
    /// stable across runs when callers reuse the existing one.
    pub fn put_syllabus(&self, record: &SyllabusRecord) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(record)?;
        self.syllabi.insert(record.course_id.as_bytes(), bytes)?;
        Ok(())
    }

    /// The persisted assignment set for a course
    pub fn assignments(&self, course_id: &Uuid) -> Result<Vec<AssignmentRecord>, StoreError> {
        match self.assignments.get(course_id.as_bytes())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Replace the course's assignment set, unless the derived set is empty:
    /// an extraction that found nothing must not erase rows a previous run
    /// persisted.
    pub fn replace_assignments(
        &self,
        course_id: &Uuid,
        derived: &[AssignmentRecord],
    ) -> Result<AssignmentOutcome, StoreError> {
        if derived.is_empty() {
            let existing = self.assignments(course_id)?.len();
            info!(
                "Derived assignment set empty; preserving {} existing row(s)",
                existing
            );
            return Ok(AssignmentOutcome::Preserved(existing));
        }

        let bytes = serde_json::to_vec(derived)?;
        self.assignments.insert(course_id.as_bytes(), bytes)?;
        Ok(AssignmentOutcome::Persisted(derived.len()))
    }

    /// The persisted resource list for a course
    pub fn resources(&self, course_id: &Uuid) -> Result<Vec<String>, StoreError> {
        match self.resources.get(course_id.as_bytes())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Replace the course's resource list
    pub fn put_resources(&self, course_id: &Uuid, urls: &[String]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(urls)?;
        self.resources.insert(course_id.as_bytes(), bytes)?;
        Ok(())
    }

    /// Append one usage-accounting event
    pub fn record_usage(&self, event: &UsageEvent) -> Result<(), StoreError> {
        // Timestamp-prefixed key keeps events ordered; the random suffix
        // avoids collisions within one millisecond
        let mut key = Vec::with_capacity(24);
        key.extend_from_slice(&event.recorded_at.timestamp_millis().to_be_bytes());
        key.extend_from_slice(Uuid::new_v4().as_bytes());
        let bytes = serde_json::to_vec(event)?;
        self.usage.insert(key, bytes)?;
        Ok(())
    }

    /// The most recent usage events, newest first
    pub fn recent_usage(&self, limit: usize) -> Result<Vec<UsageEvent>, StoreError> {
        let mut events = Vec::new();
        for item in self.usage.iter().rev().take(limit) {
            let (_, bytes) = item?;
            events.push(serde_json::from_slice(&bytes)?);
        }
        Ok(events)
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AssignmentKind;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(course_id: Uuid, label: &str) -> AssignmentRecord {
        AssignmentRecord {
            course_id,
            syllabus_id: Uuid::new_v4(),
            kind: AssignmentKind::Assignment,
            label: label.to_string(),
            due_on: None,
            url: None,
            description: None,
            source_sequence: None,
            source_row_date: None,
            retrieved_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_syllabus_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let course_id = Uuid::new_v4();

        assert!(store.syllabus(&course_id).unwrap().is_none());

        let syllabus = SyllabusRecord {
            id: Uuid::new_v4(),
            course_id,
            source_url: Some("https://x.edu/syllabus".to_string()),
            raw_text: "Week 1".to_string(),
            content: serde_json::json!({"grading": []}),
            schedule: vec![],
            retrieved_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.put_syllabus(&syllabus).unwrap();

        let loaded = store.syllabus(&course_id).unwrap().unwrap();
        assert_eq!(loaded.id, syllabus.id);
        assert_eq!(loaded.source_url.as_deref(), Some("https://x.edu/syllabus"));
    }

    #[test]
    fn test_empty_set_preserves_existing_assignments() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let course_id = Uuid::new_v4();

        let outcome = store
            .replace_assignments(&course_id, &[record(course_id, "HW1"), record(course_id, "HW2")])
            .unwrap();
        assert_eq!(outcome, AssignmentOutcome::Persisted(2));

        // A later run that derives nothing leaves the rows alone
        let outcome = store.replace_assignments(&course_id, &[]).unwrap();
        assert_eq!(outcome, AssignmentOutcome::Preserved(2));
        assert_eq!(store.assignments(&course_id).unwrap().len(), 2);
    }

    #[test]
    fn test_nonempty_set_replaces() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let course_id = Uuid::new_v4();

        store
            .replace_assignments(&course_id, &[record(course_id, "HW1"), record(course_id, "HW2")])
            .unwrap();
        store
            .replace_assignments(&course_id, &[record(course_id, "HW3")])
            .unwrap();

        let rows = store.assignments(&course_id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].label, "HW3");
    }

    #[test]
    fn test_usage_events_accumulate() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();

        for i in 0..3 {
            store
                .record_usage(&UsageEvent {
                    provider: "openai".to_string(),
                    model: "gpt-4o-mini".to_string(),
                    prompt_tokens: 100 + i,
                    completion_tokens: 50,
                    feature: "syllabus_extraction".to_string(),
                    prompt_excerpt: String::new(),
                    response_excerpt: String::new(),
                    recorded_at: Utc::now(),
                })
                .unwrap();
        }

        assert_eq!(store.recent_usage(10).unwrap().len(), 3);
        assert_eq!(store.recent_usage(2).unwrap().len(), 2);
    }

    #[test]
    fn test_resources_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let course_id = Uuid::new_v4();

        store
            .put_resources(&course_id, &["https://x.edu/a".to_string()])
            .unwrap();
        assert_eq!(store.resources(&course_id).unwrap().len(), 1);
    }
}
