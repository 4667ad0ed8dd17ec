//! Optional web-search seeding for discovery
//!
//! When a course has few or no known URLs, a search provider can contribute
//! extra seed candidates. Off by default; the engine works entirely from
//! stored course URLs without one.

use async_trait::async_trait;

use crate::types::CourseIdentity;

/// Seam for an external search backend
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Candidate course-page URLs for a course, best first
    async fn find_course_pages(&self, course: &CourseIdentity) -> anyhow::Result<Vec<String>>;
}

/// Provider that never returns results, for configurations without search
pub struct DisabledSearch;

#[async_trait]
impl SearchProvider for DisabledSearch {
    async fn find_course_pages(&self, _course: &CourseIdentity) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_disabled_search_is_empty() {
        let course = CourseIdentity {
            id: Uuid::new_v4(),
            code: None,
            title: "Operating Systems".to_string(),
            institution: None,
            homepage: None,
            known_urls: vec![],
            resources: vec![],
        };
        assert!(DisabledSearch
            .find_course_pages(&course)
            .await
            .unwrap()
            .is_empty());
    }
}
