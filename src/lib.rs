//! CourseIntel: Course Intelligence Extraction & Reconciliation Engine
//!
//! Turns a course's seed URLs into one canonical syllabus, featuring:
//! - Ranked same-site subpage discovery from seed URLs
//! - Deterministic heuristic parsers over page structure
//! - Script-bundle recovery for client-rendered pages
//! - Generative extraction with a quality-gate retry ladder
//! - Reconciliation of all signal sources into one schedule
//! - Assignment materialization behind a never-erase safety gate
//! - Embedded persistence for syllabi, assignments and usage accounting

pub mod config;
pub mod extraction;
pub mod search;
pub mod store;
pub mod types;

pub use config::Config;
pub use types::*;
