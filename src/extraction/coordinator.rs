//! End-to-end orchestration of one extraction run
//!
//! Discovery, the bounded deterministic fan-out, generative extraction,
//! reconciliation, materialization and persistence, in that order. The
//! syllabus upsert lands before assignment replacement so a failure between
//! the two leaves the previous assignment set intact.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::deterministic::{self, script_bundle};
use super::discovery::SubpageDiscoverer;
use super::fetcher::{extract_page_text, FetchEngine, FetchResult};
use super::genai::GenAiClient;
use super::{materialize, merge};
use crate::config::Config;
use crate::search::SearchProvider;
use crate::store::Store;
use crate::types::{
    CourseIdentity, DeterministicSignals, ExtractionReport, GradingSignal, SyllabusRecord,
    UsageEvent, WeekSignal,
};

/// Runs one full extraction for a course against a shared store
pub struct ExtractionCoordinator {
    config: Config,
    store: Arc<Store>,
    search: Option<Box<dyn SearchProvider>>,
}

impl ExtractionCoordinator {
    pub fn new(config: Config, store: Arc<Store>) -> Self {
        Self {
            config,
            store,
            search: None,
        }
    }

    /// Attach a search provider that contributes extra discovery seeds
    pub fn with_search(mut self, provider: Box<dyn SearchProvider>) -> Self {
        self.search = Some(provider);
        self
    }

    /// Run discovery, extraction, reconciliation and persistence for one
    /// course. Individual page failures shrink the result; configuration and
    /// credential problems fail the run before any network traffic.
    pub async fn run(&self, course: &CourseIdentity) -> anyhow::Result<ExtractionReport> {
        // Fail fast on a missing credential, before any fetching
        let genai = GenAiClient::from_config(&self.config.genai)?;
        let fetcher = Arc::new(FetchEngine::new(&self.config.extraction)?);
        let year = self.config.extraction.resolve_academic_year();

        let mut seeds = course.seed_urls(self.config.discovery.max_seed_urls);
        if let Some(search) = &self.search {
            match search.find_course_pages(course).await {
                Ok(found) => {
                    for url in found {
                        if !seeds.iter().any(|s| s.eq_ignore_ascii_case(&url)) {
                            seeds.push(url);
                        }
                    }
                    seeds.truncate(self.config.discovery.max_seed_urls);
                }
                Err(e) => warn!("Search seeding failed: {}", e),
            }
        }
        if seeds.is_empty() {
            anyhow::bail!("Course '{}' has no seed URLs", course.title);
        }
        info!(
            "Extracting '{}' from {} seed URL(s)",
            course.title,
            seeds.len()
        );

        let discoverer = SubpageDiscoverer::new(&fetcher, &self.config.discovery);
        let discovery = discoverer.discover(&seeds).await;

        // Seed pages were already fetched during discovery; only the
        // discovered candidates go through the bounded fan-out
        let mut pages: Vec<FetchResult> = discovery.seed_pages;
        pages.extend(self.fetch_candidates(&fetcher, discovery.candidates).await);

        let (signals, week_signals, excerpts) =
            self.deterministic_pass(&fetcher, &pages, year).await;
        info!(
            "Deterministic pass: {} rows, {} grading signals, {} week signals from {} page(s)",
            signals.schedule_rows.len(),
            signals.grading_signals.len(),
            week_signals.len(),
            pages.len()
        );

        let prompt = genai.build_prompt(course, &excerpts, &signals);
        let generative = genai.extract(&prompt, year).await?;

        let schedule = merge::reconcile(
            signals.schedule_rows.clone(),
            generative.schedule.clone(),
            week_signals,
        );

        let resources = materialize::derive_resources(
            course,
            &materialize::ResourceInputs {
                generative: &generative.resources,
                recovered: &generative.recovered_urls,
                deterministic_extra: &signals.extra_resources,
                schedule: &schedule,
                source_url: generative.source_url.as_deref(),
                previous: &course.resources,
            },
        );

        let now = Utc::now();
        let existing = self.store.syllabus(&course.id)?;
        let syllabus_id = existing.as_ref().map(|s| s.id).unwrap_or_else(uuid::Uuid::new_v4);
        let retrieved_at = existing.as_ref().map(|s| s.retrieved_at).unwrap_or(now);

        let syllabus = SyllabusRecord {
            id: syllabus_id,
            course_id: course.id,
            source_url: generative.source_url.clone(),
            raw_text: generative.raw_text.clone(),
            content: serde_json::json!({
                "grading": signals.grading_signals,
                "resources": resources,
            }),
            schedule: schedule.clone(),
            retrieved_at,
            updated_at: now,
        };

        // Syllabus and resources land first; the assignment gate runs last
        self.store.put_syllabus(&syllabus)?;
        self.store.put_resources(&course.id, &resources)?;

        let derived = materialize::derive_assignments(
            course.id,
            syllabus_id,
            &schedule,
            &generative.assignments,
            year,
            now,
        );
        let outcome = self.store.replace_assignments(&course.id, &derived)?;

        self.store.record_usage(&UsageEvent {
            provider: self.config.genai.provider.clone(),
            model: self.config.genai.model.clone(),
            prompt_tokens: generative.prompt_tokens,
            completion_tokens: generative.completion_tokens,
            feature: "syllabus_extraction".to_string(),
            prompt_excerpt: generative.prompt_excerpt,
            response_excerpt: generative.raw_text.chars().take(500).collect(),
            recorded_at: now,
        })?;
        self.store.flush()?;

        let (attempts, successes, failures) = fetcher.stats();
        info!(
            "Extraction complete: {} schedule entries, {} resources, {:?} \
             ({} fetches, {} ok, {} failed, {} generative attempt(s))",
            schedule.len(),
            resources.len(),
            outcome,
            attempts,
            successes,
            failures,
            generative.attempts_issued
        );

        Ok(ExtractionReport {
            resource_count: resources.len(),
            schedule_entries: schedule.len(),
            assignments: outcome,
        })
    }

    /// Fetch discovered candidate pages with bounded concurrency. Failures
    /// are logged and dropped.
    async fn fetch_candidates(
        &self,
        fetcher: &Arc<FetchEngine>,
        candidates: Vec<super::discovery::CandidateUrl>,
    ) -> Vec<FetchResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.extraction.max_concurrent_fetches));
        let mut handles = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let fetcher = Arc::clone(fetcher);
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                match fetcher.fetch_page(&candidate.url).await {
                    Ok(page) => Some(page),
                    Err(e) => {
                        warn!("Candidate fetch failed for {}: {}", candidate.url, e);
                        None
                    }
                }
            }));
        }

        futures::future::join_all(handles)
            .await
            .into_iter()
            .filter_map(|joined| joined.ok().flatten())
            .collect()
    }

    /// Run the deterministic parsers over every fetched page, falling back
    /// to script bundles for thin (client-rendered) pages. Also collects the
    /// page-text excerpts for the generative prompt.
    async fn deterministic_pass(
        &self,
        fetcher: &FetchEngine,
        pages: &[FetchResult],
        year: i32,
    ) -> (DeterministicSignals, Vec<WeekSignal>, Vec<(String, String)>) {
        let mut signals = DeterministicSignals::default();
        let mut week_signals: Vec<WeekSignal> = Vec::new();
        let mut excerpts: Vec<(String, String)> = Vec::new();

        for page in pages {
            if !page.is_html() {
                continue;
            }

            let page_signals = deterministic::extract_signals(&page.body, &page.final_url, year);
            signals.absorb(page_signals);

            let text = extract_page_text(&page.body);
            if text.len() < self.config.extraction.thin_page_threshold {
                debug!(
                    "Thin page ({} chars), trying script bundles: {}",
                    text.len(),
                    page.final_url
                );
                let (weeks, grading) = script_bundle::recover_from_scripts(
                    fetcher,
                    &page.body,
                    &page.final_url,
                    self.config.extraction.max_script_bundles,
                )
                .await;
                merge_weeks(&mut week_signals, weeks);
                merge_grading(&mut signals, grading);
            }

            if !text.is_empty() {
                excerpts.push((page.final_url.to_string(), text));
            }
        }

        (signals, week_signals, excerpts)
    }
}

/// Accumulate week signals across pages; same week numbers union with
/// link-level dedup
fn merge_weeks(into: &mut Vec<WeekSignal>, weeks: Vec<WeekSignal>) {
    for week in weeks {
        script_bundle::merge_week(into, week);
    }
    into.sort_by_key(|w| w.week);
}

fn merge_grading(signals: &mut DeterministicSignals, grading: Vec<GradingSignal>) {
    signals.absorb(DeterministicSignals {
        grading_signals: grading,
        ..Default::default()
    });
}
