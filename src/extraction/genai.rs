//! Generative extraction client
//!
//! Assembles one prompt from the course identity, deterministic signals and
//! short page excerpts, calls the configured text-generation provider, and
//! lenient-parses the response into a candidate syllabus. Weak results go
//! through a quality-gate retry ladder; the best attempt actually issued
//! wins and token usage accumulates across all of them.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::dates;
use crate::config::GenAiConfig;
use crate::types::{CourseIdentity, DeterministicSignals, LinkRef, ScheduleRow, TaskRef};

static RE_URL: OnceLock<Regex> = OnceLock::new();
static RE_SOURCE_URL: OnceLock<Regex> = OnceLock::new();
static RE_WEEK_LINE: OnceLock<Regex> = OnceLock::new();

fn re_url() -> &'static Regex {
    RE_URL.get_or_init(|| Regex::new(r#"https?://[^\s"'<>\\)\]]+"#).unwrap())
}

fn re_source_url() -> &'static Regex {
    RE_SOURCE_URL
        .get_or_init(|| Regex::new(r#""source_url"\s*:\s*"(https?://[^"]+)""#).unwrap())
}

fn re_week_line() -> &'static Regex {
    RE_WEEK_LINE.get_or_init(|| Regex::new(r"(?i)\b(week|lecture|session)\s*\d+").unwrap())
}

/// Errors from the generative client
#[derive(Debug, Error)]
pub enum GenAiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Provider returned no completion")]
    EmptyCompletion,
    #[error("Provider error {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("Response claims a source_url that cannot be recovered")]
    CorruptSourceUrl,
}

/// One raw completion plus its token accounting
#[derive(Debug, Clone)]
pub struct GenerationChunk {
    pub text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Seam for the text-generation provider, so the retry ladder is testable
/// without a network
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<GenerationChunk, GenAiError>;
}

/// OpenAI-compatible chat-completions provider
pub struct ChatCompletionsProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl ChatCompletionsProvider {
    pub fn new(config: &GenAiConfig, api_key: String) -> Result<Self, GenAiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsProvider {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<GenerationChunk, GenAiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": max_tokens,
            "temperature": 0.2,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenAiError::Provider {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let usage = parsed.usage.unwrap_or(ChatUsage {
            prompt_tokens: 0,
            completion_tokens: 0,
        });
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(GenAiError::EmptyCompletion)?;

        Ok(GenerationChunk {
            text,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        })
    }
}

// ---------------------------------------------------------------------------
// Lenient response schema
// ---------------------------------------------------------------------------

/// Model-returned syllabus, tolerant of partial and loosely-typed fields
#[derive(Debug, Default, Deserialize)]
pub struct ModelSyllabus {
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub schedule: Vec<ModelScheduleRow>,
    #[serde(default)]
    pub assignments: Vec<ModelAssignment>,
    #[serde(default)]
    pub source_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelScheduleRow {
    #[serde(default)]
    pub sequence: Option<serde_json::Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub date_end: Option<String>,
    #[serde(default)]
    pub instructor: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub slides: Vec<ModelLink>,
    #[serde(default)]
    pub videos: Vec<ModelLink>,
    #[serde(default)]
    pub readings: Vec<ModelLink>,
    #[serde(default)]
    pub modules: Vec<ModelLink>,
    #[serde(default)]
    pub assignments: Vec<ModelLink>,
    #[serde(default)]
    pub labs: Vec<ModelLink>,
    #[serde(default)]
    pub exams: Vec<ModelLink>,
    #[serde(default)]
    pub projects: Vec<ModelLink>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelLink {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
}

/// Looser top-level assignment shape, validated independently downstream
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ModelAssignment {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ModelScheduleRow {
    /// Convert into a canonical row, parsing date strings leniently
    pub fn into_schedule_row(self, year: i32) -> ScheduleRow {
        let to_links = |links: Vec<ModelLink>| -> Vec<LinkRef> {
            links
                .into_iter()
                .filter_map(|l| {
                    let url = l.url?;
                    Some(LinkRef::new(l.label.unwrap_or_else(|| "link".to_string()), url))
                })
                .collect()
        };
        let to_tasks = |links: Vec<ModelLink>| -> Vec<TaskRef> {
            links
                .into_iter()
                .filter_map(|l| {
                    let url = l.url.unwrap_or_default();
                    let label = l.label?;
                    let due_date = l.due_date.as_deref().and_then(|d| dates::parse_date(d, year));
                    Some(TaskRef {
                        label,
                        url,
                        due_date,
                    })
                })
                .collect()
        };

        ScheduleRow {
            sequence: self.sequence.map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            }),
            title: self.title,
            date: self.date.as_deref().and_then(|d| dates::parse_date(d, year)),
            date_end: self
                .date_end
                .as_deref()
                .and_then(|d| dates::parse_date(d, year)),
            instructor: self.instructor,
            topics: self.topics,
            description: self.description,
            slides: to_links(self.slides),
            videos: to_links(self.videos),
            readings: to_links(self.readings),
            modules: to_links(self.modules),
            assignments: to_tasks(self.assignments),
            labs: to_tasks(self.labs),
            exams: to_tasks(self.exams),
            projects: to_tasks(self.projects),
        }
    }
}

/// Parse a raw completion into a syllabus object, tolerating surrounding
/// prose and code fences
pub fn lenient_parse(raw: &str) -> Option<ModelSyllabus> {
    if let Ok(parsed) = serde_json::from_str::<ModelSyllabus>(raw.trim()) {
        return Some(parsed);
    }

    // Fenced block
    if let Some(start) = raw.find("```") {
        let after = &raw[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            if let Ok(parsed) = serde_json::from_str::<ModelSyllabus>(after[..end].trim()) {
                return Some(parsed);
            }
        }
    }

    // Outermost braces
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end > start {
        if let Ok(parsed) = serde_json::from_str::<ModelSyllabus>(&raw[start..=end]) {
            return Some(parsed);
        }
    }

    None
}

/// Count schedule-like lines recoverable from raw text (dates or week
/// markers), used by the quality gate
pub fn recoverable_rows(raw: &str, year: i32) -> usize {
    raw.lines()
        .filter(|line| {
            let line = line.trim();
            !line.is_empty()
                && line.len() < 400
                && (re_week_line().is_match(line) || dates::find_date_in_text(line, year).is_some())
        })
        .count()
}

/// URLs recoverable from raw text regardless of JSON validity
pub fn recover_urls(raw: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for m in re_url().find_iter(raw) {
        let url = m.as_str().trim_end_matches(['.', ',', ';']).to_string();
        if !urls.iter().any(|u| u.eq_ignore_ascii_case(&url)) {
            urls.push(url);
        }
    }
    urls
}

/// True when a raw completion is refusal/disclaimer prose rather than JSON
pub fn looks_like_refusal(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') || trimmed.starts_with("```") {
        return false;
    }
    let lower = trimmed.to_lowercase();
    ["i'm sorry", "i am sorry", "as an ai", "i cannot", "i can't", "unable to", "i apologize"]
        .iter()
        .any(|p| lower.contains(p))
}

// ---------------------------------------------------------------------------
// Retry ladder
// ---------------------------------------------------------------------------

/// The retry ladder's states, in escalation order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptKind {
    Draft,
    LargerBudget,
    StrictInstructions,
    ForceJson,
}

/// Quality evaluation of one attempt
#[derive(Debug, Clone, Copy, Default)]
pub struct AttemptEval {
    pub model_rows: usize,
    pub recoverable_rows: usize,
    pub resources: usize,
    pub assignments: usize,
    pub refusal_prose: bool,
}

impl AttemptEval {
    /// Combined score used to pick the winning attempt
    pub fn score(&self) -> usize {
        self.model_rows + self.recoverable_rows
    }

    /// Structurally empty: everything at or below minimal thresholds
    fn looks_empty(&self) -> bool {
        self.model_rows <= 1
            && self.recoverable_rows <= 1
            && self.resources <= 1
            && self.assignments == 0
    }
}

/// Decide the next ladder state from the attempts already issued and the
/// latest evaluation. Returns None when the ladder terminates.
pub fn next_attempt(issued: &[AttemptKind], eval: &AttemptEval) -> Option<AttemptKind> {
    // Refusal prose escalates straight to a forced-JSON retry, evaluated
    // independently of the emptiness check
    if eval.refusal_prose && !issued.contains(&AttemptKind::ForceJson) {
        return Some(AttemptKind::ForceJson);
    }
    match issued.last()? {
        AttemptKind::Draft if eval.model_rows <= 1 => Some(AttemptKind::LargerBudget),
        AttemptKind::LargerBudget if eval.looks_empty() => Some(AttemptKind::StrictInstructions),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Outcome of a full generative extraction (all attempts considered)
#[derive(Debug)]
pub struct GenAiOutcome {
    pub schedule: Vec<ScheduleRow>,
    pub resources: Vec<String>,
    pub assignments: Vec<ModelAssignment>,
    pub source_url: Option<String>,
    /// Winning attempt's raw completion text
    pub raw_text: String,
    /// URLs recovered from raw text regardless of JSON validity
    pub recovered_urls: Vec<String>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub attempts_issued: usize,
    pub prompt_excerpt: String,
}

const STRICT_SUFFIX: &str = "\n\nRespond with one complete JSON object and nothing else. \
No prose, no markdown fences, no commentary. Include every schedule row you can derive.";

pub struct GenAiClient {
    provider: Box<dyn TextGenerator>,
    config: GenAiConfig,
}

impl GenAiClient {
    pub fn new(provider: Box<dyn TextGenerator>, config: GenAiConfig) -> Self {
        Self { provider, config }
    }

    /// Build the provider from configuration, resolving the API key up
    /// front so a missing credential fails the run immediately.
    pub fn from_config(config: &GenAiConfig) -> anyhow::Result<Self> {
        let api_key = config.resolve_api_key()?;
        let provider = ChatCompletionsProvider::new(config, api_key)
            .map_err(|e| anyhow::anyhow!("Failed to build provider client: {e}"))?;
        Ok(Self::new(Box::new(provider), config.clone()))
    }

    /// Assemble the extraction prompt
    pub fn build_prompt(
        &self,
        course: &CourseIdentity,
        excerpts: &[(String, String)],
        hints: &DeterministicSignals,
    ) -> String {
        let mut course_block = format!("Course: {}", course.title);
        if let Some(code) = &course.code {
            course_block.push_str(&format!(" ({code})"));
        }
        if let Some(institution) = &course.institution {
            course_block.push_str(&format!("\nInstitution: {institution}"));
        }
        if !course.known_urls.is_empty() {
            course_block.push_str("\nKnown URLs:\n");
            for url in &course.known_urls {
                course_block.push_str(&format!("- {url}\n"));
            }
        }

        let mut context_block = String::new();
        if self.config.include_page_excerpts {
            for (url, text) in excerpts.iter().take(self.config.max_excerpted_pages) {
                let excerpt: String = text.chars().take(self.config.excerpt_chars).collect();
                context_block.push_str(&format!("--- Page: {url}\n{excerpt}\n"));
            }
        }

        let hints_block = serde_json::json!({
            "schedule_rows_found": hints.schedule_rows,
            "grading_found": hints.grading_signals,
        })
        .to_string();

        match &self.config.prompt_template {
            Some(template) => template
                .replace("{course}", &course_block)
                .replace("{context}", &context_block)
                .replace("{hints}", &hints_block),
            None => format!(
                "Extract the complete syllabus for the course below as a single JSON object \
                 with fields: source_url, resources (array of URLs), schedule (array of rows \
                 with sequence, title, date, description, slides, videos, readings, modules, \
                 assignments, labs, exams, projects; links are {{label, url, due_date}}), and \
                 assignments (flat array with kind, label, due_date, url).\n\n\
                 {course_block}\n\nPage context:\n{context_block}\n\
                 Signals already extracted (verify and extend, do not drop):\n{hints_block}\n"
            ),
        }
    }

    /// Run the retry ladder and return the best attempt's result.
    pub async fn extract(
        &self,
        prompt: &str,
        year: i32,
    ) -> Result<GenAiOutcome, GenAiError> {
        struct Attempt {
            kind: AttemptKind,
            raw: String,
            parsed: Option<ModelSyllabus>,
            eval: AttemptEval,
        }

        let mut issued: Vec<AttemptKind> = Vec::new();
        let mut attempts: Vec<Attempt> = Vec::new();
        let mut prompt_tokens = 0u64;
        let mut completion_tokens = 0u64;
        let mut next = AttemptKind::Draft;

        loop {
            let (text, max_tokens) = match next {
                AttemptKind::Draft => (prompt.to_string(), self.config.draft_max_tokens),
                AttemptKind::LargerBudget => (prompt.to_string(), self.config.retry_max_tokens),
                AttemptKind::StrictInstructions | AttemptKind::ForceJson => (
                    format!("{prompt}{STRICT_SUFFIX}"),
                    self.config.retry_max_tokens,
                ),
            };

            debug!("Generative attempt {:?} ({} issued so far)", next, issued.len());
            let chunk = self.provider.generate(&text, max_tokens).await?;
            prompt_tokens += chunk.prompt_tokens;
            completion_tokens += chunk.completion_tokens;
            issued.push(next);

            let parsed = lenient_parse(&chunk.text);
            let eval = AttemptEval {
                model_rows: parsed.as_ref().map(|p| p.schedule.len()).unwrap_or(0),
                recoverable_rows: recoverable_rows(&chunk.text, year),
                resources: parsed.as_ref().map(|p| p.resources.len()).unwrap_or(0),
                assignments: parsed.as_ref().map(|p| p.assignments.len()).unwrap_or(0),
                refusal_prose: parsed.is_none() && looks_like_refusal(&chunk.text),
            };
            attempts.push(Attempt {
                kind: next,
                raw: chunk.text,
                parsed,
                eval,
            });

            match next_attempt(&issued, &eval) {
                Some(kind) => next = kind,
                None => break,
            }
        }

        // Best of the attempts actually run
        let best = attempts
            .iter()
            .enumerate()
            .max_by_key(|(i, a)| (a.eval.score(), std::cmp::Reverse(*i)))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let winner = attempts.swap_remove(best);

        info!(
            "Generative extraction settled on {:?} after {} attempt(s): {} rows",
            winner.kind,
            issued.len(),
            winner.eval.model_rows
        );

        let recovered_urls = recover_urls(&winner.raw);

        let syllabus = match winner.parsed {
            Some(parsed) => parsed,
            None => {
                // A claimed-but-unparsable source_url means the response is
                // too corrupted to trust; everything else degrades gracefully
                if winner.raw.contains("\"source_url\"")
                    && !re_source_url().is_match(&winner.raw)
                {
                    return Err(GenAiError::CorruptSourceUrl);
                }
                warn!("Generative response unparsable; degrading to raw-text recovery");
                ModelSyllabus {
                    source_url: re_source_url()
                        .captures(&winner.raw)
                        .map(|c| c[1].to_string()),
                    ..Default::default()
                }
            }
        };

        Ok(GenAiOutcome {
            schedule: syllabus
                .schedule
                .into_iter()
                .map(|r| r.into_schedule_row(year))
                .collect(),
            resources: syllabus.resources,
            assignments: syllabus.assignments,
            source_url: syllabus.source_url,
            raw_text: winner.raw,
            recovered_urls,
            prompt_tokens,
            completion_tokens,
            attempts_issued: issued.len(),
            prompt_excerpt: prompt.chars().take(500).collect(),
        })
    }
}
