//! LLM-backed classifier, time extractor and agenda generator.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use regex::Regex;

use super::{AgendaGenerator, IntentClassifier, TimeExtractor};
use crate::config::ClassifierMode;
use crate::error::ServiceError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

const CLASSIFIER_PROMPT: &str = "Does this email indicate the sender wants to schedule a meeting? \
Respond only 'Yes' or 'No'.";
const TIME_PROMPT: &str = "Extract the proposed meeting time and date from the following email. \
Return it in this format: 'YYYY-MM-DD HH:MM' or say 'none' if not found.";
const AGENDA_PROMPT: &str = "Create a brief meeting agenda based on the following email:";

const CLASSIFIER_MAX_TOKENS: u32 = 5;
const TIME_MAX_TOKENS: u32 = 20;
const AGENDA_MAX_TOKENS: u32 = 100;

static MEETING_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4}-\d{2}-\d{2})[ T](\d{1,2}:\d{2})\b").expect("valid meeting time regex")
});

fn request(prompt: &str, text: &str, max_tokens: u32) -> CompletionRequest {
    CompletionRequest::new(vec![ChatMessage::user(format!("{prompt}\n\n{text}"))])
        .with_temperature(0.0)
        .with_max_tokens(max_tokens)
}

async fn ask(
    llm: &dyn LlmProvider,
    prompt: &str,
    text: &str,
    max_tokens: u32,
) -> Result<String, ServiceError> {
    let response = llm.complete(request(prompt, text, max_tokens)).await?;
    Ok(response.content.trim().to_string())
}

// ── Classifier ──────────────────────────────────────────────────────

/// Interpret a yes/no verdict. Trailing punctuation and case are ignored.
pub fn parse_verdict(raw: &str, mode: ClassifierMode) -> Result<bool, ServiceError> {
    let normalized = raw
        .trim()
        .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_ascii_lowercase();
    match (normalized.as_str(), mode) {
        ("yes", _) => Ok(true),
        ("no", _) => Ok(false),
        (_, ClassifierMode::Lenient) => Ok(false),
        (_, ClassifierMode::Strict) => Err(ServiceError::AmbiguousVerdict {
            verdict: raw.trim().to_string(),
        }),
    }
}

pub struct LlmClassifier {
    llm: Arc<dyn LlmProvider>,
    mode: ClassifierMode,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>, mode: ClassifierMode) -> Self {
        Self { llm, mode }
    }
}

#[async_trait]
impl IntentClassifier for LlmClassifier {
    async fn is_meeting_request(&self, text: &str) -> Result<bool, ServiceError> {
        let verdict = ask(self.llm.as_ref(), CLASSIFIER_PROMPT, text, CLASSIFIER_MAX_TOKENS).await?;
        let wants_meeting = parse_verdict(&verdict, self.mode)?;
        tracing::debug!(verdict = %verdict, wants_meeting, "Classified message");
        Ok(wants_meeting)
    }
}

// ── Time extraction ─────────────────────────────────────────────────

/// Parse an extractor answer: `YYYY-MM-DD HH:MM`, or `none` for no time.
pub fn parse_meeting_time(raw: &str) -> Result<Option<NaiveDateTime>, ServiceError> {
    let answer = raw.trim().trim_matches(|c: char| c == '\'' || c == '"' || c == '.');
    if answer.eq_ignore_ascii_case("none") || answer.is_empty() {
        return Ok(None);
    }

    let caps = MEETING_TIME_RE
        .captures(answer)
        .ok_or_else(|| ServiceError::invalid_response("time extractor", format!("{answer:?}")))?;
    let joined = format!("{} {}", &caps[1], &caps[2]);
    NaiveDateTime::parse_from_str(&joined, "%Y-%m-%d %H:%M")
        .map(Some)
        .map_err(|e| ServiceError::invalid_response("time extractor", format!("{answer:?}: {e}")))
}

pub struct LlmTimeExtractor {
    llm: Arc<dyn LlmProvider>,
}

impl LlmTimeExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl TimeExtractor for LlmTimeExtractor {
    async fn extract_time(&self, text: &str) -> Result<Option<NaiveDateTime>, ServiceError> {
        let answer = ask(self.llm.as_ref(), TIME_PROMPT, text, TIME_MAX_TOKENS).await?;
        parse_meeting_time(&answer)
    }
}

// ── Agenda ──────────────────────────────────────────────────────────

pub struct LlmAgendaGenerator {
    llm: Arc<dyn LlmProvider>,
}

impl LlmAgendaGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl AgendaGenerator for LlmAgendaGenerator {
    async fn summarize_as_agenda(&self, text: &str) -> Result<String, ServiceError> {
        ask(self.llm.as_ref(), AGENDA_PROMPT, text, AGENDA_MAX_TOKENS).await
    }
}
