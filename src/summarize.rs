// src/summarize.rs
//! Summarization collaborator: trait + heuristic, OpenAI and Gemini adapters.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::analyze::heuristics;
use crate::error::CollaboratorError;

/// Document handed to a summarizer (already in the domestic locale).
#[derive(Debug, Clone, Copy)]
pub struct Document<'a> {
    pub title: &'a str,
    pub body: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub summary: String,
    pub key_points: Vec<String>,
    pub importance: f32,
    pub ai_relevance: f32,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, doc: Document<'_>) -> Result<Summary, CollaboratorError>;

    fn name(&self) -> &'static str;
}

/// Keyword-driven summarizer. No network.
#[derive(Debug, Clone)]
pub struct HeuristicSummarizer {
    max_lines: usize,
    max_key_points: usize,
}

impl Default for HeuristicSummarizer {
    fn default() -> Self {
        Self::new(10, 5)
    }
}

impl HeuristicSummarizer {
    pub fn new(max_lines: usize, max_key_points: usize) -> Self {
        Self {
            max_lines: max_lines.max(1),
            max_key_points,
        }
    }

    fn scores(&self, doc: Document<'_>) -> (Vec<String>, f32, f32) {
        (
            heuristics::key_points(doc.body, self.max_key_points),
            heuristics::importance(doc.title, doc.body),
            heuristics::ai_relevance(doc.title, doc.body),
        )
    }
}

#[async_trait]
impl Summarizer for HeuristicSummarizer {
    async fn summarize(&self, doc: Document<'_>) -> Result<Summary, CollaboratorError> {
        let (key_points, importance, ai_relevance) = self.scores(doc);
        Ok(Summary {
            summary: heuristics::simple_summary(doc.title, doc.body, self.max_lines),
            key_points,
            importance,
            ai_relevance,
        })
    }

    fn name(&self) -> &'static str {
        "simple"
    }
}

/// Chat Completions summary text; key points and scores stay heuristic.
pub struct OpenAiSummarizer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    fallback: HeuristicSummarizer,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiSummarizer {
    pub fn new(api_key: String, fallback: HeuristicSummarizer) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: "gpt-3.5-turbo".to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            fallback,
        }
    }

    /// `OPENAI_API_KEY` must be set.
    pub fn from_env(fallback: HeuristicSummarizer) -> Result<Self, CollaboratorError> {
        let key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(CollaboratorError::NotConfigured("OPENAI_API_KEY"))?;
        Ok(Self::new(key, fallback))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn complete(&self, doc: Document<'_>) -> Result<String, CollaboratorError> {
        let prompt = summary_prompt(doc, 2000);

        let rsp = self
            .client
            .post(&self.endpoint)
            .timeout(Duration::from_secs(30))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }],
                "max_tokens": 500,
                "temperature": 0.3,
            }))
            .send()
            .await
            .map_err(|e| CollaboratorError::from_reqwest("openai", e))?;

        let status = rsp.status();
        if !status.is_success() {
            let detail = rsp.text().await.unwrap_or_default();
            return Err(CollaboratorError::from_status("openai", status.as_u16(), &detail));
        }

        let body: ChatResponse = rsp
            .json()
            .await
            .map_err(|e| CollaboratorError::Malformed(format!("openai: {e}")))?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CollaboratorError::Malformed("openai: empty completion".into()))
    }
}

/// Remote summary text merged with heuristic key points and scores.
/// Transient failures go back to the retry controller; anything else falls
/// back to the heuristic summary.
fn merge_remote(
    provider: &'static str,
    fallback: &HeuristicSummarizer,
    doc: Document<'_>,
    remote: Result<String, CollaboratorError>,
) -> Result<Summary, CollaboratorError> {
    let (key_points, importance, ai_relevance) = fallback.scores(doc);
    let summary = match remote {
        Ok(text) => text,
        Err(e) if e.is_retryable() => return Err(e),
        Err(e) => {
            warn!(target: "summarize", provider, error = %e, "remote summary rejected, using heuristic");
            heuristics::simple_summary(doc.title, doc.body, fallback.max_lines)
        }
    };
    Ok(Summary {
        summary,
        key_points,
        importance,
        ai_relevance,
    })
}

fn summary_prompt(doc: Document<'_>, head_chars: usize) -> String {
    let head: String = doc.body.chars().take(head_chars).collect();
    format!(
        "다음 뉴스 기사를 10줄 이내로 요약해주세요. 핵심 내용에 집중하고, AI 기술 관련 정보를 강조해주세요.\n\n제목: {}\n내용: {}\n\n요약:",
        doc.title, head
    )
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, doc: Document<'_>) -> Result<Summary, CollaboratorError> {
        merge_remote("openai", &self.fallback, doc, self.complete(doc).await)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Gemini `generateContent` summary text; key points and scores stay heuristic.
pub struct GeminiSummarizer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    fallback: HeuristicSummarizer,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

impl GeminiResponse {
    /// Concatenated text parts of the first candidate.
    fn text(self) -> Option<String> {
        let candidate = self.candidates.into_iter().next()?;
        let text: String = candidate
            .content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

impl GeminiSummarizer {
    pub fn new(api_key: String, fallback: HeuristicSummarizer) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: "gemini-2.0-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            fallback,
        }
    }

    /// `GEMINI_API_KEY` must be set.
    pub fn from_env(fallback: HeuristicSummarizer) -> Result<Self, CollaboratorError> {
        let key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(CollaboratorError::NotConfigured("GEMINI_API_KEY"))?;
        Ok(Self::new(key, fallback))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn generate(&self, doc: Document<'_>) -> Result<String, CollaboratorError> {
        // larger context window than the chat model
        let prompt = summary_prompt(doc, 8000);
        let url = format!("{}/{}:generateContent", self.endpoint, self.model);

        let rsp = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(30))
            .header("x-goog-api-key", &self.api_key)
            .json(&serde_json::json!({
                "contents": [{ "parts": [{ "text": prompt }] }],
            }))
            .send()
            .await
            .map_err(|e| CollaboratorError::from_reqwest("gemini", e))?;

        let status = rsp.status();
        if !status.is_success() {
            let detail = rsp.text().await.unwrap_or_default();
            return Err(CollaboratorError::from_status("gemini", status.as_u16(), &detail));
        }

        let body: GeminiResponse = rsp
            .json()
            .await
            .map_err(|e| CollaboratorError::Malformed(format!("gemini: {e}")))?;
        body.text()
            .ok_or_else(|| CollaboratorError::Malformed("gemini: empty candidate".into()))
    }
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    async fn summarize(&self, doc: Document<'_>) -> Result<Summary, CollaboratorError> {
        merge_remote("gemini", &self.fallback, doc, self.generate(doc).await)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
