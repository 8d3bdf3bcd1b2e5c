//! Remote language-model collaborators.
//!
//! The pipeline talks to three optional services through traits so tests and
//! offline runs can swap them out:
//!
//! - [`SuggestionProvider`] proposes extra selectors from a DOM snapshot
//! - [`RerankProvider`] picks one selector from a closed list
//! - [`VisionProvider`] describes a screenshot for the suggestion prompt
//!
//! [`OpenRouterClient`] implements all three against an OpenAI-compatible
//! chat completions endpoint. Every failure comes back as an [`LlmError`]; the
//! healer decides what degrades and what surfaces.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::HealerConfig;

/// How much of the serialized DOM is sent with a suggestion request
const DOM_SNIPPET_LIMIT: usize = 3000;
const VISION_MAX_TOKENS: u32 = 500;

lazy_static! {
    static ref JSON_OBJECT: Regex = Regex::new(r"(?s)\{.*\}").unwrap();
    static ref ORDINAL_PREFIX: Regex = Regex::new(r"^\d+\.\s*").unwrap();
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM collaborator is not configured")]
    Disabled,

    #[error("LLM call timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM transport error: {0}")]
    Transport(String),

    #[error("LLM returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("LLM response is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("LLM response is missing '{0}'")]
    MissingKey(String),

    #[error("LLM picked a selector that was not offered: {0}")]
    NotOffered(String),

    #[error("Screenshot analysis failed: {0}")]
    Vision(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Transport(err.to_string())
    }
}

/// Context sent to the suggestion collaborator
#[derive(Debug, Clone, Default)]
pub struct SuggestionRequest {
    pub failed_selector: String,
    pub usage_hint: Option<String>,
    pub page_url: Option<String>,
    /// Serialized element list, or a raw HTML snippet when no elements exist
    pub dom_snapshot: String,
    /// Output of the vision collaborator, if any
    pub visual_context: Option<String>,
}

/// One selector proposed by the suggestion collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub selector: String,
    pub confidence: f64,
    pub explanation: Option<String>,
}

/// Outcome of a rerank call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RerankPick {
    Chosen(String),
    NoConfidentPick,
}

#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    async fn suggest(&self, request: &SuggestionRequest) -> Result<Vec<Suggestion>, LlmError>;
}

#[async_trait]
pub trait RerankProvider: Send + Sync {
    /// Pick one of `offered` for the described purpose.
    async fn pick(&self, offered: &[String], usage_hint: &str) -> Result<RerankPick, LlmError>;
}

#[async_trait]
pub trait VisionProvider: Send + Sync {
    async fn describe(
        &self,
        screenshot: &Path,
        failed_selector: &str,
        page_url: Option<&str>,
    ) -> Result<String, LlmError>;
}

/// OpenRouter chat-completions client
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
    vision_model: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl OpenRouterClient {
    pub fn from_config(config: &HealerConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key.clone().ok_or(LlmError::Disabled)?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            api_url: config.api_url.clone(),
            model: config.llm_model.clone(),
            vision_model: config.vision_model.clone(),
            max_tokens: config.llm_max_tokens,
            temperature: config.llm_temperature,
            timeout: config.llm_timeout,
        })
    }

    /// POST a chat request and return the first choice's message content.
    async fn complete(&self, body: Value) -> Result<String, LlmError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("X-Title", "selector-healer")
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout)
                } else {
                    LlmError::from(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidJson(e.to_string()))?;
        message_content(&payload)
    }
}

#[async_trait]
impl SuggestionProvider for OpenRouterClient {
    async fn suggest(&self, request: &SuggestionRequest) -> Result<Vec<Suggestion>, LlmError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SUGGEST_SYSTEM_PROMPT},
                {"role": "user", "content": suggestion_prompt(request)},
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        debug!("Requesting selector suggestions from {}", self.model);
        let content = self.complete(body).await?;
        parse_suggestions(&content)
    }
}

#[async_trait]
impl RerankProvider for OpenRouterClient {
    async fn pick(&self, offered: &[String], usage_hint: &str) -> Result<RerankPick, LlmError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": RERANK_SYSTEM_PROMPT},
                {"role": "user", "content": rerank_prompt(offered, usage_hint)},
            ],
            "temperature": 0.0,
            "response_format": {"type": "json_object"},
        });
        debug!("Requesting rerank over {} candidates", offered.len());
        let content = self.complete(body).await?;
        parse_rerank(&content, offered)
    }
}

#[async_trait]
impl VisionProvider for OpenRouterClient {
    async fn describe(
        &self,
        screenshot: &Path,
        failed_selector: &str,
        page_url: Option<&str>,
    ) -> Result<String, LlmError> {
        let bytes = tokio::fs::read(screenshot)
            .await
            .map_err(|e| LlmError::Vision(format!("{}: {}", screenshot.display(), e)))?;
        let image = STANDARD.encode(bytes);

        let body = json!({
            "model": self.vision_model,
            "messages": [
                {"role": "system", "content": VISION_SYSTEM_PROMPT},
                {
                    "role": "user",
                    "content": [
                        {"type": "text", "text": vision_prompt(failed_selector, page_url)},
                        {
                            "type": "image_url",
                            "image_url": {"url": format!("data:image/png;base64,{}", image)}
                        }
                    ]
                }
            ],
            "max_tokens": VISION_MAX_TOKENS,
            "temperature": 0.0,
        });
        let analysis = self.complete(body).await?;
        Ok(format_visual_context(&analysis))
    }
}

const SUGGEST_SYSTEM_PROMPT: &str = "You are an expert web automation engineer. Given a failing \
selector, a DOM snapshot and a description of what the selector is used for, propose robust CSS \
and XPath selectors that match the intended element. Only use attributes, text and structure that \
exist in the snapshot; never invent ids, classes or attributes. Prefer data-testid, aria-*, role, \
id, name, type and placeholder. Use classes only when they are not auto-generated. Respond with \
JSON only, in the form {\"css\": [\"...\"], \"xpath\": [\"...\"], \"explanations\": [\"...\"], \
\"confidence\": [0.0]}.";

const RERANK_SYSTEM_PROMPT: &str = "You are an expert web automation engineer choosing the single \
best selector from a list. You must choose exactly one selector from the list and must not create \
a new one. Choose the selector that best matches the intended use; when several fit, prefer ids \
over classes and unique attributes over generic ones. If none fits, return null. Respond with \
JSON only: {\"chosen_selector\": \"<exact selector from the list>\", \"reason\": \"<brief>\"}.";

const VISION_SYSTEM_PROMPT: &str = "You are an expert UI analyst. Analyze the screenshot and \
identify the UI element that matches the failed selector. Describe its visual characteristics, \
position and surrounding elements.";

fn suggestion_prompt(request: &SuggestionRequest) -> String {
    let snippet: String = request.dom_snapshot.chars().take(DOM_SNIPPET_LIMIT).collect();
    format!(
        "Failed Selector: {}\nPurpose: {}\nPage URL: {}\n{}\n--- START OF DOM ---\n{}\n--- END OF DOM ---\n\
         Only return selectors derivable from the DOM above. Return ONLY JSON.",
        request.failed_selector,
        request.usage_hint.as_deref().unwrap_or("N/A"),
        request.page_url.as_deref().unwrap_or("N/A"),
        request.visual_context.as_deref().unwrap_or(""),
        snippet
    )
}

fn rerank_prompt(offered: &[String], usage_hint: &str) -> String {
    let list: Vec<String> = offered
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {}", i + 1, c))
        .collect();
    format!(
        "CANDIDATE SELECTORS (choose one):\n{}\n\nINTENDED USE: {}\n\n\
         Return JSON with chosen_selector and reason.",
        list.join("\n"),
        usage_hint
    )
}

fn vision_prompt(failed_selector: &str, page_url: Option<&str>) -> String {
    format!(
        "Help identify the element that matches this selector.\nFailed selector: {}\nPage URL: {}\n\n\
         Describe:\n1. The likely target element\n2. Visual characteristics (color, size, position)\n\
         3. Nearby elements or landmarks\n4. Stable attributes to select it by\n\
         Keep the answer concise and structured.",
        failed_selector,
        page_url.unwrap_or("N/A")
    )
}

/// Wrap a vision answer for inclusion in the suggestion prompt.
pub fn format_visual_context(analysis: &str) -> String {
    format!("\nVisual Analysis from Screenshot:\n{}\n", analysis.trim())
}

/// `choices[0].message.content` of a chat-completions response
pub fn message_content(payload: &Value) -> Result<String, LlmError> {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| LlmError::MissingKey("choices[0].message.content".to_string()))
}

/// Parse model output as JSON, falling back to the outermost `{...}` in the text.
pub fn extract_json(content: &str) -> Result<Value, LlmError> {
    if let Ok(value) = serde_json::from_str::<Value>(content.trim()) {
        return Ok(value);
    }
    let Some(m) = JSON_OBJECT.find(content) else {
        return Err(LlmError::InvalidJson(truncate(content, 200)));
    };
    serde_json::from_str(m.as_str()).map_err(|e| LlmError::InvalidJson(e.to_string()))
}

/// Read suggestions from either `{"candidates": [...]}` or `{"css": [...], "xpath": [...]}`.
///
/// Confidences and explanations pair up with selectors by their raw position,
/// before blank or non-string entries are dropped; missing confidences default to 0.5.
pub fn parse_suggestions(content: &str) -> Result<Vec<Suggestion>, LlmError> {
    let value = extract_json(content)?;

    let selectors: Vec<Option<String>> = if let Some(candidates) = value.get("candidates") {
        string_slots(candidates)
    } else if value.get("css").is_some() || value.get("xpath").is_some() {
        let mut all = string_slots(&value["css"]);
        all.extend(string_slots(&value["xpath"]));
        all
    } else {
        return Err(LlmError::MissingKey("candidates".to_string()));
    };

    let confidences: Vec<f64> = value["confidence"]
        .as_array()
        .map(|items| items.iter().map(|v| v.as_f64().unwrap_or(0.5)).collect())
        .unwrap_or_default();
    let explanations = string_slots(&value["explanations"]);

    Ok(selectors
        .into_iter()
        .enumerate()
        .filter_map(|(i, selector)| {
            Some(Suggestion {
                selector: selector?,
                confidence: confidences.get(i).copied().unwrap_or(0.5).clamp(0.0, 1.0),
                explanation: explanations.get(i).cloned().flatten(),
            })
        })
        .collect())
}

/// Read `chosen_selector`, strip an `N. ` prefix, and require it to be one of `offered`.
pub fn parse_rerank(content: &str, offered: &[String]) -> Result<RerankPick, LlmError> {
    let value = extract_json(content)?;
    let Some(chosen) = value.get("chosen_selector") else {
        return Err(LlmError::MissingKey("chosen_selector".to_string()));
    };
    let Some(chosen) = chosen.as_str().map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(RerankPick::NoConfidentPick);
    };

    let chosen = ORDINAL_PREFIX.replace(chosen, "").into_owned();
    if offered.iter().any(|c| *c == chosen) {
        Ok(RerankPick::Chosen(chosen))
    } else {
        Err(LlmError::NotOffered(chosen))
    }
}

/// One slot per array item; blank or non-string items keep their slot as `None`
fn string_slots(value: &Value) -> Vec<Option<String>> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max).collect::<String>())
    }
}

#[cfg(test)]
#[path = "llm_test.rs"]
mod llm_test;
