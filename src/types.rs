use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use crate::config::ScoringWeights;
use crate::errors::HealerError;

/// Output format for CLI results
#[derive(Clone, Copy, Debug, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON format for programmatic consumption
    Json,
    /// Human-readable simple format
    Simple,
}

/// Syntax family of a single selector string
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    Css,
    Xpath,
}

impl SelectorKind {
    /// Classify a selector by its syntax. Quoted attribute values are ignored.
    pub fn detect(selector: &str) -> Self {
        let trimmed = selector.trim();
        if trimmed.starts_with('/') || trimmed.starts_with("./") || trimmed.starts_with("(/") {
            return SelectorKind::Xpath;
        }
        let bare = strip_quoted(trimmed);
        if bare.contains("//") || bare.contains("[@") {
            SelectorKind::Xpath
        } else {
            SelectorKind::Css
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SelectorKind::Css => "css",
            SelectorKind::Xpath => "xpath",
        }
    }
}

/// Which selector families a request wants generated
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SelectorType {
    Css,
    Xpath,
    #[default]
    Mixed,
}

impl SelectorType {
    pub fn wants_css(&self) -> bool {
        matches!(self, SelectorType::Css | SelectorType::Mixed)
    }

    pub fn wants_xpath(&self) -> bool {
        matches!(self, SelectorType::Xpath | SelectorType::Mixed)
    }
}

/// Remove the contents of single- and double-quoted strings, keeping the quotes.
pub fn strip_quoted(selector: &str) -> String {
    let mut out = String::with_capacity(selector.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in selector.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                    out.push(c);
                }
            }
            None => {
                if c == '\'' || c == '"' {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }
    out
}

/// One element of a normalized page snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    /// Lowercase tag name
    pub tag: String,
    /// Stable attributes only (id, class, data-testid, aria-*, role, name, type,
    /// placeholder, alt, title)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Visible text with whitespace collapsed
    #[serde(default)]
    pub text: String,
    /// Best single CSS selector for the element
    #[serde(default, alias = "selector")]
    pub derived_selector: String,
    #[serde(default, alias = "xpath")]
    pub derived_xpath: Option<String>,
}

impl ElementDescriptor {
    /// Non-empty attribute value
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(|v| v.as_str())
            .filter(|v| !v.trim().is_empty())
    }

    /// Class tokens with empty entries removed
    pub fn classes(&self) -> Vec<&str> {
        self.attr("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Text usable in a text-based selector
    pub fn short_text(&self, cutoff: usize) -> Option<&str> {
        let text = self.text.trim();
        if text.is_empty() || text.chars().count() >= cutoff {
            None
        } else {
            Some(text)
        }
    }
}

/// Result of checking a selector against the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Validation {
    /// Confirmed to match nothing (or not expressible in standard syntax)
    Absent,
    /// Not checked: XPath, or no HTML available
    Unchecked,
    /// Confirmed to match at least one node
    Present,
}

impl Validation {
    pub fn value(&self) -> f64 {
        match self {
            Validation::Absent => 0.0,
            Validation::Unchecked => 0.5,
            Validation::Present => 1.0,
        }
    }
}

/// A scored replacement selector
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    selector: String,
    kind: SelectorKind,
    base_confidence: f64,
    stability: f64,
    semantic: f64,
    validation: Validation,
    final_score: f64,
}

impl Candidate {
    /// Build a candidate; the final score is always derived from the other fields.
    pub fn new(
        selector: impl Into<String>,
        kind: SelectorKind,
        base_confidence: f64,
        stability: f64,
        semantic: f64,
        validation: Validation,
        weights: &ScoringWeights,
    ) -> Self {
        let base_confidence = base_confidence.clamp(0.0, 1.0);
        let final_score =
            crate::scorer::final_score(base_confidence, stability, semantic, validation, weights);
        Self {
            selector: selector.into(),
            kind,
            base_confidence,
            stability,
            semantic,
            validation,
            final_score,
        }
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn kind(&self) -> SelectorKind {
        self.kind
    }

    pub fn base_confidence(&self) -> f64 {
        self.base_confidence
    }

    pub fn stability(&self) -> f64 {
        self.stability
    }

    pub fn semantic(&self) -> f64 {
        self.semantic
    }

    pub fn validation(&self) -> Validation {
        self.validation
    }

    pub fn final_score(&self) -> f64 {
        self.final_score
    }
}

/// Insertion-ordered candidates, unique by exact selector text
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    items: Vec<Candidate>,
    seen: HashSet<String>,
    limit: Option<usize>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn contains(&self, selector: &str) -> bool {
        self.seen.contains(selector)
    }

    pub fn is_full(&self) -> bool {
        self.limit.is_some_and(|limit| self.items.len() >= limit)
    }

    /// Add a candidate. Returns false when it is a duplicate or the set is full.
    pub fn push(&mut self, candidate: Candidate) -> bool {
        if self.is_full() || self.seen.contains(candidate.selector()) {
            return false;
        }
        self.seen.insert(candidate.selector().to_string());
        self.items.push(candidate);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<Candidate> {
        self.items
    }
}

/// A candidate in its final position, with the score it is reported under
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    /// Equals the candidate's final score unless the LLM rerank boosted it
    pub score: f64,
    pub llm_chosen: bool,
}

impl RankedCandidate {
    pub fn local(candidate: Candidate) -> Self {
        let score = candidate.final_score();
        Self {
            candidate,
            score,
            llm_chosen: false,
        }
    }

    pub fn selector(&self) -> &str {
        self.candidate.selector()
    }
}

/// Feedback rating for a healed selector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackRating {
    Positive,
    Negative,
}

/// A persisted healing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingRecord {
    pub id: u64,
    pub old_selector: String,
    pub new_selector: String,
    pub confidence: f64,
    pub url: String,
    pub selector_type: SelectorKind,
    pub timestamp: DateTime<Utc>,
    pub processing_time_ms: f64,
    pub llm_used: bool,
    pub screenshot_analyzed: bool,
    /// Set once, by feedback
    pub success: Option<bool>,
}

/// Fields the pipeline supplies when appending a healing
#[derive(Debug, Clone, PartialEq)]
pub struct NewHealingRecord {
    pub old_selector: String,
    pub new_selector: String,
    pub confidence: f64,
    pub url: String,
    pub selector_type: SelectorKind,
    pub processing_time_ms: f64,
    pub llm_used: bool,
    pub screenshot_analyzed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub id: u64,
    pub healing_id: u64,
    pub rating: FeedbackRating,
    pub comment: Option<String>,
    pub actual_selector_used: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Every healing request, successful or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingAttempt {
    pub id: u64,
    pub failed_selector: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub error_message: Option<String>,
    pub processing_time_ms: f64,
}

/// Pre-extracted semantic DOM as produced by a browser-side extractor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemanticDom {
    #[serde(default)]
    pub elements: Vec<ElementDescriptor>,
    #[serde(default)]
    pub total_elements: Option<usize>,
}

/// Where a request's elements come from, in order of preference
#[derive(Debug, Clone, Copy)]
pub enum DomSource<'a> {
    Semantic(&'a SemanticDom),
    Interactive(&'a [ElementDescriptor]),
    Html(&'a str),
}

impl DomSource<'_> {
    /// Whether descriptors arrive already extracted, with their own derived selectors
    pub fn is_pre_extracted(&self) -> bool {
        !matches!(self, DomSource::Html(_))
    }
}

/// Input to a single healing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealRequest {
    pub failed_selector: String,
    /// Full page HTML; also the only source used for validation
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub semantic_dom: Option<SemanticDom>,
    #[serde(default)]
    pub interactive_elements: Option<Vec<ElementDescriptor>>,
    #[serde(default)]
    pub page_url: Option<String>,
    /// Free-text description of what the selector is for
    #[serde(default, alias = "usage_hint")]
    pub use_of_selector: Option<String>,
    #[serde(default)]
    pub screenshot_path: Option<PathBuf>,
    #[serde(default)]
    pub selector_type: SelectorType,
}

impl HealRequest {
    /// Reject requests that cannot be healed before any pipeline work.
    pub fn validate(&self) -> Result<(), HealerError> {
        if self.failed_selector.trim().is_empty() {
            return Err(HealerError::InvalidRequest(
                "failed selector cannot be empty".to_string(),
            ));
        }
        if self.dom_source().is_none() {
            return Err(HealerError::InvalidRequest(
                "at least one of html, semantic_dom, or interactive_elements must be provided"
                    .to_string(),
            ));
        }
        if let Some(url) = self.page_url.as_deref().filter(|u| !u.is_empty())
            && url::Url::parse(url).is_err()
        {
            return Err(HealerError::InvalidRequest(format!("invalid page url: {}", url)));
        }
        Ok(())
    }

    /// Pre-extracted sources win over raw HTML; HTML is still used for validation.
    pub fn dom_source(&self) -> Option<DomSource<'_>> {
        if let Some(dom) = &self.semantic_dom {
            return Some(DomSource::Semantic(dom));
        }
        if let Some(elements) = &self.interactive_elements {
            return Some(DomSource::Interactive(elements));
        }
        self.html().map(DomSource::Html)
    }

    /// Non-blank HTML, if any
    pub fn html(&self) -> Option<&str> {
        self.html.as_deref().filter(|h| !h.trim().is_empty())
    }

    pub fn usage_hint(&self) -> Option<&str> {
        self.use_of_selector
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
    }
}

/// One entry of the ranked output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateReport {
    pub selector: String,
    pub kind: SelectorKind,
    pub score: f64,
    pub base_confidence: f64,
    /// Sub-scores are absent for memory hits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<f64>,
    #[serde(default)]
    pub llm_chosen: bool,
}

impl From<&RankedCandidate> for CandidateReport {
    fn from(ranked: &RankedCandidate) -> Self {
        let c = &ranked.candidate;
        Self {
            selector: c.selector().to_string(),
            kind: c.kind(),
            score: round3(ranked.score),
            base_confidence: round3(c.base_confidence()),
            stability: Some(round3(c.stability())),
            semantic: Some(round3(c.semantic())),
            validation: Some(c.validation().value()),
            llm_chosen: ranked.llm_chosen,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealMetadata {
    pub cached: bool,
    pub llm_used: bool,
    pub llm_reranked: bool,
    pub screenshot_analyzed: bool,
    pub processing_time_ms: f64,
    pub total_candidates_generated: usize,
    pub total_elements: usize,
}

/// Output of a single healing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealResponse {
    pub request_id: String,
    pub message: String,
    /// Top entry of `candidates`, or none when nothing was found
    pub chosen: Option<String>,
    pub candidates: Vec<CandidateReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healing_id: Option<u64>,
    pub metadata: HealMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchHealResponse {
    pub request_id: String,
    pub results: Vec<HealResponse>,
    pub total_processed: usize,
    pub total_succeeded: usize,
    pub total_failed: usize,
    pub processing_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: u64,
    pub old_selector: String,
    pub new_selector: String,
    pub confidence: f64,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub success: Option<bool>,
    pub feedback_rating: Option<FeedbackRating>,
    pub feedback_comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub items: Vec<HistoryItem>,
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorCount {
    pub selector: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingStats {
    pub total_healings: usize,
    pub total_with_feedback: usize,
    pub positive_feedback_count: usize,
    pub negative_feedback_count: usize,
    pub success_rate: f64,
    pub most_healed_selectors: Vec<SelectorCount>,
    pub recent_healings_count: usize,
    pub average_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub store_reachable: bool,
    pub llm_api_available: bool,
    pub version: String,
}

pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
