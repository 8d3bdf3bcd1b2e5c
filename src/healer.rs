//! End-to-end healing pipeline.
//!
//! `memory lookup -> normalize -> generate -> (vision) -> (LLM suggestions)
//! -> score -> rerank -> persist`. Only request validation can fail a single
//! healing; every collaborator problem degrades to local results and is logged.

use chrono::Utc;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::HealerConfig;
use crate::dom;
use crate::errors::HealerError;
use crate::generator::{CandidateGenerator, dedup_with_limit};
use crate::llm::{
    OpenRouterClient, RerankProvider, Suggestion, SuggestionProvider, SuggestionRequest,
    VisionProvider,
};
use crate::memory::{AttemptLog, HealingMemory};
use crate::rerank::Reranker;
use crate::scorer::Scorer;
use crate::types::{
    BatchHealResponse, CandidateReport, CandidateSet, DomSource, ElementDescriptor, HealMetadata,
    HealRequest, HealResponse, HealingRecord, HealthReport, NewHealingRecord, SelectorKind,
    round3,
};

/// Largest accepted batch
pub const MAX_BATCH_SIZE: usize = 10;

/// Base confidence for candidates the LLM did not suggest
pub const DEFAULT_BASE_CONFIDENCE: f64 = 0.5;

pub struct Healer {
    config: Arc<HealerConfig>,
    memory: Arc<dyn HealingMemory>,
    suggester: Option<Arc<dyn SuggestionProvider>>,
    reranker: Option<Arc<dyn RerankProvider>>,
    vision: Option<Arc<dyn VisionProvider>>,
}

/// Elements gathered from a request, plus what the page reported as its size
struct GatheredDom {
    elements: Vec<ElementDescriptor>,
    total_elements: usize,
    pre_extracted: bool,
}

impl Healer {
    /// A local-only healer; add collaborators with the `with_*` builders.
    pub fn new(config: Arc<HealerConfig>, memory: Arc<dyn HealingMemory>) -> Self {
        Self {
            config,
            memory,
            suggester: None,
            reranker: None,
            vision: None,
        }
    }

    pub fn with_suggester(mut self, provider: Arc<dyn SuggestionProvider>) -> Self {
        self.suggester = Some(provider);
        self
    }

    pub fn with_reranker(mut self, provider: Arc<dyn RerankProvider>) -> Self {
        self.reranker = Some(provider);
        self
    }

    pub fn with_vision(mut self, provider: Arc<dyn VisionProvider>) -> Self {
        self.vision = Some(provider);
        self
    }

    /// Wire the OpenRouter client into all three collaborator slots when an
    /// API key is configured; otherwise stay local-only.
    pub fn with_openrouter(self) -> Self {
        match OpenRouterClient::from_config(&self.config) {
            Ok(client) => {
                let client = Arc::new(client);
                self.with_suggester(client.clone())
                    .with_reranker(client.clone())
                    .with_vision(client)
            }
            Err(e) => {
                debug!("Running without LLM collaborators: {}", e);
                self
            }
        }
    }

    pub fn config(&self) -> &HealerConfig {
        &self.config
    }

    pub fn memory(&self) -> &Arc<dyn HealingMemory> {
        &self.memory
    }

    /// Heal one selector.
    pub async fn heal(&self, request: &HealRequest) -> Result<HealResponse, HealerError> {
        let request_id = new_request_id();
        let span = info_span!("heal", request_id = %request_id);
        self.heal_inner(request, request_id).instrument(span).await
    }

    async fn heal_inner(
        &self,
        request: &HealRequest,
        request_id: String,
    ) -> Result<HealResponse, HealerError> {
        let started = Instant::now();
        let trimmed = trim_failed_selector(request);
        let request: &HealRequest = &trimmed;
        info!("Healing '{}'", request.failed_selector);
        request.validate()?;

        match self.memory.lookup_by_old_selector(&request.failed_selector) {
            Ok(Some(record)) => {
                info!("Memory hit, returning healing {}", record.id);
                return Ok(memory_hit(request_id, record, elapsed_ms(started)));
            }
            Ok(None) => {}
            Err(e) => warn!("Healing memory lookup failed, healing from scratch: {}", e),
        }

        let gathered = gather_elements(request);
        let usage_hint = request.usage_hint();
        let wants_xpath = self.config.enable_xpath_generation && request.selector_type.wants_xpath();

        let generator = CandidateGenerator::new(&self.config);
        let css = if request.selector_type.wants_css() {
            let mut css = generator.generate_css(
                &gathered.elements,
                &request.failed_selector,
                usage_hint,
                self.config.max_dom_candidates,
            );
            if gathered.pre_extracted {
                css.extend(derived(&gathered.elements, SelectorKind::Css));
                css = dedup_with_limit(css, self.config.max_dom_candidates);
            }
            css
        } else {
            Vec::new()
        };
        let xpath = if wants_xpath {
            let mut xpath = generator.generate_xpath(&gathered.elements, self.config.max_xpath_candidates);
            if gathered.pre_extracted {
                xpath.extend(derived(&gathered.elements, SelectorKind::Xpath));
                xpath = dedup_with_limit(xpath, self.config.max_xpath_candidates);
            }
            xpath
        } else {
            Vec::new()
        };
        debug!(
            "Generated {} CSS and {} XPath candidates from {} elements",
            css.len(),
            xpath.len(),
            gathered.elements.len()
        );

        let visual_context = self.visual_context(request).await;
        let screenshot_analyzed = visual_context.is_some();

        // Nothing to ground suggestions in without elements
        let suggestions = if gathered.elements.is_empty() {
            None
        } else {
            self.suggestions(request, &gathered.elements, visual_context).await
        };
        let llm_used = suggestions.is_some();
        let suggestions: Vec<Suggestion> = suggestions
            .unwrap_or_default()
            .into_iter()
            .filter(|s| match SelectorKind::detect(&s.selector) {
                SelectorKind::Css => request.selector_type.wants_css(),
                SelectorKind::Xpath => request.selector_type.wants_xpath(),
            })
            .collect();

        let total_generated = css.len() + xpath.len() + suggestions.len();
        let candidates = {
            let mut confidence: HashMap<&str, f64> = HashMap::new();
            for s in &suggestions {
                confidence.entry(s.selector.as_str()).or_insert(s.confidence);
            }

            let scorer = Scorer::new(&self.config, request.html());
            let mut set = CandidateSet::with_limit(self.config.max_candidates);
            let merged = css
                .iter()
                .chain(xpath.iter())
                .chain(suggestions.iter().map(|s| &s.selector));
            for selector in merged {
                if set.is_full() {
                    break;
                }
                if set.contains(selector) {
                    continue;
                }
                let base = confidence
                    .get(selector.as_str())
                    .copied()
                    .unwrap_or(DEFAULT_BASE_CONFIDENCE);
                set.push(scorer.score(selector, base));
            }
            set.into_vec()
        };
        info!(
            "Scoring {} unique candidates out of {} generated",
            candidates.len(),
            total_generated
        );

        let outcome = Reranker::new(self.config.clone(), self.reranker.clone())
            .rerank(candidates, usage_hint)
            .await;

        let chosen = outcome.chosen().cloned();
        let processing_time_ms = elapsed_ms(started);

        let record = chosen.as_ref().map(|top| NewHealingRecord {
            old_selector: request.failed_selector.clone(),
            new_selector: top.selector().to_string(),
            confidence: round3(top.score),
            url: request.page_url.clone().unwrap_or_default(),
            selector_type: top.candidate.kind(),
            processing_time_ms,
            llm_used: llm_used || outcome.llm_reranked,
            screenshot_analyzed,
        });
        let healing_id = self
            .record_outcome(request, record, chosen.is_some(), processing_time_ms)
            .await;

        let message = match &chosen {
            Some(top) => {
                info!(
                    "Healed '{}' -> '{}' ({:.3}) in {:.1}ms",
                    request.failed_selector,
                    top.selector(),
                    top.score,
                    processing_time_ms
                );
                "Smart Healed".to_string()
            }
            None => {
                info!("No candidates found for '{}'", request.failed_selector);
                "No candidates found".to_string()
            }
        };

        Ok(HealResponse {
            request_id,
            message,
            chosen: chosen.map(|top| top.selector().to_string()),
            candidates: outcome.ranked.iter().map(CandidateReport::from).collect(),
            healing_id,
            metadata: HealMetadata {
                cached: false,
                llm_used,
                llm_reranked: outcome.llm_reranked,
                screenshot_analyzed,
                processing_time_ms,
                total_candidates_generated: total_generated,
                total_elements: gathered.total_elements,
            },
        })
    }

    /// Heal up to [`MAX_BATCH_SIZE`] selectors one after another.
    pub async fn heal_batch(&self, requests: &[HealRequest]) -> Result<BatchHealResponse, HealerError> {
        if requests.is_empty() || requests.len() > MAX_BATCH_SIZE {
            return Err(HealerError::InvalidRequest(format!(
                "a batch must contain between 1 and {} requests, got {}",
                MAX_BATCH_SIZE,
                requests.len()
            )));
        }

        let started = Instant::now();
        let batch_id = new_request_id();
        info!("Healing batch {} of {} selectors", batch_id, requests.len());

        let mut results = Vec::with_capacity(requests.len());
        let mut succeeded = 0;
        for request in requests {
            match self.heal(request).await {
                Ok(response) => {
                    if response.chosen.is_some() {
                        succeeded += 1;
                    }
                    results.push(response);
                }
                Err(e) => {
                    warn!("Batch item '{}' failed: {}", request.failed_selector, e);
                    results.push(failed_response(&e));
                }
            }
        }

        let total_processed = results.len();
        Ok(BatchHealResponse {
            request_id: batch_id,
            results,
            total_processed,
            total_succeeded: succeeded,
            total_failed: total_processed - succeeded,
            processing_time_ms: elapsed_ms(started),
        })
    }

    pub fn health(&self) -> HealthReport {
        let store_reachable = match self.memory.check() {
            Ok(()) => true,
            Err(e) => {
                warn!("Healing memory check failed: {}", e);
                false
            }
        };
        let llm_api_available = self.config.llm_enabled();

        HealthReport {
            status: if store_reachable && llm_api_available {
                "healthy".to_string()
            } else {
                "degraded".to_string()
            },
            timestamp: Utc::now(),
            store_reachable,
            llm_api_available,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    async fn visual_context(&self, request: &HealRequest) -> Option<String> {
        let (Some(vision), Some(path)) = (&self.vision, &request.screenshot_path) else {
            return None;
        };
        if !self.config.enable_screenshot_analysis {
            debug!("Screenshot analysis is disabled");
            return None;
        }

        let call = vision.describe(path, &request.failed_selector, request.page_url.as_deref());
        match tokio::time::timeout(self.config.llm_timeout, call).await {
            Ok(Ok(context)) => {
                info!("Screenshot analysis completed");
                Some(context)
            }
            Ok(Err(e)) => {
                warn!("Screenshot analysis failed, continuing without it: {}", e);
                None
            }
            Err(_) => {
                warn!("Screenshot analysis timed out after {:?}", self.config.llm_timeout);
                None
            }
        }
    }

    async fn suggestions(
        &self,
        request: &HealRequest,
        elements: &[ElementDescriptor],
        visual_context: Option<String>,
    ) -> Option<Vec<Suggestion>> {
        let suggester = self.suggester.as_ref()?;

        let suggestion_request = SuggestionRequest {
            failed_selector: request.failed_selector.clone(),
            usage_hint: request.usage_hint().map(str::to_string),
            page_url: request.page_url.clone(),
            dom_snapshot: serde_json::to_string_pretty(elements).unwrap_or_default(),
            visual_context,
        };

        match tokio::time::timeout(self.config.llm_timeout, suggester.suggest(&suggestion_request)).await {
            Ok(Ok(suggestions)) => {
                info!("LLM suggested {} candidates", suggestions.len());
                Some(suggestions)
            }
            Ok(Err(e)) => {
                warn!("LLM suggestions failed, using local candidates only: {}", e);
                None
            }
            Err(_) => {
                warn!(
                    "LLM suggestions timed out after {:?}, using local candidates only",
                    self.config.llm_timeout
                );
                None
            }
        }
    }

    /// Save the healing and the attempt in one store write, off the async workers.
    async fn record_outcome(
        &self,
        request: &HealRequest,
        record: Option<NewHealingRecord>,
        success: bool,
        processing_time_ms: f64,
    ) -> Option<u64> {
        let attempt = AttemptLog {
            failed_selector: request.failed_selector.clone(),
            url: request.page_url.clone().unwrap_or_default(),
            success,
            error_message: if success {
                None
            } else {
                Some("no candidates found".to_string())
            },
            processing_time_ms,
        };

        let memory = self.memory.clone();
        let write = tokio::task::spawn_blocking(move || memory.record_outcome(record, attempt));
        match write.await {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => {
                warn!("Could not save healing for '{}': {}", request.failed_selector, e);
                None
            }
            Err(e) => {
                warn!("Healing memory write did not complete: {}", e);
                None
            }
        }
    }
}

/// Memory is keyed by the selector without surrounding whitespace
fn trim_failed_selector(request: &HealRequest) -> Cow<'_, HealRequest> {
    let trimmed = request.failed_selector.trim();
    if trimmed.len() == request.failed_selector.len() {
        Cow::Borrowed(request)
    } else {
        Cow::Owned(HealRequest {
            failed_selector: trimmed.to_string(),
            ..request.clone()
        })
    }
}

fn gather_elements(request: &HealRequest) -> GatheredDom {
    match request.dom_source() {
        Some(DomSource::Semantic(dom)) => GatheredDom {
            total_elements: dom.total_elements.unwrap_or(dom.elements.len()),
            elements: dom.elements.clone(),
            pre_extracted: true,
        },
        Some(DomSource::Interactive(elements)) => GatheredDom {
            total_elements: elements.len(),
            elements: elements.to_vec(),
            pre_extracted: true,
        },
        Some(DomSource::Html(html)) => {
            let normalized = dom::normalize(html);
            GatheredDom {
                elements: normalized.elements,
                total_elements: normalized.total_elements,
                pre_extracted: false,
            }
        }
        None => GatheredDom {
            elements: Vec::new(),
            total_elements: 0,
            pre_extracted: false,
        },
    }
}

/// Selectors an extractor already attached to its descriptors
fn derived(elements: &[ElementDescriptor], kind: SelectorKind) -> Vec<String> {
    elements
        .iter()
        .flat_map(|el| [Some(el.derived_selector.as_str()), el.derived_xpath.as_deref()])
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty() && SelectorKind::detect(s) == kind)
        .map(str::to_string)
        .collect()
}

fn memory_hit(request_id: String, record: HealingRecord, processing_time_ms: f64) -> HealResponse {
    let report = CandidateReport {
        selector: record.new_selector.clone(),
        kind: record.selector_type,
        score: round3(record.confidence),
        base_confidence: round3(record.confidence),
        stability: None,
        semantic: None,
        validation: None,
        llm_chosen: false,
    };
    HealResponse {
        request_id,
        message: "Memory hit".to_string(),
        chosen: Some(record.new_selector),
        candidates: vec![report],
        healing_id: Some(record.id),
        metadata: HealMetadata {
            cached: true,
            processing_time_ms,
            ..HealMetadata::default()
        },
    }
}

fn failed_response(error: &HealerError) -> HealResponse {
    HealResponse {
        request_id: new_request_id(),
        message: format!("Failed: {}", error),
        chosen: None,
        candidates: Vec::new(),
        healing_id: None,
        metadata: HealMetadata::default(),
    }
}

/// `req_` followed by 12 hex characters
pub fn new_request_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("req_{}", &hex[..12])
}

fn elapsed_ms(started: Instant) -> f64 {
    let ms = started.elapsed().as_secs_f64() * 1000.0;
    (ms * 100.0).round() / 100.0
}

#[cfg(test)]
#[path = "healer_test.rs"]
mod healer_test;
