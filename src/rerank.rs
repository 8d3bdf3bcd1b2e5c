//! Final ordering of scored candidates.
//!
//! Ranking moves through `Generated -> LocallyScored -> (LlmRerankRequested)
//! -> Finalized`. The local sort always runs. The remote step only runs with at
//! least two candidates and a usage hint, and any failure there leaves the
//! local order untouched.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::HealerConfig;
use crate::llm::{RerankPick, RerankProvider};
use crate::types::{Candidate, RankedCandidate};

/// Added to the previous top score when the LLM promotes a candidate
pub const RERANK_BOOST: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerankState {
    Generated,
    LocallyScored,
    LlmRerankRequested,
    Finalized,
}

#[derive(Debug, Clone)]
pub struct RerankOutcome {
    pub ranked: Vec<RankedCandidate>,
    /// True only when the LLM pick was applied
    pub llm_reranked: bool,
    /// States visited, in order
    pub states: Vec<RerankState>,
}

impl RerankOutcome {
    /// Top entry, or none for an empty input
    pub fn chosen(&self) -> Option<&RankedCandidate> {
        self.ranked.first()
    }
}

pub struct Reranker {
    config: Arc<HealerConfig>,
    provider: Option<Arc<dyn RerankProvider>>,
}

impl Reranker {
    pub fn new(config: Arc<HealerConfig>, provider: Option<Arc<dyn RerankProvider>>) -> Self {
        Self { config, provider }
    }

    pub async fn rerank(&self, candidates: Vec<Candidate>, usage_hint: Option<&str>) -> RerankOutcome {
        let mut states = vec![RerankState::Generated];

        let mut ranked = rank_locally(candidates);
        states.push(RerankState::LocallyScored);

        let mut llm_reranked = false;
        if let (Some(provider), Some(hint)) = (&self.provider, usage_hint)
            && ranked.len() >= 2
        {
            states.push(RerankState::LlmRerankRequested);
            let offered: Vec<String> = ranked
                .iter()
                .take(self.config.rerank_top_n)
                .map(|r| r.selector().to_string())
                .collect();

            if let Some(chosen) = self.request_pick(provider.as_ref(), &offered, hint).await {
                llm_reranked = apply_pick(&mut ranked, &offered, &chosen);
            }
        }

        states.push(RerankState::Finalized);
        RerankOutcome {
            ranked,
            llm_reranked,
            states,
        }
    }

    /// Ask the collaborator for a pick. Every failure mode maps to `None`.
    async fn request_pick(
        &self,
        provider: &dyn RerankProvider,
        offered: &[String],
        hint: &str,
    ) -> Option<String> {
        let timeout = self.config.llm_timeout;
        match tokio::time::timeout(timeout, provider.pick(offered, hint)).await {
            Ok(Ok(RerankPick::Chosen(chosen))) => {
                info!("LLM rerank chose '{}'", chosen);
                Some(chosen)
            }
            Ok(Ok(RerankPick::NoConfidentPick)) => {
                debug!("LLM rerank made no confident pick");
                None
            }
            Ok(Err(e)) => {
                warn!("LLM rerank failed, keeping local order: {}", e);
                None
            }
            Err(_) => {
                warn!("LLM rerank timed out after {:?}, keeping local order", timeout);
                None
            }
        }
    }
}

/// Sort by final score, highest first. Ties keep insertion order.
pub fn rank_locally(candidates: Vec<Candidate>) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = candidates.into_iter().map(RankedCandidate::local).collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

/// Move `chosen` to the top with a boosted score.
///
/// Returns false, leaving `ranked` untouched, when `chosen` was not offered.
pub fn apply_pick(ranked: &mut Vec<RankedCandidate>, offered: &[String], chosen: &str) -> bool {
    if !offered.iter().any(|o| o == chosen) {
        warn!("LLM rerank returned '{}', which was not offered", chosen);
        return false;
    }
    let Some(position) = ranked.iter().position(|r| r.selector() == chosen) else {
        return false;
    };
    let top_score = ranked.first().map(|r| r.score).unwrap_or(0.0);

    let mut picked = ranked.remove(position);
    picked.score = (top_score.max(0.0) + RERANK_BOOST).min(1.0);
    picked.llm_chosen = true;
    ranked.insert(0, picked);
    true
}

#[cfg(test)]
#[path = "rerank_test.rs"]
mod rerank_test;
