// Unit tests for rerank module

use super::*;
use crate::config::ScoringWeights;
use crate::llm::LlmError;
use crate::types::{SelectorKind, Validation};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// Returns a fixed answer and records what it was offered
struct FixedPick {
    answer: Result<RerankPick, String>,
    offered: Mutex<Vec<String>>,
}

impl FixedPick {
    fn chosen(selector: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(RerankPick::Chosen(selector.to_string())),
            offered: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            answer: Err("boom".to_string()),
            offered: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl RerankProvider for FixedPick {
    async fn pick(&self, offered: &[String], _usage_hint: &str) -> Result<RerankPick, LlmError> {
        *self.offered.lock().unwrap() = offered.to_vec();
        match &self.answer {
            Ok(pick) => Ok(pick.clone()),
            Err(e) => Err(LlmError::Transport(e.clone())),
        }
    }
}

struct NeverAnswers;

#[async_trait]
impl RerankProvider for NeverAnswers {
    async fn pick(&self, _offered: &[String], _usage_hint: &str) -> Result<RerankPick, LlmError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(RerankPick::NoConfidentPick)
    }
}

fn candidate(selector: &str, stability: f64) -> Candidate {
    Candidate::new(
        selector,
        SelectorKind::Css,
        0.5,
        stability,
        0.0,
        Validation::Present,
        &ScoringWeights::default(),
    )
}

/// Ten candidates with strictly decreasing scores: #c0 > #c1 > ... > #c9
fn ten_candidates() -> Vec<Candidate> {
    (0..10).map(|i| candidate(&format!("#c{}", i), 1.0 - i as f64 * 0.05)).collect()
}

fn selectors(outcome: &RerankOutcome) -> Vec<String> {
    outcome.ranked.iter().map(|r| r.selector().to_string()).collect()
}

fn reranker(provider: Option<Arc<dyn RerankProvider>>) -> Reranker {
    Reranker::new(Arc::new(HealerConfig::default()), provider)
}

#[test]
fn test_rank_locally_is_stable_on_ties() {
    let ranked = rank_locally(vec![
        candidate("#low", 0.2),
        candidate("#tie-a", 0.8),
        candidate("#tie-b", 0.8),
        candidate("#high", 1.0),
    ]);
    let order: Vec<_> = ranked.iter().map(|r| r.selector()).collect();
    assert_eq!(order, vec!["#high", "#tie-a", "#tie-b", "#low"]);
}

#[tokio::test]
async fn test_empty_input_has_no_choice() {
    let outcome = reranker(Some(FixedPick::chosen("#x"))).rerank(vec![], Some("submit")).await;
    assert!(outcome.chosen().is_none());
    assert!(!outcome.llm_reranked);
    assert_eq!(
        outcome.states,
        vec![RerankState::Generated, RerankState::LocallyScored, RerankState::Finalized]
    );
}

#[tokio::test]
async fn test_llm_pick_moves_to_top_with_boost() {
    let provider = FixedPick::chosen("#c3");
    let outcome = reranker(Some(provider.clone())).rerank(ten_candidates(), Some("open menu")).await;

    assert!(outcome.llm_reranked);
    assert_eq!(
        selectors(&outcome)[..5],
        ["#c3", "#c0", "#c1", "#c2", "#c4"].map(String::from)
    );

    let top = &outcome.ranked[0];
    assert!(top.llm_chosen);
    let previous_top = outcome.ranked[1].score;
    assert!((top.score - (previous_top + RERANK_BOOST)).abs() < 1e-9);
    // The candidate's own score is not overwritten
    assert!(top.candidate.final_score() < previous_top);

    // Exactly the top 8 were offered
    let offered = provider.offered.lock().unwrap().clone();
    assert_eq!(offered.len(), 8);
    assert_eq!(offered[0], "#c0");
    assert_eq!(offered[7], "#c7");
}

#[tokio::test]
async fn test_pick_outside_offered_list_is_ignored() {
    let before: Vec<String> = rank_locally(ten_candidates())
        .iter()
        .map(|r| r.selector().to_string())
        .collect();

    // #c9 exists but was not among the top 8 offered
    let outcome = reranker(Some(FixedPick::chosen("#c9"))).rerank(ten_candidates(), Some("x")).await;
    assert_eq!(selectors(&outcome), before);
    assert!(!outcome.llm_reranked);

    let outcome = reranker(Some(FixedPick::chosen("#invented"))).rerank(ten_candidates(), Some("x")).await;
    assert_eq!(selectors(&outcome), before);
}

#[tokio::test]
async fn test_no_hint_skips_llm() {
    let provider = FixedPick::chosen("#c3");
    let outcome = reranker(Some(provider.clone())).rerank(ten_candidates(), None).await;

    assert_eq!(selectors(&outcome)[0], "#c0");
    assert!(provider.offered.lock().unwrap().is_empty());
    assert!(!outcome.states.contains(&RerankState::LlmRerankRequested));
}

#[tokio::test]
async fn test_single_candidate_skips_llm() {
    let provider = FixedPick::chosen("#only");
    let outcome = reranker(Some(provider.clone()))
        .rerank(vec![candidate("#only", 0.5)], Some("x"))
        .await;

    assert!(!outcome.llm_reranked);
    assert!(provider.offered.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_provider_error_keeps_local_order() {
    let outcome = reranker(Some(FixedPick::failing())).rerank(ten_candidates(), Some("x")).await;
    assert_eq!(selectors(&outcome)[0], "#c0");
    assert!(!outcome.llm_reranked);
    assert_eq!(outcome.states.last(), Some(&RerankState::Finalized));
}

#[tokio::test]
async fn test_provider_timeout_keeps_local_order() {
    let config = HealerConfig {
        llm_timeout: Duration::from_millis(50),
        ..HealerConfig::default()
    };
    let reranker = Reranker::new(Arc::new(config), Some(Arc::new(NeverAnswers)));
    let outcome = reranker.rerank(ten_candidates(), Some("x")).await;
    assert_eq!(selectors(&outcome)[0], "#c0");
    assert!(!outcome.llm_reranked);
}

#[test]
fn test_boost_is_capped() {
    let mut ranked = rank_locally(vec![candidate("#a", 1.0), candidate("#b", 0.9)]);
    ranked[0].score = 0.98;
    let offered = vec!["#a".to_string(), "#b".to_string()];

    assert!(apply_pick(&mut ranked, &offered, "#b"));
    assert_eq!(ranked[0].selector(), "#b");
    assert_eq!(ranked[0].score, 1.0);
}
