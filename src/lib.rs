//! # selector-healer
#![allow(clippy::uninlined_format_args)]
//!
//! Repairs broken CSS and XPath selectors for UI test automation.
//!
//! Given a selector that no longer matches, a snapshot of the page and an
//! optional hint describing what the selector was for, the healer proposes
//! ranked replacement selectors, each annotated with stability, semantic and
//! validation sub-scores.
//!
//! ## CLI Usage
//!
//! ```bash
//! # Heal a selector against a saved page
//! selector-healer heal "a.cta_button[aria-label^='Watch the webinar']" \
//!   --html @page.html --use "watch the webinar"
//!
//! # Heal from a full request document
//! selector-healer heal --request @request.json
//!
//! # Heal up to 10 selectors at once
//! selector-healer batch @requests.json
//!
//! # Tell the healer whether a healing worked
//! selector-healer feedback 12 positive --comment "clicked the right button"
//!
//! # Browse and summarize what has been healed
//! selector-healer history --url shop.example.com
//! selector-healer stats --format simple
//! selector-healer health
//! ```
//!
//! Results are JSON on stdout; logs go to stderr (`RUST_LOG=selector_healer=debug`).
//! Set `OPENROUTER_API_KEY` to enable LLM suggestions, reranking and screenshot
//! analysis; without it (or with `--no-llm`) healing is purely local.
//!
//! ## Library Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use selector_healer::{HealRequest, Healer, HealerConfig, JsonFileMemory};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Arc::new(HealerConfig::default());
//! let memory = Arc::new(JsonFileMemory::in_memory());
//! let healer = Healer::new(config, memory);
//!
//! let response = healer
//!     .heal(&HealRequest {
//!         failed_selector: "#old-submit".to_string(),
//!         html: Some(r#"<button data-testid="submit-btn">Send</button>"#.to_string()),
//!         use_of_selector: Some("submit the form".to_string()),
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("{:?}", response.chosen);
//! # Ok(())
//! # }
//! ```

/// Heuristic configuration shared by every pipeline stage
pub mod config;

/// DOM normalization on top of scraper
pub mod dom;

/// Error types with process exit codes
pub mod errors;

/// CSS and XPath candidate generation
pub mod generator;

/// End-to-end healing pipeline
pub mod healer;

/// LLM collaborators and the OpenRouter client
pub mod llm;

/// Persisted healings, feedback and attempts
pub mod memory;

/// Local ranking and the optional LLM rerank step
pub mod rerank;

/// Candidate scoring and validation
pub mod scorer;

/// Type definitions for requests, candidates and reports
pub mod types;

pub use config::HealerConfig;
pub use errors::HealerError;
pub use healer::Healer;
pub use llm::{LlmError, OpenRouterClient, RerankProvider, SuggestionProvider, VisionProvider};
pub use memory::{HealingMemory, JsonFileMemory};
pub use types::{
    BatchHealResponse, Candidate, CandidateReport, ElementDescriptor, FeedbackRating,
    HealRequest, HealResponse, HealingStats, HistoryPage, OutputFormat, SelectorKind,
    SelectorType, SemanticDom,
};
