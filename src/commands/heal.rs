use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

use crate::commands::utils::{self, HealerOptions};
use selector_healer::types::{HealRequest, HealResponse, OutputFormat, SelectorType};
use selector_healer::HealerError;

pub struct HealArgs {
    pub selector: Option<String>,
    pub html: Option<String>,
    pub request: Option<String>,
    pub url: Option<String>,
    pub use_of_selector: Option<String>,
    pub screenshot: Option<PathBuf>,
    pub selector_type: SelectorType,
}

impl HealArgs {
    /// Turn CLI arguments into a request; `--request` replaces the individual flags.
    pub fn into_request(self) -> Result<HealRequest> {
        if let Some(request) = &self.request {
            return utils::parse_json_arg(request, "request");
        }

        let Some(failed_selector) = self.selector else {
            return Err(HealerError::InvalidRequest(
                "a failed selector or --request is required".to_string(),
            )
            .into());
        };
        let html = self.html.as_deref().map(utils::read_arg).transpose()?;

        Ok(HealRequest {
            failed_selector,
            html,
            page_url: self.url,
            use_of_selector: self.use_of_selector,
            screenshot_path: self.screenshot,
            selector_type: self.selector_type,
            ..Default::default()
        })
    }
}

pub async fn handle_heal(args: HealArgs, options: &HealerOptions, format: OutputFormat) -> Result<()> {
    let request = args.into_request()?;
    info!("Healing selector: {}", request.failed_selector);

    let healer = utils::build_healer(options)?;
    let response = healer.heal(&request).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Simple => print_simple(&response),
    }
    Ok(())
}

pub fn print_simple(response: &HealResponse) {
    match &response.chosen {
        Some(chosen) => {
            println!("✓ {}: {}", response.message, chosen);
            if let Some(id) = response.healing_id {
                println!("  Healing id: {}", id);
            }
        }
        None => println!("✗ {}", response.message),
    }

    for (i, candidate) in response.candidates.iter().enumerate() {
        let marker = if candidate.llm_chosen { " (LLM pick)" } else { "" };
        println!(
            "  {}. [{:.3}] {} ({}){}",
            i + 1,
            candidate.score,
            candidate.selector,
            candidate.kind.as_str(),
            marker
        );
    }

    let meta = &response.metadata;
    println!(
        "  {} elements, {} candidates generated, {:.1}ms{}{}",
        meta.total_elements,
        meta.total_candidates_generated,
        meta.processing_time_ms,
        if meta.cached { ", from memory" } else { "" },
        if meta.llm_used || meta.llm_reranked { ", LLM assisted" } else { "" }
    );
}
