use anyhow::Result;

use crate::commands::utils::{self, HealerOptions};
use selector_healer::HealingMemory;
use selector_healer::types::{FeedbackRating, OutputFormat};

pub fn handle_history(
    page: usize,
    page_size: usize,
    url: Option<String>,
    options: &HealerOptions,
    format: OutputFormat,
) -> Result<()> {
    let config = utils::load_config(options)?;
    let memory = utils::open_memory(&config)?;
    let history = memory.history(page, page_size, url.as_deref())?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&history)?),
        OutputFormat::Simple => {
            if history.items.is_empty() {
                println!("No healings found");
                return Ok(());
            }
            for item in &history.items {
                let verdict = match item.feedback_rating {
                    Some(FeedbackRating::Positive) => "✓",
                    Some(FeedbackRating::Negative) => "✗",
                    None => "-",
                };
                println!(
                    "{} #{} {} -> {} [{:.2}] {}",
                    verdict,
                    item.id,
                    item.old_selector,
                    item.new_selector,
                    item.confidence,
                    item.timestamp.format("%Y-%m-%d %H:%M:%S")
                );
            }
            println!(
                "Page {} ({} of {} healings){}",
                history.page,
                history.items.len(),
                history.total_count,
                if history.has_more { ", more available" } else { "" }
            );
        }
    }
    Ok(())
}
