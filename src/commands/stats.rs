use anyhow::Result;

use crate::commands::utils::{self, HealerOptions};
use selector_healer::HealingMemory;
use selector_healer::types::OutputFormat;

pub fn handle_stats(options: &HealerOptions, format: OutputFormat) -> Result<()> {
    let config = utils::load_config(options)?;
    let memory = utils::open_memory(&config)?;
    let stats = memory.stats()?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Simple => {
            println!("Total healings:      {}", stats.total_healings);
            println!("Last 7 days:         {}", stats.recent_healings_count);
            println!("Average confidence:  {:.2}", stats.average_confidence);
            println!(
                "Feedback:            {} ({} positive, {} negative)",
                stats.total_with_feedback,
                stats.positive_feedback_count,
                stats.negative_feedback_count
            );
            println!("Success rate:        {:.0}%", stats.success_rate * 100.0);
            if !stats.most_healed_selectors.is_empty() {
                println!("Most healed selectors:");
                for entry in &stats.most_healed_selectors {
                    println!("  {:>4}  {}", entry.count, entry.selector);
                }
            }
        }
    }
    Ok(())
}
