use anyhow::Result;
use tracing::info;

use crate::commands::heal::print_simple;
use crate::commands::utils::{self, HealerOptions};
use selector_healer::types::{HealRequest, OutputFormat};

pub async fn handle_batch(requests: String, options: &HealerOptions, format: OutputFormat) -> Result<()> {
    // Read from file if starts with @
    let requests: Vec<HealRequest> = utils::parse_json_arg(&requests, "batch")?;
    info!("Executing batch of {} healings", requests.len());

    let healer = utils::build_healer(options)?;
    let batch = healer.heal_batch(&requests).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&batch)?),
        OutputFormat::Simple => {
            for (request, response) in requests.iter().zip(&batch.results) {
                println!("{}", request.failed_selector);
                print_simple(response);
            }
            println!("\nBatch complete in {:.1}ms:", batch.processing_time_ms);
            println!("  ✓ {} selectors healed", batch.total_succeeded);
            if batch.total_failed > 0 {
                println!("  ✗ {} selectors not healed", batch.total_failed);
            }
        }
    }
    Ok(())
}
