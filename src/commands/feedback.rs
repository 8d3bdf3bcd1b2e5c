use anyhow::Result;
use serde_json::json;
use tracing::info;

use crate::commands::utils::{self, HealerOptions};
use selector_healer::HealingMemory;
use selector_healer::types::{FeedbackRating, OutputFormat};

pub fn handle_feedback(
    healing_id: u64,
    rating: FeedbackRating,
    comment: Option<String>,
    actual_selector: Option<String>,
    options: &HealerOptions,
    format: OutputFormat,
) -> Result<()> {
    let config = utils::load_config(options)?;
    let memory = utils::open_memory(&config)?;

    let feedback_id = memory.attach_feedback(healing_id, rating, comment, actual_selector)?;
    info!("Recorded {:?} feedback for healing {}", rating, healing_id);

    match format {
        OutputFormat::Json => {
            let result = json!({
                "success": true,
                "feedback_id": feedback_id,
                "healing_id": healing_id,
                "message": "Feedback recorded successfully"
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Simple => {
            println!("✓ Feedback {} recorded for healing {}", feedback_id, healing_id);
        }
    }
    Ok(())
}
