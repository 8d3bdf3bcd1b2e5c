use anyhow::Result;

use crate::commands::utils::{self, HealerOptions};
use selector_healer::types::OutputFormat;

pub fn handle_health(options: &HealerOptions, format: OutputFormat) -> Result<()> {
    let healer = utils::build_healer(options)?;
    let report = healer.health();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Simple => {
            println!("{} v{}: {}", env!("CARGO_PKG_NAME"), report.version, report.status);
            println!(
                "  Healing memory: {} ({})",
                if report.store_reachable { "ok" } else { "unreachable" },
                healer.config().store_path.display()
            );
            println!(
                "  LLM API:        {}",
                if report.llm_api_available { "configured" } else { "not configured" }
            );
        }
    }
    Ok(())
}
