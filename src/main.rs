#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use selector_healer::errors::HealerError;
use selector_healer::types::{FeedbackRating, OutputFormat, SelectorType};

// Exit codes
const EXIT_SUCCESS: i32 = 0;

#[derive(Parser)]
#[command(name = "selector-healer")]
#[command(about = "Heal broken CSS and XPath selectors", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    format: OutputFormat,

    /// Healing memory file (overrides HEALER_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Heal with local heuristics only, even when an API key is set
    #[arg(long = "no-llm", global = true)]
    no_llm: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Heal one broken selector
    Heal {
        /// The selector that no longer matches (omit when using --request)
        selector: Option<String>,

        /// Page HTML, or @file to read it from a file
        #[arg(long)]
        html: Option<String>,

        /// Full request as JSON, or @file
        #[arg(long, conflicts_with_all = ["selector", "html"])]
        request: Option<String>,

        /// URL of the page the selector ran on
        #[arg(long)]
        url: Option<String>,

        /// What the selector is used for (e.g. "click the login button")
        #[arg(long = "use")]
        use_of_selector: Option<String>,

        /// Screenshot of the page for visual analysis (PNG)
        #[arg(long)]
        screenshot: Option<PathBuf>,

        /// Which selector families to generate
        #[arg(long, default_value = "mixed")]
        selector_type: SelectorType,
    },

    /// Heal up to 10 selectors from a JSON array of requests
    Batch {
        /// JSON array of requests, or @file
        requests: String,
    },

    /// Record whether a healed selector worked
    Feedback {
        /// Healing id returned by heal
        healing_id: u64,

        /// positive or negative
        rating: FeedbackRating,

        /// Free-text comment
        #[arg(long)]
        comment: Option<String>,

        /// Selector that was actually used instead
        #[arg(long)]
        actual_selector: Option<String>,
    },

    /// List past healings, newest first
    History {
        /// Page number (starting at 1)
        #[arg(long, default_value = "1")]
        page: usize,

        /// Healings per page
        #[arg(long, default_value = "20")]
        page_size: usize,

        /// Only healings whose page URL contains this text
        #[arg(long)]
        url: Option<String>,
    },

    /// Summary statistics over the healing memory
    Stats,

    /// Check the healing memory and LLM configuration
    Health,
}

#[tokio::main]
async fn main() {
    let result = run().await;

    match result {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(err) => {
            // Convert to our error type to get proper exit code
            let healer_err: HealerError = err.into();

            // Output JSON error to stdout for programmatic consumption
            let error_json = json!({
                "error": true,
                "message": healer_err.to_string(),
                "exit_code": healer_err.exit_code()
            });
            println!(
                "{}",
                serde_json::to_string(&error_json).unwrap_or_else(|_| "{}".to_string())
            );

            // Also log to stderr for human reading
            eprintln!("Error: {}", healer_err);
            std::process::exit(healer_err.exit_code());
        }
    }
}

async fn run() -> Result<()> {
    // Initialize tracing to stderr (so JSON output to stdout remains clean)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "selector_healer=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let cli = Cli::parse();
    let options = commands::utils::HealerOptions {
        db: cli.db,
        no_llm: cli.no_llm,
    };

    match cli.command {
        Commands::Heal {
            selector,
            html,
            request,
            url,
            use_of_selector,
            screenshot,
            selector_type,
        } => {
            commands::heal::handle_heal(
                commands::heal::HealArgs {
                    selector,
                    html,
                    request,
                    url,
                    use_of_selector,
                    screenshot,
                    selector_type,
                },
                &options,
                cli.format,
            )
            .await?
        }

        Commands::Batch { requests } => {
            commands::batch::handle_batch(requests, &options, cli.format).await?
        }

        Commands::Feedback {
            healing_id,
            rating,
            comment,
            actual_selector,
        } => commands::feedback::handle_feedback(
            healing_id,
            rating,
            comment,
            actual_selector,
            &options,
            cli.format,
        )?,

        Commands::History {
            page,
            page_size,
            url,
        } => commands::history::handle_history(page, page_size, url, &options, cli.format)?,

        Commands::Stats => commands::stats::handle_stats(&options, cli.format)?,

        Commands::Health => commands::health::handle_health(&options, cli.format)?,
    }

    Ok(())
}
