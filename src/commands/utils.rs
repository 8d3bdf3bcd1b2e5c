use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use selector_healer::{Healer, HealerConfig, HealerError, JsonFileMemory};

/// Flags shared by every command
pub struct HealerOptions {
    pub db: Option<PathBuf>,
    pub no_llm: bool,
}

/// Configuration from the environment with CLI overrides applied
pub fn load_config(options: &HealerOptions) -> Result<HealerConfig> {
    let mut config = HealerConfig::from_env()?;
    if let Some(db) = &options.db {
        config.store_path = db.clone();
    }
    if options.no_llm {
        config.api_key = None;
    }
    Ok(config)
}

pub fn open_memory(config: &HealerConfig) -> Result<JsonFileMemory> {
    debug!("Using healing memory at {}", config.store_path.display());
    Ok(JsonFileMemory::open(&config.store_path)?)
}

/// Build a healer wired to the configured store and, unless disabled, OpenRouter.
pub fn build_healer(options: &HealerOptions) -> Result<Healer> {
    let config = load_config(options)?;
    let memory = open_memory(&config)?;
    Ok(Healer::new(Arc::new(config), Arc::new(memory)).with_openrouter())
}

/// Argument text, or the contents of a file when it starts with @
pub fn read_arg(value: &str) -> Result<String> {
    if let Some(file_path) = value.strip_prefix('@') {
        std::fs::read_to_string(file_path)
            .context(format!("Failed to read input from file: {}", file_path))
    } else {
        Ok(value.to_string())
    }
}

/// Parse a JSON argument (inline or @file) into `T`.
pub fn parse_json_arg<T: DeserializeOwned>(value: &str, what: &str) -> Result<T> {
    let text = read_arg(value)?;
    serde_json::from_str(&text)
        .map_err(|e| HealerError::InvalidRequest(format!("invalid {} JSON: {}", what, e)).into())
}
