//! Process-wide heuristic configuration.
//!
//! Everything the generator, scorer and pipeline tune on lives in one
//! immutable [`HealerConfig`] that callers pass explicitly. Values come from
//! defaults, then environment variables, then CLI overrides.

use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::HealerError;

pub const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_LLM_MODEL: &str = "meta-llama/llama-3-8b-instruct";
pub const DEFAULT_VISION_MODEL: &str = "google/gemini-pro-vision";

/// Patterns that mark a selector as likely to churn between deploys.
pub const DEFAULT_VOLATILE_PATTERNS: &[&str] = &[
    // Framework-generated attribute names (Vue scoped styles, React ids)
    r"data-v-[0-9a-f]{6,}",
    r"data-reactid",
    // CSS-in-JS hashed class names
    r"\b(?:css|sc|jsx|emotion)-[A-Za-z0-9]{5,}\b",
    // Long hex-like tokens
    r"\b[0-9a-f]{8,}\b",
    // A/B test and experiment prefixes
    r"\b(?:weblab|dingo|csa|abtest|optimizely|vwo)[\w-]*",
];

/// Words dropped from a usage hint before keyword matching.
pub const DEFAULT_STOP_WORDS: &[&str] = &[
    "click", "on", "the", "a", "an", "to", "for", "of", "in", "and", "or", "with", "button", "link",
    "field", "input", "select", "this", "that", "into", "from", "as",
];

/// Weights for combining the three sub-scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub base: f64,
    pub stability: f64,
    pub semantic: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            base: 0.3,
            stability: 0.4,
            semantic: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealerConfig {
    /// OpenRouter API key; LLM collaborators are disabled without one
    pub api_key: Option<String>,
    pub api_url: String,
    pub llm_model: String,
    pub vision_model: String,
    pub llm_max_tokens: u32,
    pub llm_temperature: f32,
    /// Upper bound on every remote call
    pub llm_timeout: Duration,
    pub weights: ScoringWeights,
    /// Limit on the merged candidate set that gets scored
    pub max_candidates: usize,
    /// Limit on CSS candidates generated from the DOM
    pub max_dom_candidates: usize,
    pub max_xpath_candidates: usize,
    /// How many locally-ranked candidates are offered to the rerank collaborator
    pub rerank_top_n: usize,
    /// Text at or above this many characters is never used in a selector
    pub text_length_cutoff: usize,
    pub enable_screenshot_analysis: bool,
    pub enable_xpath_generation: bool,
    pub store_path: PathBuf,
    pub volatile_patterns: Vec<Regex>,
    pub stop_words: Vec<String>,
}

impl HealerConfig {
    /// Defaults with the given volatile patterns compiled.
    pub fn with_volatile_patterns(patterns: &[&str]) -> Result<Self, HealerError> {
        let volatile_patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| HealerError::Config(format!("invalid volatile pattern '{}': {}", p, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            api_key: None,
            api_url: DEFAULT_API_URL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            llm_max_tokens: 800,
            llm_temperature: 0.0,
            llm_timeout: Duration::from_secs(60),
            weights: ScoringWeights::default(),
            max_candidates: 40,
            max_dom_candidates: 40,
            max_xpath_candidates: 20,
            rerank_top_n: 8,
            text_length_cutoff: 60,
            enable_screenshot_analysis: true,
            enable_xpath_generation: true,
            store_path: default_store_path(),
            volatile_patterns,
            stop_words: DEFAULT_STOP_WORDS.iter().map(|w| w.to_string()).collect(),
        })
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, HealerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup, layered over defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, HealerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(key) = lookup("OPENROUTER_API_KEY").filter(|k| !k.trim().is_empty()) {
            config.api_key = Some(key);
        }
        if let Some(api_url) = lookup("OPENROUTER_URL") {
            url::Url::parse(&api_url)
                .map_err(|e| HealerError::Config(format!("OPENROUTER_URL is not a valid URL: {}", e)))?;
            config.api_url = api_url;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            config.llm_model = model;
        }
        if let Some(model) = lookup("VISION_MODEL") {
            config.vision_model = model;
        }
        if let Some(v) = lookup("LLM_MAX_TOKENS") {
            config.llm_max_tokens = parse_var("LLM_MAX_TOKENS", &v)?;
        }
        if let Some(v) = lookup("LLM_TEMPERATURE") {
            config.llm_temperature = parse_var("LLM_TEMPERATURE", &v)?;
        }
        if let Some(v) = lookup("LLM_TIMEOUT") {
            let secs: u64 = parse_var("LLM_TIMEOUT", &v)?;
            config.llm_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = lookup("SCORE_WEIGHT_BASE") {
            config.weights.base = parse_var("SCORE_WEIGHT_BASE", &v)?;
        }
        if let Some(v) = lookup("SCORE_WEIGHT_STABILITY") {
            config.weights.stability = parse_var("SCORE_WEIGHT_STABILITY", &v)?;
        }
        if let Some(v) = lookup("SCORE_WEIGHT_SEMANTIC") {
            config.weights.semantic = parse_var("SCORE_WEIGHT_SEMANTIC", &v)?;
        }
        if let Some(v) = lookup("MAX_CANDIDATES") {
            config.max_candidates = parse_var("MAX_CANDIDATES", &v)?;
        }
        if let Some(v) = lookup("MAX_DOM_CANDIDATES") {
            config.max_dom_candidates = parse_var("MAX_DOM_CANDIDATES", &v)?;
        }
        if let Some(v) = lookup("MAX_XPATH_CANDIDATES") {
            config.max_xpath_candidates = parse_var("MAX_XPATH_CANDIDATES", &v)?;
        }
        if let Some(v) = lookup("ENABLE_SCREENSHOT_ANALYSIS") {
            config.enable_screenshot_analysis = v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = lookup("ENABLE_XPATH_GENERATION") {
            config.enable_xpath_generation = v.eq_ignore_ascii_case("true");
        }
        if let Some(path) = lookup("HEALER_DB_PATH") {
            config.store_path = PathBuf::from(path);
        }

        if config.llm_timeout.is_zero() {
            return Err(HealerError::Config("LLM_TIMEOUT must be at least 1 second".to_string()));
        }

        Ok(config)
    }

    /// Whether remote LLM collaborators can be constructed.
    pub fn llm_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn is_volatile(&self, selector: &str) -> bool {
        self.volatile_patterns.iter().any(|p| p.is_match(selector))
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.iter().any(|w| w == word)
    }
}

impl Default for HealerConfig {
    fn default() -> Self {
        // The built-in patterns are known to compile
        match Self::with_volatile_patterns(DEFAULT_VOLATILE_PATTERNS) {
            Ok(config) => config,
            Err(e) => unreachable!("default volatile patterns must compile: {}", e),
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, HealerError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| HealerError::Config(format!("{} has an invalid value: '{}'", key, value)))
}

/// `~/.selector-healer/healings.json`, falling back to the working directory.
pub fn default_store_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".selector-healer"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("healings.json")
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
