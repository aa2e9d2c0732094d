use crate::search::SimilarityMetric;
use dotenvy::dotenv;
use shared::utils::{normalize_suffix, split_list};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_CHAT_MODEL: &str = "llama3.2";
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 32;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Runtime settings, read once at startup and handed to constructors.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub ollama_base_url: String,
    pub embed_model: String,
    pub chat_model: String,
    pub top_k: usize,
    pub temperature: f32,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub embed_batch_size: usize,
    pub similarity: SimilarityMetric,
    pub file_suffixes: Vec<String>,
    pub ignored_dirs: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            top_k: DEFAULT_TOP_K,
            temperature: 0.0,
            request_timeout: Duration::from_secs(120),
            max_retries: 2,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            similarity: SimilarityMetric::Cosine,
            file_suffixes: vec![".md".to_string()],
            ignored_dirs: vec![".obsidian".to_string(), ".trash".to_string(), ".git".to_string()],
        }
    }
}

impl Config {
    /// Read `.env` (when present) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let file_suffixes = match lookup("RAG_FILE_SUFFIXES") {
            Some(raw) => split_list(&raw)
                .iter()
                .filter_map(|s| normalize_suffix(s))
                .collect(),
            None => defaults.file_suffixes,
        };
        let ignored_dirs = match lookup("RAG_IGNORED_DIRS") {
            Some(raw) => split_list(&raw),
            None => defaults.ignored_dirs,
        };
        let timeout_secs: u64 = parse_var(
            &lookup,
            "RAG_REQUEST_TIMEOUT_SECS",
            "a whole number of seconds",
            defaults.request_timeout.as_secs(),
        )?;

        let config = Self {
            ollama_base_url: lookup("OLLAMA_BASE_URL")
                .map(|url| url.trim().trim_end_matches('/').to_string())
                .unwrap_or(defaults.ollama_base_url),
            embed_model: lookup("OLLAMA_EMBED_MODEL").unwrap_or(defaults.embed_model),
            chat_model: lookup("OLLAMA_CHAT_MODEL").unwrap_or(defaults.chat_model),
            top_k: parse_var(&lookup, "RAG_TOP_K", "a positive integer", defaults.top_k)?,
            temperature: parse_var(
                &lookup,
                "RAG_TEMPERATURE",
                "a non-negative number",
                defaults.temperature,
            )?,
            request_timeout: Duration::from_secs(timeout_secs),
            max_retries: parse_var(
                &lookup,
                "RAG_MAX_RETRIES",
                "a non-negative integer",
                defaults.max_retries,
            )?,
            embed_batch_size: parse_var(
                &lookup,
                "RAG_EMBED_BATCH_SIZE",
                "a positive integer",
                defaults.embed_batch_size,
            )?,
            similarity: parse_var(
                &lookup,
                "RAG_SIMILARITY",
                "cosine or dot_product",
                defaults.similarity,
            )?,
            file_suffixes,
            ignored_dirs,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(invalid("RAG_TOP_K", "a positive integer", "0"));
        }
        if self.embed_batch_size == 0 {
            return Err(invalid("RAG_EMBED_BATCH_SIZE", "a positive integer", "0"));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(invalid(
                "RAG_TEMPERATURE",
                "a non-negative number",
                &self.temperature.to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(invalid(
                "RAG_REQUEST_TIMEOUT_SECS",
                "a whole number of seconds",
                "0",
            ));
        }
        if self.file_suffixes.is_empty() {
            return Err(invalid(
                "RAG_FILE_SUFFIXES",
                "a comma separated list of suffixes",
                "",
            ));
        }
        Ok(())
    }
}

fn parse_var<T, F>(
    lookup: &F,
    var: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| invalid(var, expected, &raw)),
    }
}

fn invalid(var: &'static str, expected: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        expected,
        value: value.to_string(),
    }
}
