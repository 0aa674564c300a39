// Worker configuration, read once from the environment at startup
use anyhow::{bail, Context, Result};
use promptcode_common::config::EvaluationConfig;
use std::env;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4";

/// Settings for the model endpoint
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl GenerationConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("LLM_API_KEY").context("LLM_API_KEY environment variable not set")?;
        if api_key.trim().is_empty() {
            bail!("LLM_API_KEY is empty");
        }

        Ok(Self {
            api_base: env::var("LLM_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            api_key,
            model: env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            timeout_secs: parse_env("LLM_TIMEOUT_SECS", 60)?,
            max_retries: parse_env("LLM_MAX_RETRIES", 2)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub redis_url: String,
    pub generation: GenerationConfig,
    pub evaluation: EvaluationConfig,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            generation: GenerationConfig::from_env()?,
            evaluation: EvaluationConfig::from_env().context("Invalid evaluation configuration")?,
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid value for {}: '{}'", key, raw))
}
