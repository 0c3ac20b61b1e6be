use anyhow::{Context as _, anyhow};
use session_store::StoreConfig;
use std::str::FromStr;
use std::time::Duration;

use crate::collaborators::answer::TokenBudget;

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_ANSWER_MODEL: &str = "meta-llama/llama-4-scout";
pub const DEFAULT_NARRATIVE_MODEL: &str = "google/gemini-flash-1.5";
pub const DEFAULT_CHAT_MODEL: &str = "meta-llama/llama-4-scout";
pub const DEFAULT_CLASSIFIER_URL: &str =
    "http://localhost:8501/v1/models/brain_tumor_classifier:predict";
pub const DEFAULT_SEGMENTATION_URL: &str =
    "https://api-inference.huggingface.co/models/khoongwei/brain-tumor-segmentation";

/// Endpoints and credentials for the OpenAI-compatible language model API.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub answer_model: String,
    pub narrative_model: String,
    pub chat_model: String,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub llm: LlmConfig,
    pub classifier_url: String,
    pub pinecone_api_key: Option<String>,
    pub pinecone_index_host: Option<String>,
    pub hugging_face_api_key: Option<String>,
    pub segmentation_url: String,
    pub store: StoreConfig,
    pub token_budget: TokenBudget,
    pub decode_timeout: Duration,
    pub generation_timeout: Duration,
}

impl ServiceConfig {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let api_key = get("OPENROUTER_API_KEY")
            .ok_or_else(|| anyhow!("OPENROUTER_API_KEY environment variable is required"))?;

        let defaults = StoreConfig::default();
        let store = StoreConfig::new()
            .with_max_sessions(parse_or(&get, "SESSION_CAPACITY", defaults.max_sessions)?)
            .with_max_payload_bytes(parse_or(
                &get,
                "SESSION_MAX_BYTES",
                defaults.max_payload_bytes,
            )?)
            .with_ttl(Duration::from_secs(parse_or(
                &get,
                "SESSION_TTL_SECS",
                defaults.ttl.as_secs(),
            )?))
            .with_reap_interval(Duration::from_secs(parse_or(
                &get,
                "SESSION_REAP_INTERVAL_SECS",
                defaults.reap_interval.as_secs(),
            )?));
        store.validate()?;

        let token_budget = TokenBudget {
            max_tokens: parse_or(&get, "MAX_CONTEXT_TOKENS", TokenBudget::default().max_tokens)?,
            ..TokenBudget::default()
        };

        Ok(Self {
            port: parse_or(&get, "PORT", 3000)?,
            llm: LlmConfig {
                api_key,
                base_url: or("OPENROUTER_BASE_URL", OPENROUTER_BASE_URL),
                answer_model: or("ANSWER_MODEL", DEFAULT_ANSWER_MODEL),
                narrative_model: or("NARRATIVE_MODEL", DEFAULT_NARRATIVE_MODEL),
                chat_model: or("CHAT_MODEL", DEFAULT_CHAT_MODEL),
            },
            classifier_url: or("CLASSIFIER_URL", DEFAULT_CLASSIFIER_URL),
            pinecone_api_key: get("PINECONE_API_KEY"),
            pinecone_index_host: get("PINECONE_INDEX_HOST"),
            hugging_face_api_key: get("HUGGING_FACE_API_KEY"),
            segmentation_url: or("SEGMENTATION_URL", DEFAULT_SEGMENTATION_URL),
            store,
            token_budget,
            decode_timeout: Duration::from_secs(parse_or(&get, "DECODE_TIMEOUT_SECS", 60)?),
            generation_timeout: Duration::from_secs(parse_or(
                &get,
                "GENERATION_TIMEOUT_SECS",
                120,
            )?),
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        None => Ok(default),
    }
}
