use std::env;
use std::str::FromStr;

use tracing::info;

use crate::types::{CAUSE_THRESHOLD, TOPIC_THRESHOLD};

const DEFAULT_HF_BASE_URL: &str = "https://router.huggingface.co/hf-inference/models";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Hosted inference
    pub hf_api_token: String,
    pub hf_base_url: String,
    pub sentiment_model: String,
    pub emotion_model: String,
    pub zero_shot_model: String,
    pub embedding_model: String,

    // Headline rewriting (optional)
    pub openai_api_key: Option<String>,
    pub headline_model: String,

    // Pipeline tunables
    pub newsfeed_top_n: usize,
    pub num_clusters: usize,
    pub topic_threshold: f64,
    pub cause_threshold: f64,
    pub classify_concurrency: usize,
    pub fail_fast: bool,
    pub rng_seed: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing or malformed.
    pub fn from_env() -> Self {
        Self {
            hf_api_token: required_env("HF_API_TOKEN"),
            hf_base_url: env::var("HF_BASE_URL").unwrap_or_else(|_| DEFAULT_HF_BASE_URL.to_string()),
            sentiment_model: env::var("SENTIMENT_MODEL").unwrap_or_else(|_| {
                "distilbert/distilbert-base-uncased-finetuned-sst-2-english".to_string()
            }),
            emotion_model: env::var("EMOTION_MODEL")
                .unwrap_or_else(|_| "j-hartmann/emotion-english-distilroberta-base".to_string()),
            zero_shot_model: env::var("ZERO_SHOT_MODEL")
                .unwrap_or_else(|_| "facebook/bart-large-mnli".to_string()),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "sentence-transformers/all-MiniLM-L6-v2".to_string()),
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            headline_model: env::var("HEADLINE_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            newsfeed_top_n: parsed_env("NEWSFEED_TOP_N", 3),
            num_clusters: parsed_env("NUM_CLUSTERS", 3),
            topic_threshold: parsed_env("TOPIC_THRESHOLD", TOPIC_THRESHOLD),
            cause_threshold: parsed_env("CAUSE_THRESHOLD", CAUSE_THRESHOLD),
            classify_concurrency: parsed_env("CLASSIFY_CONCURRENCY", 4),
            fail_fast: parsed_env("FAIL_FAST", false),
            rng_seed: env::var("RNG_SEED").ok().map(|v| {
                v.parse()
                    .unwrap_or_else(|_| panic!("RNG_SEED must be an unsigned integer, got {v}"))
            }),
        }
    }

    /// Log the effective configuration with secrets masked.
    pub fn log_redacted(&self) {
        let openai_api_key = self
            .openai_api_key
            .as_deref()
            .map(redact)
            .unwrap_or_else(|| "(unset)".to_string());
        info!(
            hf_api_token = %redact(&self.hf_api_token),
            hf_base_url = self.hf_base_url.as_str(),
            sentiment_model = self.sentiment_model.as_str(),
            emotion_model = self.emotion_model.as_str(),
            zero_shot_model = self.zero_shot_model.as_str(),
            embedding_model = self.embedding_model.as_str(),
            openai_api_key = %openai_api_key,
            headline_model = self.headline_model.as_str(),
            newsfeed_top_n = self.newsfeed_top_n,
            num_clusters = self.num_clusters,
            topic_threshold = self.topic_threshold,
            cause_threshold = self.cause_threshold,
            classify_concurrency = self.classify_concurrency,
            fail_fast = self.fail_fast,
            rng_seed = ?self.rng_seed,
            "Configuration loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parsed_env<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .unwrap_or_else(|_| panic!("{key} has an invalid value: {value}")),
        Err(_) => default,
    }
}

fn redact(secret: &str) -> String {
    if secret.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = secret.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("****{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_keeps_only_tail() {
        assert_eq!(redact("hf_abcdefgh1234"), "****1234");
        assert_eq!(redact("abc"), "****");
    }
}
