// Hosted implementations of the capability traits.

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use citysense_common::{Config, EnvironmentReading, Sentiment};
use inference_client::{ChatClient, InferenceClient};

use crate::traits::{
    EmotionClassifier, HeadlineWriter, ScoredLabel, SentimentClassifier, TextEmbedder,
    ZeroShotClassifier, ZeroShotResult,
};

const HEADLINE_SYSTEM: &str =
    "You are a journalist AI that writes short, catchy, clear headlines.";
const HEADLINE_MAX_TOKENS: u32 = 60;

/// Model ids used by [`HostedModels`].
#[derive(Debug, Clone)]
pub struct ModelIds {
    pub sentiment: String,
    pub emotion: String,
    pub zero_shot: String,
    pub embedding: String,
}

impl ModelIds {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sentiment: config.sentiment_model.clone(),
            emotion: config.emotion_model.clone(),
            zero_shot: config.zero_shot_model.clone(),
            embedding: config.embedding_model.clone(),
        }
    }
}

/// Sentiment, emotion, zero-shot and embedding capabilities backed by one
/// hosted inference endpoint.
#[derive(Clone)]
pub struct HostedModels {
    client: InferenceClient,
    models: ModelIds,
}

impl HostedModels {
    pub fn new(client: InferenceClient, models: ModelIds) -> Self {
        Self { client, models }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let client = InferenceClient::new(config.hf_api_token.clone())?
            .with_base_url(&config.hf_base_url);
        Ok(Self::new(client, ModelIds::from_config(config)))
    }

    async fn top_label(&self, model: &str, text: &str) -> Result<ScoredLabel> {
        let scores = self.client.classify(model, text).await?;
        scores
            .into_iter()
            .next()
            .map(|s| ScoredLabel::new(s.label, s.score))
            .ok_or_else(|| anyhow!("{model} returned no labels"))
    }
}

#[async_trait]
impl SentimentClassifier for HostedModels {
    async fn sentiment(&self, text: &str) -> Result<ScoredLabel> {
        let mut top = self.top_label(&self.models.sentiment, text).await?;
        // Normalize provider spellings (LABEL casing, NEG/POS) when we know them.
        if let Some(sentiment) = Sentiment::from_label(&top.label) {
            top.label = sentiment.as_str().to_string();
        }
        Ok(top)
    }
}

#[async_trait]
impl EmotionClassifier for HostedModels {
    async fn emotion(&self, text: &str) -> Result<ScoredLabel> {
        self.top_label(&self.models.emotion, text).await
    }
}

#[async_trait]
impl ZeroShotClassifier for HostedModels {
    async fn zero_shot(
        &self,
        text: &str,
        labels: &[&str],
        multi_label: bool,
    ) -> Result<ZeroShotResult> {
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        let output = self
            .client
            .zero_shot(&self.models.zero_shot, text, &labels, multi_label)
            .await?;
        ZeroShotResult::new(output.labels, output.scores)
    }
}

#[async_trait]
impl TextEmbedder for HostedModels {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(self.client.embed(&self.models.embedding, texts).await?)
    }
}

#[async_trait]
impl HeadlineWriter for ChatClient {
    async fn headline(
        &self,
        base_line: &str,
        sentiment: Sentiment,
        environment: Option<&EnvironmentReading>,
    ) -> Result<String> {
        let prompt = headline_prompt(base_line, sentiment, environment);
        let headline = self.complete(HEADLINE_SYSTEM, prompt, HEADLINE_MAX_TOKENS).await?;
        if headline.is_empty() {
            return Err(anyhow!("{} returned an empty headline", self.model()));
        }
        Ok(headline)
    }
}

pub fn headline_prompt(
    base_line: &str,
    sentiment: Sentiment,
    environment: Option<&EnvironmentReading>,
) -> String {
    let weather = match environment {
        Some(env) => format!(
            "Weather: {} ({}°C)",
            env.description.as_deref().unwrap_or("Unknown"),
            env.rounded_temperature()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "?".to_string())
        ),
        None => "Weather: Unknown".to_string(),
    };
    let air = match environment {
        Some(env) => format!(
            "Air Quality: PM2.5={} ({})",
            env.pm25
                .map(|pm| format!("{pm:.0}"))
                .unwrap_or_else(|| "?".to_string()),
            env.air_category().unwrap_or_else(|| "Unknown".to_string())
        ),
        None => "Air Quality: Unknown".to_string(),
    };

    format!(
        "Write a concise news headline in English (max 12 words).\n\
         Sentiment: {sentiment}\n\
         - If NEGATIVE, highlight the issue factually, no exaggeration.\n\
         - If POSITIVE, highlight the good aspect.\n\
         \n\
         Message: \"{base_line}\"\n\
         {weather}\n\
         {air}"
    )
}
