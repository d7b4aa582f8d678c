pub mod chat;
pub mod error;
pub mod types;

pub use chat::ChatClient;
pub use error::{InferenceError, Result};
pub use types::{LabelScore, ZeroShotOutput};

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use types::{ClassificationResponse, EmbeddingResponse, ZeroShotResponse};

const DEFAULT_BASE_URL: &str = "https://router.huggingface.co/hf-inference/models";

/// Client for hosted inference endpoints that follow the
/// `POST {base}/{model}` + `{"inputs", "parameters"}` convention.
#[derive(Clone)]
pub struct InferenceClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl InferenceClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| InferenceError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Single-label text classification (sentiment, emotion). Scores come
    /// back ranked, best first.
    pub async fn classify(&self, model: &str, text: &str) -> Result<Vec<LabelScore>> {
        let body = json!({ "inputs": text, "options": { "wait_for_model": true } });
        let response: ClassificationResponse = self.post(model, &body).await?;
        let scores = response.into_scores();
        if scores.is_empty() {
            return Err(InferenceError::malformed(model, "classification", "no labels"));
        }
        Ok(scores)
    }

    /// Zero-shot classification of `text` against `labels`.
    pub async fn zero_shot(
        &self,
        model: &str,
        text: &str,
        labels: &[String],
        multi_label: bool,
    ) -> Result<ZeroShotOutput> {
        let body = json!({
            "inputs": text,
            "parameters": { "candidate_labels": labels, "multi_label": multi_label },
            "options": { "wait_for_model": true },
        });
        let response: ZeroShotResponse = self.post(model, &body).await?;
        let output = response
            .into_output()
            .ok_or_else(|| InferenceError::malformed(model, "zero-shot", "empty batch"))?;

        if output.labels.len() != output.scores.len() || output.labels.is_empty() {
            return Err(InferenceError::malformed(
                model,
                "zero-shot",
                format!("{} labels and {} scores", output.labels.len(), output.scores.len()),
            ));
        }
        Ok(output)
    }

    /// Sentence embeddings, one vector per input in input order.
    pub async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({ "inputs": texts, "options": { "wait_for_model": true } });
        let response: EmbeddingResponse = self.post(model, &body).await?;
        let vectors = response.into_vectors();

        if vectors.len() != texts.len() {
            return Err(InferenceError::malformed(
                model,
                "embedding",
                format!("{} vectors for {} inputs", vectors.len(), texts.len()),
            ));
        }
        if let Some(dim) = vectors.first().map(Vec::len) {
            if dim == 0 || vectors.iter().any(|v| v.len() != dim) {
                return Err(InferenceError::malformed(
                    model,
                    "embedding",
                    "vectors of inconsistent dimension",
                ));
            }
        }
        Ok(vectors)
    }

    async fn post<T: DeserializeOwned>(&self, model: &str, body: &Value) -> Result<T> {
        let url = format!("{}/{}", self.base_url, model);

        debug!(model, "Inference request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| InferenceError::request(model, e))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                model: model.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| InferenceError::request(model, e))?;
        serde_json::from_slice(&bytes).map_err(|e| InferenceError::decode(model, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = InferenceClient::new("hf_test")
            .unwrap()
            .with_base_url("http://localhost:8080/models/");
        assert_eq!(client.base_url, "http://localhost:8080/models");
    }
}
