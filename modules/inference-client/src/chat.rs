use std::time::Duration;

use tracing::debug;

use crate::error::{InferenceError, Result};
use crate::types::{ChatMessage, ChatRequest, ChatResponse};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Minimal OpenAI-compatible chat completion client.
#[derive(Clone)]
pub struct ChatClient {
    api_key: String,
    model: String,
    http: reqwest::Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| InferenceError::Setup(e.to_string()))?;

        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            http,
            base_url: OPENAI_API_URL.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One system + user turn. Returns the trimmed assistant text.
    pub async fn complete(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
        max_tokens: u32,
    ) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Some(system.into()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Some(user.into()),
                },
            ],
            max_completion_tokens: Some(max_tokens),
            temperature: None,
        };

        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %request.model, "Chat completion request");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| InferenceError::request(&self.model, e))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                model: self.model.clone(),
                status: status.as_u16(),
                message,
            });
        }

        let response: ChatResponse = resp
            .json()
            .await
            .map_err(|e| InferenceError::decode(&self.model, e))?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| InferenceError::malformed(&self.model, "chat", "no completion text"))
    }
}
