//! Reasoning service capability and its HTTP client.
//!
//! The engine only needs `complete(prompt, temperature, max_tokens)`. The
//! production implementation talks to an OpenAI-compatible chat completions
//! endpoint, which a local Ollama server provides at `/v1`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde_json::json;
use stepwise_core::ReasoningConfig;
use tracing::debug;

/// Result type for reasoning calls.
pub type Result<T> = std::result::Result<T, ReasoningError>;

/// Errors from the reasoning service.
#[derive(Debug, thiserror::Error)]
pub enum ReasoningError {
    /// Transport failure
    #[error("reasoning service request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status
    #[error("reasoning service error (status {status}): {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// No usable text in the response
    #[error("reasoning service returned no text")]
    EmptyResponse,

    /// Call exceeded its time bound
    #[error("reasoning service timed out after {0:?}")]
    Timeout(Duration),
}

/// Text completion capability.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Complete `prompt` with the given sampling temperature and output cap.
    async fn complete(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String>;
}

/// OpenAI-compatible chat completions client (Ollama, vLLM, OpenAI).
#[derive(Clone)]
pub struct OllamaClient {
    /// HTTP client
    client: Client,

    /// Base URL, without trailing slash
    base_url: String,

    /// Model name
    model: String,

    /// Bearer token
    api_key: String,
}

impl OllamaClient {
    /// Create a client from configuration.
    ///
    /// Fails if the HTTP client cannot be built with the configured timeout.
    pub fn new(config: &ReasoningConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// Model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Check whether the server answers its model listing.
    pub async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }
}

#[async_trait]
impl ReasoningService for OllamaClient {
    async fn complete(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String> {
        let payload = json!({
            "model": self.model,
            "messages": [{ "role": "system", "content": prompt }],
            "temperature": temperature,
            "max_tokens": max_tokens,
            "stream": false,
        });

        debug!(
            "Calling {} (temperature {}, max_tokens {})",
            self.model, temperature, max_tokens
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ReasoningError::Api { status, body });
        }

        #[derive(serde::Deserialize)]
        struct Response {
            choices: Vec<Choice>,
        }

        #[derive(serde::Deserialize)]
        struct Choice {
            message: Message,
        }

        #[derive(serde::Deserialize)]
        struct Message {
            content: Option<String>,
        }

        let response_data: Response = response.json().await?;

        response_data
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(ReasoningError::EmptyResponse)
    }
}
