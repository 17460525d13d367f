use crate::circuit_breaker::{create_ai_circuit_breaker, AiCircuitBreaker};
use crate::errors::AppError;
use failsafe::futures::CircuitBreaker;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

pub const SAMPLING_TEMPERATURE: f64 = 0.7;
pub const SAMPLING_TOP_P: f64 = 0.95;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub index: u32,
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Chat-completions response body. Only the fields we read are modelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl ChatCompletion {
    /// Text of the first choice, or an empty string.
    pub fn content(&self) -> &str {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or("")
    }

    /// Canned completion used whenever the remote API cannot be reached.
    pub fn simulated(model: &str) -> Self {
        Self {
            id: format!("sim-{}", uuid::Uuid::new_v4()),
            model: model.to_string(),
            choices: vec![ChatChoice {
                index: 0,
                message: ChatMessage {
                    role: "assistant".to_string(),
                    content: Some(format!("Processed successfully with {}", model)),
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: Some(TokenUsage {
                prompt_tokens: 25,
                completion_tokens: 10,
                total_tokens: 35,
            }),
        }
    }
}

/// Completion text plus whether it came from the remote API.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub live: bool,
}

/// Truncates `content` to `max_chars` characters, appending `...` when cut.
pub fn excerpt(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &content[..byte_idx]),
        None => content.to_string(),
    }
}

/// Client for an OpenAI-compatible chat-completions API.
#[derive(Clone)]
pub struct AiServiceClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    breaker: AiCircuitBreaker,
}

impl AiServiceClient {
    /// Creates a new `AiServiceClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Root of the API, without the `/v1/...` suffix.
    /// * `api_key` - Bearer token.
    /// * `timeout` - Per-request timeout.
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create AI client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            breaker: create_ai_circuit_breaker(),
        })
    }

    /// Sends a single-message chat completion request.
    pub async fn chat(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<ChatCompletion, AppError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        tracing::debug!("Requesting completion from {} ({})", model, url);

        let body = json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": max_tokens,
            "temperature": SAMPLING_TEMPERATURE,
            "top_p": SAMPLING_TOP_P,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("AI request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "AI service returned {}: {}",
                status, error_text
            )));
        }

        let completion: ChatCompletion = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse AI response: {}", e))
        })?;

        if let Some(usage) = &completion.usage {
            tracing::info!(
                model = model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "AI completion received"
            );
        }

        Ok(completion)
    }

    /// Runs [`chat`](Self::chat) behind the circuit breaker and falls back to
    /// the simulated completion on any failure. Never fails.
    pub async fn complete_or_simulate(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Completion {
        match self.breaker.call(self.chat(model, prompt, max_tokens)).await {
            Ok(completion) => Completion {
                content: completion.content().to_string(),
                live: true,
            },
            Err(failsafe::Error::Rejected) => {
                tracing::warn!("AI circuit open, simulating {} response", model);
                simulated_completion(model)
            }
            Err(failsafe::Error::Inner(e)) => {
                tracing::warn!("AI call to {} failed, simulating response: {}", model, e);
                simulated_completion(model)
            }
        }
    }
}

pub fn simulated_completion(model: &str) -> Completion {
    Completion {
        content: ChatCompletion::simulated(model).content().to_string(),
        live: false,
    }
}
