//! Language model completion backends
//!
//! `CompletionBackend` is the `complete(prompt) -> text` capability the
//! prediction stage needs. `ChatCompletionClient` implements it against any
//! OpenAI-compatible `/chat/completions` endpoint (OpenAI, Mistral, local
//! servers), retrying rate limits and transient failures with bounded
//! exponential backoff.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::{GenerationConfig, ModelConfig};
use crate::retry::{RetryFailure, RetryPolicy, Transient};

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send a prompt, return the model's text answer.
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;

    /// Identifier recorded in prediction records.
    fn model_id(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Response contained no completion text")]
    EmptyResponse,

    #[error("Missing API key for model {0}")]
    MissingApiKey(String),

    #[error("All {attempts} attempts failed, last error: {last_error}")]
    RetryExhausted { attempts: usize, last_error: String },
}

/// Transport failures, rate limits and server errors.
impl Transient for CompletionError {
    fn is_transient(&self) -> bool {
        match self {
            CompletionError::Http(_) => true,
            CompletionError::Api { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    pub model_id: String,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl ChatClientConfig {
    /// Combine a `[[generation.models]]` entry with the shared generation
    /// settings. The API key is read from the entry's `api_key_env`.
    pub fn from_model(model: &ModelConfig, generation: &GenerationConfig) -> Self {
        Self {
            model_id: model.id.clone(),
            model: model.model.clone(),
            base_url: model.base_url.trim_end_matches('/').to_string(),
            api_key: std::env::var(&model.api_key_env).unwrap_or_default(),
            temperature: generation.temperature,
            max_tokens: generation.max_tokens,
            timeout_secs: generation.timeout_secs,
            retry: RetryPolicy::new(
                generation.max_retries,
                generation.retry_delay_ms,
                generation.max_delay_ms,
            ),
        }
    }
}

// ============================================================================
// Wire types (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ============================================================================
// ChatCompletionClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    client: Client,
    config: ChatClientConfig,
}

impl ChatCompletionClient {
    pub fn new(config: ChatClientConfig) -> Result<Self, CompletionError> {
        if config.api_key.is_empty() {
            return Err(CompletionError::MissingApiKey(config.model_id.clone()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    async fn complete_once(&self, prompt: &str) -> Result<String, CompletionError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(body);

            tracing::warn!(
                model = %self.config.model_id,
                code = status.as_u16(),
                message = %message,
                "Completion API error"
            );
            return Err(CompletionError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let chat: ChatResponse = response.json().await?;
        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(CompletionError::EmptyResponse)
    }
}

#[async_trait]
impl CompletionBackend for ChatCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self.config
            .retry
            .run(&self.config.model_id, || self.complete_once(prompt))
            .await
            .map_err(|failure| match failure {
                RetryFailure::Exhausted { attempts, last } => CompletionError::RetryExhausted {
                    attempts,
                    last_error: last.to_string(),
                },
                RetryFailure::Fatal(e) => e,
            })
    }

    fn model_id(&self) -> &str {
        &self.config.model_id
    }
}

/// Build one client per configured model.
pub fn create_clients(
    generation: &GenerationConfig,
) -> Result<Vec<Box<dyn CompletionBackend>>, CompletionError> {
    generation
        .models
        .iter()
        .map(|model| {
            let client = ChatCompletionClient::new(ChatClientConfig::from_model(model, generation))?;
            Ok(Box::new(client) as Box<dyn CompletionBackend>)
        })
        .collect()
}
