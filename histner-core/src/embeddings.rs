//! Sentence embeddings for few-shot example retrieval
//!
//! Two backends implement `EmbeddingBackend`:
//! - `OnnxEmbedder` (in `onnx_embedder`): a local multilingual MiniLM model,
//!   384 dimensions, no network access.
//! - `GeminiEmbedder`: the Gemini `embedContent` endpoint, 768 dimensions.
//!
//! Pool examples and queries are both single sentences, so one call shape
//! serves both sides of the similarity comparison.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::EmbeddingConfig;
use crate::onnx_embedder::OnnxEmbedder;
use crate::retry::{RetryFailure, RetryPolicy, Transient};

pub const GEMINI_DIMENSIONS: usize = 768;

/// paraphrase-multilingual-MiniLM-L12-v2
pub const ONNX_DIMENSIONS: usize = 384;

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_KEY_ENV: &str = "GOOGLE_API_KEY";
const GEMINI_MAX_DELAY_MS: u64 = 10_000;

#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed one sentence into a vector of `dimensions()` floats.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    fn dimensions(&self) -> usize;

    /// Short backend name for logs.
    fn name(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Embedding API returned {code}: {message}")]
    Api { code: u16, message: String },

    #[error("Expected a {expected}-dimensional embedding, got {actual}")]
    InvalidDimensions { expected: usize, actual: usize },

    #[error("Response did not contain an embedding")]
    MissingEmbedding,

    #[error("No API key for the embedding backend (set GOOGLE_API_KEY)")]
    MissingApiKey,

    #[error("Embedding failed after {attempts} attempts")]
    RetryExhausted { attempts: usize },

    #[error("Embedding model file not found: {path}")]
    ModelNotFound { path: String },

    #[error("ONNX inference failed: {0}")]
    OnnxInference(String),

    #[error("Tokenization failed: {0}")]
    Tokenizer(String),
}

impl Transient for EmbeddingError {
    fn is_transient(&self) -> bool {
        match self {
            EmbeddingError::Http(_) => true,
            EmbeddingError::Api { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

/// Which backend `[embedding] backend` selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Onnx,
    Gemini,
}

impl BackendKind {
    /// `"gemini"` (any case) selects Gemini, everything else the local model.
    pub fn parse(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("gemini") {
            BackendKind::Gemini
        } else {
            BackendKind::Onnx
        }
    }
}

/// Build the backend configured in `[embedding]`.
pub fn backend_from_config(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingBackend>, EmbeddingError> {
    let backend: Box<dyn EmbeddingBackend> = match BackendKind::parse(&config.backend) {
        BackendKind::Gemini => Box::new(GeminiEmbedder::from_config(config)?),
        BackendKind::Onnx => Box::new(OnnxEmbedder::from_config(config)?),
    };
    tracing::info!(
        backend = backend.name(),
        dimensions = backend.dimensions(),
        "Embedding backend ready"
    );
    Ok(backend)
}

// Gemini wire format

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'static str,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: Option<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Gemini embedding client using the `SEMANTIC_SIMILARITY` task type.
#[derive(Debug, Clone)]
pub struct GeminiEmbedder {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimensions: usize,
    retry: RetryPolicy,
}

impl GeminiEmbedder {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
        retry: RetryPolicy,
    ) -> Result<Self, EmbeddingError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(EmbeddingError::MissingApiKey);
        }

        Ok(Self {
            http: Client::builder().timeout(Duration::from_secs(30)).build()?,
            endpoint: GEMINI_ENDPOINT.to_string(),
            api_key,
            model: model.into(),
            dimensions,
            retry,
        })
    }

    /// Key from `GOOGLE_API_KEY`, everything else from `[embedding]`.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        Self::new(
            std::env::var(GEMINI_KEY_ENV).unwrap_or_default(),
            config.gemini_model.clone(),
            config.gemini_dimensions as usize,
            RetryPolicy::new(config.max_retries, config.retry_delay_ms, GEMINI_MAX_DELAY_MS),
        )
    }

    /// Point the client at another server (mock servers, proxies).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/models/{}:embedContent", self.endpoint, self.model);
        let body = EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: Content {
                parts: [Part { text }],
            },
            task_type: "SEMANTIC_SIMILARITY",
            output_dimensionality: self.dimensions,
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&raw)
                .ok()
                .and_then(|env| env.error)
                .map(|err| err.message)
                .unwrap_or(raw);
            tracing::warn!(code = status.as_u16(), message = %message, "Gemini embedding error");
            return Err(EmbeddingError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let values = response
            .json::<EmbedContentResponse>()
            .await?
            .embedding
            .ok_or(EmbeddingError::MissingEmbedding)?
            .values;

        if values.len() != self.dimensions {
            return Err(EmbeddingError::InvalidDimensions {
                expected: self.dimensions,
                actual: values.len(),
            });
        }
        Ok(values)
    }
}

#[async_trait]
impl EmbeddingBackend for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.retry
            .run("gemini-embedding", || self.request(text))
            .await
            .map_err(|failure| match failure {
                RetryFailure::Exhausted { attempts, .. } => EmbeddingError::RetryExhausted { attempts },
                RetryFailure::Fatal(e) => e,
            })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SENTENCE: &str = "Jan reisde naar Amsterdam in 1650.";

    async fn embedder(server: &MockServer) -> GeminiEmbedder {
        GeminiEmbedder::new("sleutel", "gemini-embedding-001", GEMINI_DIMENSIONS, RetryPolicy::new(2, 1, 10))
            .unwrap()
            .with_endpoint(server.uri())
    }

    fn vector_body(len: usize) -> serde_json::Value {
        let values: Vec<f32> = (0..len).map(|i| i as f32 / len as f32).collect();
        serde_json::json!({ "embedding": { "values": values } })
    }

    #[tokio::test]
    async fn test_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-embedding-001:embedContent"))
            .and(header("x-goog-api-key", "sleutel"))
            .and(body_json(serde_json::json!({
                "model": "models/gemini-embedding-001",
                "content": { "parts": [{ "text": SENTENCE }] },
                "taskType": "SEMANTIC_SIMILARITY",
                "outputDimensionality": 768
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(vector_body(768)))
            .expect(1)
            .mount(&server)
            .await;

        let client = embedder(&server).await;
        let vector = client.embed(SENTENCE).await.unwrap();
        assert_eq!(vector.len(), client.dimensions());
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "error": { "code": 503, "message": "overloaded" }
            })))
            .expect(3)
            .mount(&server)
            .await;

        let result = embedder(&server).await.embed(SENTENCE).await;
        assert!(matches!(result, Err(EmbeddingError::RetryExhausted { attempts: 3 })));
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vector_body(768)))
            .mount(&server)
            .await;

        assert!(embedder(&server).await.embed(SENTENCE).await.is_ok());
    }

    #[tokio::test]
    async fn test_bad_request_and_wrong_size_fail_at_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "code": 400, "message": "API key not valid" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        match embedder(&server).await.embed(SENTENCE).await {
            Err(EmbeddingError::Api { code, message }) => {
                assert_eq!(code, 400);
                assert_eq!(message, "API key not valid");
            }
            other => panic!("expected Api error, got {other:?}"),
        }

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vector_body(3)))
            .expect(1)
            .mount(&server)
            .await;
        assert!(matches!(
            embedder(&server).await.embed(SENTENCE).await,
            Err(EmbeddingError::InvalidDimensions { expected: 768, actual: 3 })
        ));
    }

    #[test]
    fn test_blank_key_is_rejected() {
        let result = GeminiEmbedder::new("  ", "gemini-embedding-001", GEMINI_DIMENSIONS, RetryPolicy::new(0, 1, 1));
        assert!(matches!(result, Err(EmbeddingError::MissingApiKey)));
    }

    #[test]
    fn test_backend_kind() {
        assert_eq!(BackendKind::parse("Gemini"), BackendKind::Gemini);
        assert_eq!(BackendKind::parse("onnx"), BackendKind::Onnx);
        assert_eq!(BackendKind::parse(""), BackendKind::Onnx);
    }

    #[test]
    fn test_local_backend_without_model_files() {
        let config = EmbeddingConfig {
            backend: "onnx".to_string(),
            onnx_model_path: "/nonexistent/histner/model.onnx".to_string(),
            ..EmbeddingConfig::default()
        };
        match backend_from_config(&config) {
            Err(EmbeddingError::ModelNotFound { path }) => assert!(path.ends_with("model.onnx")),
            Err(other) => panic!("expected ModelNotFound, got {other:?}"),
            Ok(_) => panic!("expected ModelNotFound, got a backend"),
        }
    }
}
