pub mod completion;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod models;
pub mod onnx_embedder;
pub mod ontology;
pub mod retry;

pub use completion::{create_clients, ChatCompletionClient, CompletionBackend, CompletionError};
pub use config::HistnerConfig;
pub use embeddings::{
    backend_from_config, BackendKind, EmbeddingBackend, EmbeddingError, GeminiEmbedder, GEMINI_DIMENSIONS,
    ONNX_DIMENSIONS,
};
pub use error::HistnerError;
pub use models::{
    AnnotatedExample, Entity, ExtractedSentence, FailureKind, Prediction, PredictionOutcome,
    PredictionRecord, RawAnnotation, RetrievedExample,
};
pub use onnx_embedder::{ModelFiles, OnnxEmbedder};
pub use ontology::{CanonicalLabel, Normalizer, Ontology, Rejection};
pub use retry::{RetryPolicy, Transient};
