use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::example::Entity;

/// A span and normalized label proposed by a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub span: String,
    pub label: String,
}

/// A pool example that was shown to the model, with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedExample {
    pub id: String,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FailureKind {
    /// Retries against the model API were exhausted, or the error was not retryable.
    ModelCallFailed,
    /// The model answered, but not in the expected markup.
    UnparsableResponse,
    /// The query could not be embedded, so no examples could be retrieved.
    RetrievalFailed,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::ModelCallFailed => "ModelCallFailed",
            FailureKind::UnparsableResponse => "UnparsableResponse",
            FailureKind::RetrievalFailed => "RetrievalFailed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PredictionOutcome {
    Success { predictions: Vec<Prediction> },
    Failed { kind: FailureKind, message: String },
}

/// The result of asking one model about one input sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub run_id: Uuid,
    pub sentence_id: String,
    pub text: String,
    /// Normalized ground truth for the sentence.
    #[serde(default)]
    pub gold: Vec<Entity>,
    pub model: String,
    #[serde(default)]
    pub examples: Vec<RetrievedExample>,
    pub raw_output: Option<String>,
    pub outcome: PredictionOutcome,
    pub created_at: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, PredictionOutcome::Failed { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            PredictionOutcome::Failed { kind, .. } => Some(*kind),
            PredictionOutcome::Success { .. } => None,
        }
    }
}
