//! Prediction generation: retrieve, prompt, call every model, parse
//!
//! Every (input, model) pair yields exactly one `PredictionRecord`. Failures
//! are recorded with a `FailureKind` instead of aborting the batch.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use regex::Regex;
use thiserror::Error;
use uuid::Uuid;

use histner_core::models::{
    AnnotatedExample, FailureKind, Prediction, PredictionOutcome, PredictionRecord, RetrievedExample,
};
use histner_core::ontology::split_label_list;
use histner_core::{CompletionBackend, EmbeddingBackend, HistnerError, Normalizer};

use super::prompt::build_prompt;
use super::retrieve::{ExamplePool, Neighbor, DEFAULT_TOP_K};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty response")]
    Empty,

    #[error("bold span {0:?} is not followed by a label")]
    MissingLabel(String),

    #[error("unbalanced ** markers")]
    UnbalancedMarkers,
}

/// Parses model answers written in the `**span** (label)` grammar.
#[derive(Debug)]
pub struct ResponseParser<'a> {
    normalizer: &'a Normalizer,
    bold: Regex,
    label: Regex,
}

impl<'a> ResponseParser<'a> {
    pub fn new(normalizer: &'a Normalizer) -> Result<Self, HistnerError> {
        let compile = |pattern: &str| Regex::new(pattern).map_err(|e| HistnerError::pattern(pattern, e));
        Ok(Self {
            normalizer,
            bold: compile(r"\*\*(.+?)\*\*")?,
            label: compile(r"^\s*\(([^()]*)\)")?,
        })
    }

    /// Extract predictions. A response without any bold span is a valid
    /// answer with no entities. Labels the normalizer rejects are dropped.
    pub fn parse(&self, raw: &str) -> Result<Vec<Prediction>, ParseError> {
        let text = strip_wrapping(raw);
        if text.is_empty() {
            return Err(ParseError::Empty);
        }
        if text.matches("**").count() % 2 != 0 {
            return Err(ParseError::UnbalancedMarkers);
        }

        let mut predictions = Vec::new();
        for caps in self.bold.captures_iter(text) {
            let (Some(whole), Some(span)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let span = span.as_str().trim();
            let labels = self
                .label
                .captures(&text[whole.end()..])
                .and_then(|c| c.get(1))
                .ok_or_else(|| ParseError::MissingLabel(span.to_string()))?;

            for raw_label in split_label_list(labels.as_str()) {
                if let Some(label) = self.normalizer.normalize_logged(&raw_label) {
                    predictions.push(Prediction {
                        span: span.to_string(),
                        label: label.code,
                    });
                }
            }
        }
        Ok(predictions)
    }
}

/// Remove a surrounding code fence and a leading `Output:`.
fn strip_wrapping(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
        text = body.trim_end();
        text = text.strip_suffix("```").unwrap_or(text).trim();
    }
    if text
        .get(..7)
        .map_or(false, |prefix| prefix.eq_ignore_ascii_case("output:"))
    {
        text = text[7..].trim();
    }
    text
}

/// Runs queries against every configured model.
pub struct Generator<'a> {
    pool: &'a ExamplePool,
    embedder: &'a dyn EmbeddingBackend,
    models: &'a [Box<dyn CompletionBackend>],
    parser: ResponseParser<'a>,
    normalizer: &'a Normalizer,
    top_k: usize,
    instructions: Option<String>,
    max_concurrency: usize,
    run_id: Uuid,
}

impl<'a> Generator<'a> {
    pub fn new(
        pool: &'a ExamplePool,
        embedder: &'a dyn EmbeddingBackend,
        models: &'a [Box<dyn CompletionBackend>],
        normalizer: &'a Normalizer,
    ) -> Result<Self, HistnerError> {
        Ok(Self {
            pool,
            embedder,
            models,
            parser: ResponseParser::new(normalizer)?,
            normalizer,
            top_k: DEFAULT_TOP_K,
            instructions: None,
            max_concurrency: 1,
            run_id: Uuid::new_v4(),
        })
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_instructions(mut self, instructions: Option<String>) -> Self {
        self.instructions = instructions;
        self
    }

    /// Number of inputs processed at once. Record order does not depend on it.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Records in input order, models in configuration order within an input.
    pub async fn run(&self, queries: &[AnnotatedExample]) -> Vec<PredictionRecord> {
        let per_query: Vec<Vec<PredictionRecord>> = stream::iter(queries)
            .map(|query| self.predict(query))
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let records: Vec<PredictionRecord> = per_query.into_iter().flatten().collect();
        let failed = records.iter().filter(|r| r.is_failed()).count();
        tracing::info!(
            run_id = %self.run_id,
            queries = queries.len(),
            records = records.len(),
            failed,
            "Prediction run finished"
        );
        records
    }

    /// One record per configured model for `query`.
    pub async fn predict(&self, query: &AnnotatedExample) -> Vec<PredictionRecord> {
        let neighbors = match self
            .pool
            .query(self.embedder, &query.text, Some(query.id.as_str()), self.top_k)
            .await
        {
            Ok(neighbors) => neighbors,
            Err(e) => {
                tracing::warn!(sentence = %query.id, error = %e, "Retrieval failed");
                return self
                    .models
                    .iter()
                    .map(|model| {
                        self.record(
                            query,
                            model.model_id(),
                            Vec::new(),
                            None,
                            PredictionOutcome::Failed {
                                kind: FailureKind::RetrievalFailed,
                                message: e.to_string(),
                            },
                        )
                    })
                    .collect();
            }
        };

        let examples: Vec<&AnnotatedExample> = neighbors.iter().map(|n| n.example).collect();
        let retrieved: Vec<RetrievedExample> = neighbors.iter().map(Neighbor::to_retrieved).collect();
        let prompt = build_prompt(
            self.instructions.as_deref(),
            self.normalizer.ontology(),
            &examples,
            &query.text,
        );

        let mut records = Vec::with_capacity(self.models.len());
        for model in self.models {
            records.push(self.call_model(model.as_ref(), query, &prompt, &retrieved).await);
        }
        records
    }

    async fn call_model(
        &self,
        model: &dyn CompletionBackend,
        query: &AnnotatedExample,
        prompt: &str,
        retrieved: &[RetrievedExample],
    ) -> PredictionRecord {
        let model_id = model.model_id();
        let (raw_output, outcome) = match model.complete(prompt).await {
            Ok(raw) => match self.parser.parse(&raw) {
                Ok(predictions) => {
                    tracing::debug!(sentence = %query.id, model = model_id, predictions = predictions.len(), "Parsed response");
                    (Some(raw), PredictionOutcome::Success { predictions })
                }
                Err(e) => {
                    tracing::warn!(sentence = %query.id, model = model_id, error = %e, "Unparsable response");
                    (
                        Some(raw),
                        PredictionOutcome::Failed {
                            kind: FailureKind::UnparsableResponse,
                            message: e.to_string(),
                        },
                    )
                }
            },
            Err(e) => {
                tracing::warn!(sentence = %query.id, model = model_id, error = %e, "Model call failed");
                (
                    None,
                    PredictionOutcome::Failed {
                        kind: FailureKind::ModelCallFailed,
                        message: e.to_string(),
                    },
                )
            }
        };

        self.record(query, model_id, retrieved.to_vec(), raw_output, outcome)
    }

    fn record(
        &self,
        query: &AnnotatedExample,
        model_id: &str,
        examples: Vec<RetrievedExample>,
        raw_output: Option<String>,
        outcome: PredictionOutcome,
    ) -> PredictionRecord {
        PredictionRecord {
            run_id: self.run_id,
            sentence_id: query.id.clone(),
            text: query.text.clone(),
            gold: query.entities.clone(),
            model: model_id.to_string(),
            examples,
            raw_output,
            outcome,
            created_at: Utc::now(),
        }
    }
}
