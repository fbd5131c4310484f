pub mod example;
pub mod prediction;

pub use example::{AnnotatedExample, Entity, ExtractedSentence, RawAnnotation};
pub use prediction::{FailureKind, Prediction, PredictionOutcome, PredictionRecord, RetrievedExample};
