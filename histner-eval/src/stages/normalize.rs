//! Normalize stage: raw labels -> whitelisted ontology codes
//!
//! Each annotation's parenthetical may hold several labels; every label the
//! normalizer accepts becomes one entity, rejected labels are dropped.

use histner_core::models::{AnnotatedExample, Entity, ExtractedSentence};
use histner_core::ontology::split_label_list;
use histner_core::Normalizer;

pub fn normalize_sentence(sentence: &ExtractedSentence, normalizer: &Normalizer) -> AnnotatedExample {
    let mut entities: Vec<Entity> = Vec::new();

    for annotation in &sentence.annotations {
        for raw in split_label_list(&annotation.label_raw) {
            let Some(label) = normalizer.normalize_logged(&raw) else {
                continue;
            };
            let entity = Entity {
                span: annotation.span.clone(),
                label: label.code,
                start: annotation.start,
                end: annotation.end,
            };
            if !entities.contains(&entity) {
                entities.push(entity);
            }
        }
    }

    AnnotatedExample {
        id: sentence.id.clone(),
        document: sentence.document.clone(),
        text: sentence.text.clone(),
        entities,
    }
}

pub fn normalize_all(sentences: &[ExtractedSentence], normalizer: &Normalizer) -> Vec<AnnotatedExample> {
    let examples: Vec<AnnotatedExample> = sentences
        .iter()
        .map(|s| normalize_sentence(s, normalizer))
        .collect();

    let raw: usize = sentences.iter().map(|s| s.annotations.len()).sum();
    let kept: usize = examples.iter().map(|e| e.entities.len()).sum();
    tracing::info!(sentences = sentences.len(), raw, kept, "Normalized labels");
    examples
}
