use serde::{Deserialize, Serialize};

/// An emphasized span with the label text that followed it in the document.
/// Offsets are character offsets into the sentence text, end-exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAnnotation {
    pub span: String,
    pub label_raw: String,
    pub start: usize,
    pub end: usize,
}

/// One sentence as produced by the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedSentence {
    pub id: String,
    pub document: String,
    pub text: String,
    #[serde(default)]
    pub annotations: Vec<RawAnnotation>,
}

/// A span whose label has been normalized to an ontology code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub span: String,
    pub label: String,
    pub start: usize,
    pub end: usize,
}

/// A sentence with normalized entities; the unit of the example pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedExample {
    pub id: String,
    pub document: String,
    pub text: String,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_annotation_wire_shape() {
        let annotation = RawAnnotation {
            span: "Amsterdam".to_string(),
            label_raw: "E53 Place".to_string(),
            start: 16,
            end: 25,
        };
        let value = serde_json::to_value(&annotation).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"span": "Amsterdam", "label_raw": "E53 Place", "start": 16, "end": 25})
        );
    }

    #[test]
    fn test_missing_entities_default_to_empty() {
        let example: AnnotatedExample = serde_json::from_str(
            r#"{"id": "a#0001", "document": "a", "text": "Geen entiteiten hier."}"#,
        )
        .unwrap();
        assert!(example.entities.is_empty());
    }
}
