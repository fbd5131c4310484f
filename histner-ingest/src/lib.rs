//! Annotated sentence extraction from markdown transcriptions
//!
//! A document is parsed into text blocks (`markup`), each block is split into
//! sentences (`segment`), and every labeled span is attached to the sentence
//! that contains it with character offsets relative to that sentence.

pub mod error;
pub mod markup;
pub mod segment;

pub use error::IngestError;
pub use segment::Segmenter;

use histner_core::models::{ExtractedSentence, RawAnnotation};
use markup::LabeledSpan;
use std::ops::Range;
use std::path::Path;

/// Extract sentences from a markdown file. The sentence ids use the file stem
/// as document name.
pub fn extract_file(path: &Path, segmenter: &Segmenter) -> Result<Vec<ExtractedSentence>, IngestError> {
    let bytes = std::fs::read(path)?;
    let document = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    extract_bytes(&document, &bytes, segmenter)
}

/// Extract sentences from raw document bytes, which must be UTF-8.
pub fn extract_bytes(
    document: &str,
    bytes: &[u8],
    segmenter: &Segmenter,
) -> Result<Vec<ExtractedSentence>, IngestError> {
    let markdown = std::str::from_utf8(bytes)
        .map_err(|e| IngestError::format(document, format!("invalid UTF-8: {e}")))?;
    extract_document(document, markdown, segmenter)
}

/// Extract sentences in document order. Sentence ids are `{document}#{n:04}`,
/// numbered from 1. Sentences without annotations are kept.
pub fn extract_document(
    document: &str,
    markdown: &str,
    segmenter: &Segmenter,
) -> Result<Vec<ExtractedSentence>, IngestError> {
    let blocks = markup::parse_blocks(document, markdown)?;
    let mut sentences = Vec::new();

    for block in blocks {
        let ranges = join_split_spans(segmenter.split(&block.text), &block.spans);
        let mut annotations: Vec<Vec<RawAnnotation>> = vec![Vec::new(); ranges.len()];

        for span in &block.spans {
            let Some(idx) = ranges
                .iter()
                .position(|r| r.start <= span.start && span.end <= r.end)
            else {
                tracing::warn!(
                    document,
                    span = %&block.text[span.start..span.end],
                    "Annotation crosses a sentence boundary, dropped"
                );
                continue;
            };

            let sentence_start = ranges[idx].start;
            let start = block.text[sentence_start..span.start].chars().count();
            let span_text = &block.text[span.start..span.end];
            annotations[idx].push(RawAnnotation {
                span: span_text.to_string(),
                label_raw: span.label_raw.clone(),
                start,
                end: start + span_text.chars().count(),
            });
        }

        for (range, annotations) in ranges.into_iter().zip(annotations) {
            sentences.push(ExtractedSentence {
                id: format!("{document}#{:04}", sentences.len() + 1),
                document: document.to_string(),
                text: block.text[range].to_string(),
                annotations,
            });
        }
    }

    tracing::debug!(document, sentences = sentences.len(), "Extracted document");
    Ok(sentences)
}

/// Join neighbouring sentence ranges whenever a labeled span starts in one
/// and ends in the next, so no annotation is cut in two.
fn join_split_spans(mut ranges: Vec<Range<usize>>, spans: &[LabeledSpan]) -> Vec<Range<usize>> {
    let mut i = 0;
    while i + 1 < ranges.len() {
        let (end, next_start) = (ranges[i].end, ranges[i + 1].start);
        if spans.iter().any(|s| s.start < next_start && s.end > end) {
            tracing::debug!(at = end, "Joining sentences split inside an annotation");
            ranges[i].end = ranges[i + 1].end;
            ranges.remove(i + 1);
        } else {
            i += 1;
        }
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_extract_single_annotation() {
        let sentences = extract_document(
            "reis",
            "Jan reisde naar **Amsterdam** (E53 Place) in 1650.",
            &Segmenter::default(),
        )
        .unwrap();

        assert_eq!(sentences.len(), 1);
        let sentence = &sentences[0];
        assert_eq!(sentence.id, "reis#0001");
        assert_eq!(sentence.document, "reis");
        assert_eq!(sentence.text, "Jan reisde naar Amsterdam in 1650.");
        assert_eq!(
            sentence.annotations,
            vec![RawAnnotation {
                span: "Amsterdam".to_string(),
                label_raw: "E53 Place".to_string(),
                start: 16,
                end: 25,
            }]
        );
    }

    #[test]
    fn test_offsets_are_relative_to_sentence_in_chars() {
        let markdown = "Eerste zin zonder iets. Daarna kwam **Ĳsselmonde** (E53) en **Jan** (E21 Person).";
        let sentences = extract_document("doc", markdown, &Segmenter::default()).unwrap();

        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].annotations.is_empty());

        let second = &sentences[1];
        assert_eq!(second.id, "doc#0002");
        assert_eq!(second.text, "Daarna kwam Ĳsselmonde en Jan.");
        for annotation in &second.annotations {
            let chars: String = second
                .text
                .chars()
                .skip(annotation.start)
                .take(annotation.end - annotation.start)
                .collect();
            assert_eq!(chars, annotation.span);
        }
        assert_eq!(second.annotations[0].start, 12);
        assert_eq!(second.annotations[1].label_raw, "E21 Person");
    }

    #[test]
    fn test_multi_initial_name_keeps_annotation() {
        let sentences = extract_document(
            "d",
            "Gouverneur **J.P. Coen** (E21 Person) stichtte Batavia.",
            &Segmenter::default(),
        )
        .unwrap();

        assert_eq!(sentences.len(), 1);
        assert_eq!(sentences[0].text, "Gouverneur J.P. Coen stichtte Batavia.");
        assert_eq!(
            sentences[0].annotations,
            vec![RawAnnotation {
                span: "J.P. Coen".to_string(),
                label_raw: "E21 Person".to_string(),
                start: 11,
                end: 20,
            }]
        );
    }

    #[test]
    fn test_sentences_split_inside_a_span_are_joined() {
        // "Kapt." is not a known abbreviation, the segmenter ends a sentence after it
        let sentences = extract_document(
            "d",
            "Het schip van **Kapt. Mr. Bontekoe** (E21) zonk. Niemand overleefde.",
            &Segmenter::default(),
        )
        .unwrap();

        let texts: Vec<&str> = sentences.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["Het schip van Kapt. Mr. Bontekoe zonk.", "Niemand overleefde."]
        );
        assert_eq!(sentences[0].annotations.len(), 1);
        assert_eq!(sentences[0].annotations[0].span, "Kapt. Mr. Bontekoe");
        assert_eq!(sentences[1].id, "d#0002");
    }

    #[test]
    fn test_join_split_spans() {
        let span = |start, end| LabeledSpan {
            start,
            end,
            label_raw: "E21".to_string(),
        };
        assert_eq!(join_split_spans(vec![0..5, 6..10, 11..15], &[span(3, 8)]), vec![0..10, 11..15]);
        assert_eq!(join_split_spans(vec![0..5, 6..10, 11..15], &[span(3, 13)]), vec![0..15]);
        assert_eq!(join_split_spans(vec![0..5, 6..10], &[span(0, 5), span(6, 10)]), vec![0..5, 6..10]);
    }

    #[test]
    fn test_ids_continue_across_blocks() {
        let markdown = "# Kop\n\nEen zin. Nog een zin.\n";
        let sentences = extract_document("d", markdown, &Segmenter::default()).unwrap();
        let ids: Vec<&str> = sentences.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["d#0001", "d#0002", "d#0003"]);
    }

    #[test]
    fn test_invalid_utf8_is_format_error() {
        let result = extract_bytes("bad", &[0x66, 0xff, 0xfe], &Segmenter::default());
        assert!(matches!(result, Err(IngestError::DocumentFormat { document, .. }) if document == "bad"));
    }

    #[test]
    fn test_extract_file_uses_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brieven_1672.md");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Brief aan **De Ruyter** (E21 Person).").unwrap();

        let sentences = extract_file(&path, &Segmenter::default()).unwrap();
        assert_eq!(sentences[0].id, "brieven_1672#0001");
        assert_eq!(sentences[0].annotations[0].span, "De Ruyter");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = extract_file(Path::new("/nonexistent/doc.md"), &Segmenter::default());
        assert!(matches!(result, Err(IngestError::Io(_))));
    }
}
