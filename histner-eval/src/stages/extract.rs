//! Extract stage: markdown documents -> extracted sentences

use histner_core::config::ExtractConfig;
use histner_core::ExtractedSentence;
use histner_ingest::{extract_file, Segmenter};
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct ExtractOutput {
    pub sentences: Vec<ExtractedSentence>,
    /// Documents that could not be extracted, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

pub fn segmenter_from_config(config: &ExtractConfig) -> Segmenter {
    Segmenter::new(&config.language, &config.extra_abbreviations)
}

/// Extract every document in order. A document that fails is logged and
/// skipped; the others are still extracted.
pub fn extract_documents<P: AsRef<Path>>(documents: &[P], config: &ExtractConfig) -> ExtractOutput {
    let segmenter = segmenter_from_config(config);
    let mut output = ExtractOutput::default();

    for path in documents {
        let path = path.as_ref();
        match extract_file(path, &segmenter) {
            Ok(sentences) => {
                let annotations: usize = sentences.iter().map(|s| s.annotations.len()).sum();
                tracing::info!(
                    document = %path.display(),
                    sentences = sentences.len(),
                    annotations,
                    "Extracted document"
                );
                output.sentences.extend(sentences);
            }
            Err(e) => {
                tracing::warn!(document = %path.display(), error = %e, "Skipping document");
                output.failed.push((path.to_path_buf(), e.to_string()));
            }
        }
    }

    output
}
