use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    /// The document cannot be turned into annotated sentences. Fatal for
    /// this document only.
    #[error("Document format error in {document}: {reason}")]
    DocumentFormat { document: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub(crate) fn format(document: &str, reason: impl Into<String>) -> Self {
        IngestError::DocumentFormat {
            document: document.to_string(),
            reason: reason.into(),
        }
    }
}
