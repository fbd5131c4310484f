use thiserror::Error;

/// Errors raised while compiling the label rule tables.
#[derive(Error, Debug)]
pub enum HistnerError {
    #[error("Invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl HistnerError {
    pub fn pattern(pattern: &str, source: regex::Error) -> Self {
        HistnerError::Pattern {
            pattern: pattern.to_string(),
            source,
        }
    }
}
