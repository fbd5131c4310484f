//! Line-delimited JSON files at the stage boundaries
//!
//! Every stage reads one JSONL file and writes one. Writes go to a temporary
//! file in the target directory which is then renamed over the target, so a
//! crashed run never leaves a half-written stage output behind.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JsonlError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Parse each non-blank line on its own. Line numbers are 1-based.
pub fn parse_lines<T: DeserializeOwned>(content: &str) -> Vec<(usize, Result<T, serde_json::Error>)> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| (idx + 1, serde_json::from_str(line)))
        .collect()
}

/// Read every valid record of a JSONL file. Invalid lines are logged and
/// skipped; only a file that cannot be read fails.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, JsonlError> {
    let content = std::fs::read_to_string(path).map_err(|source| JsonlError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for (line, parsed) in parse_lines(&content) {
        match parsed {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                tracing::warn!(path = %path.display(), line, error = %e, "Skipping invalid record");
            }
        }
    }
    if skipped > 0 {
        tracing::warn!(path = %path.display(), skipped, read = records.len(), "Skipped invalid records");
    }
    Ok(records)
}

pub fn write_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> Result<(), JsonlError> {
    let mut buffer = Vec::new();
    for record in records {
        serde_json::to_writer(&mut buffer, record)?;
        buffer.push(b'\n');
    }
    write_atomic(path, &buffer).map_err(|source| JsonlError::Write {
        path: path.display().to_string(),
        source,
    })
}

/// Replace `path` with `contents` in one rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
