//! Local sentence embeddings with ONNX Runtime
//!
//! Runs `paraphrase-multilingual-MiniLM-L12-v2` (exported to ONNX) through
//! `ort`, tokenized with `tokenizers`. Token vectors are mean-pooled over the
//! attention mask and L2-normalized, which is how the model was trained to be
//! compared.

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;

use crate::config::EmbeddingConfig;
use crate::embeddings::{EmbeddingBackend, EmbeddingError};

const DEFAULT_MODEL: &str = "paraphrase-multilingual-MiniLM-L12-v2";

/// Model and tokenizer file locations. The tokenizer sits next to the model
/// as `<stem>-tokenizer.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub model: PathBuf,
    pub tokenizer: PathBuf,
}

impl ModelFiles {
    /// Files for a configured model path. An empty path selects the default
    /// model in `default_model_dir()`; `~` and `$VARS` are expanded.
    pub fn resolve(configured: &str) -> Self {
        let configured = configured.trim();
        if configured.is_empty() {
            return Self::for_model(default_model_dir().join(format!("{DEFAULT_MODEL}.onnx")));
        }

        let expanded = match shellexpand::full(configured) {
            Ok(path) => path.into_owned(),
            Err(e) => {
                tracing::warn!(path = configured, error = %e, "Could not expand model path, using it as is");
                configured.to_string()
            }
        };
        Self::for_model(PathBuf::from(expanded))
    }

    fn for_model(model: PathBuf) -> Self {
        let stem = model
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tokenizer = model.with_file_name(format!("{stem}-tokenizer.json"));
        Self { model, tokenizer }
    }

    fn check_exist(&self) -> Result<(), EmbeddingError> {
        [&self.model, &self.tokenizer]
            .into_iter()
            .find(|p| !p.exists())
            .map_or(Ok(()), |missing| {
                Err(EmbeddingError::ModelNotFound {
                    path: missing.display().to_string(),
                })
            })
    }
}

/// `$XDG_DATA_HOME/histner/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    let data_home = match std::env::var_os("XDG_DATA_HOME") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".local/share"),
    };
    data_home.join("histner").join("models")
}

struct Loaded {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimensions: usize,
}

/// Embeds on the blocking thread pool; the session is shared behind a mutex.
#[derive(Clone)]
pub struct OnnxEmbedder {
    loaded: Arc<Loaded>,
}

impl std::fmt::Debug for OnnxEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbedder")
            .field("dimensions", &self.loaded.dimensions)
            .finish_non_exhaustive()
    }
}

impl OnnxEmbedder {
    pub fn load(files: &ModelFiles, dimensions: usize) -> Result<Self, EmbeddingError> {
        files.check_exist()?;

        let session = Session::builder()
            .and_then(|builder| builder.with_intra_threads(1))
            .and_then(|builder| builder.commit_from_file(&files.model))
            .map_err(inference_error)?;
        let tokenizer = Tokenizer::from_file(&files.tokenizer).map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        tracing::info!(model = %files.model.display(), dimensions, "Loaded local embedding model");
        Ok(Self {
            loaded: Arc::new(Loaded {
                session: Mutex::new(session),
                tokenizer,
                dimensions,
            }),
        })
    }

    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        Self::load(
            &ModelFiles::resolve(&config.onnx_model_path),
            config.onnx_dimensions as usize,
        )
    }
}

#[async_trait]
impl EmbeddingBackend for OnnxEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let loaded = Arc::clone(&self.loaded);
        let text = text.to_owned();
        tokio::task::spawn_blocking(move || loaded.embed_blocking(&text))
            .await
            .map_err(|e| EmbeddingError::OnnxInference(format!("embedding task failed: {e}")))?
    }

    fn dimensions(&self) -> usize {
        self.loaded.dimensions
    }

    fn name(&self) -> &str {
        "onnx"
    }
}

fn inference_error(e: impl std::fmt::Display) -> EmbeddingError {
    EmbeddingError::OnnxInference(e.to_string())
}

impl Loaded {
    fn embed_blocking(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        let widen = |ids: &[u32]| ids.iter().map(|&id| i64::from(id)).collect::<Vec<i64>>();
        let mask = widen(encoding.get_attention_mask());
        let shape = vec![1_i64, mask.len() as i64];

        let ids = Tensor::from_array((shape.clone(), widen(encoding.get_ids()))).map_err(inference_error)?;
        let attention = Tensor::from_array((shape.clone(), mask.clone())).map_err(inference_error)?;
        let types = Tensor::from_array((shape, widen(encoding.get_type_ids()))).map_err(inference_error)?;
        let inputs = ort::inputs! {
            "input_ids" => ids,
            "attention_mask" => attention,
            "token_type_ids" => types,
        };

        let mut session = self
            .session
            .lock()
            .map_err(|_| EmbeddingError::OnnxInference("session mutex poisoned".to_string()))?;
        let outputs = session.run(inputs).map_err(inference_error)?;

        // last_hidden_state: [batch, tokens, hidden]
        let (dims, hidden) = outputs[0].try_extract_tensor::<f32>().map_err(inference_error)?;
        let hidden_size = match dims.len() {
            3 => dims[2] as usize,
            n => return Err(EmbeddingError::OnnxInference(format!("unexpected {n}-dimensional model output"))),
        };

        let mut vector = mean_pool(hidden, &mask, hidden_size);
        l2_normalize(&mut vector);

        if vector.len() != self.dimensions {
            return Err(EmbeddingError::InvalidDimensions {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }
}

/// Mean of the token rows of a flattened `[tokens, hidden]` buffer, over the
/// tokens whose mask is set. All-masked input pools to zeros.
pub(crate) fn mean_pool(hidden: &[f32], mask: &[i64], hidden_size: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden_size];
    if hidden_size == 0 {
        return sum;
    }

    let rows = hidden
        .chunks_exact(hidden_size)
        .zip(mask.iter().chain(std::iter::repeat(&0)))
        .filter(|(_, &m)| m != 0)
        .map(|(row, _)| row);

    let mut count = 0usize;
    for row in rows {
        count += 1;
        sum.iter_mut().zip(row).for_each(|(acc, v)| *acc += v);
    }

    if count > 0 {
        let n = count as f32;
        sum.iter_mut().for_each(|v| *v /= n);
    }
    sum
}

pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}
