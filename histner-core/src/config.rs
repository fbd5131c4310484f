use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::ontology;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HistnerConfig {
    pub logging: LoggingConfig,
    pub extract: ExtractConfig,
    pub ontology: OntologyConfig,
    pub normalizer: NormalizerConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExtractConfig {
    /// Language used by the sentence segmenter (`nl` or `en`).
    pub language: String,
    /// Additional abbreviations that never end a sentence, e.g. `"wed."`.
    pub extra_abbreviations: Vec<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            language: "nl".to_string(),
            extra_abbreviations: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ClassConfig {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OntologyConfig {
    pub classes: Vec<ClassConfig>,
    pub allowed_prefixes: Vec<String>,
}

impl Default for OntologyConfig {
    fn default() -> Self {
        Self {
            classes: ontology::default_classes(),
            allowed_prefixes: vec!["E".to_string(), "F".to_string(), "P".to_string()],
        }
    }
}

/// One entry of the ordered normalization rule table.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleConfig {
    /// Canonicalizes code-like labels (`e 53`, `E-53 Place`) to `E53`.
    Code,
    /// Matches the human-readable class names of the ontology.
    ClassName,
    /// Maps a phrase (whole-word, case-insensitive) to a code.
    Synonym { phrase: String, code: String },
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NormalizerConfig {
    pub rules: Vec<RuleConfig>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            rules: ontology::default_rules(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: String,
    pub gemini_model: String,
    pub gemini_dimensions: u32,
    pub onnx_model_path: String,
    pub onnx_dimensions: u32,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: "onnx".to_string(),
            gemini_model: "gemini-embedding-001".to_string(),
            gemini_dimensions: 768,
            onnx_model_path: String::new(),
            onnx_dimensions: 384,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ModelConfig {
    /// Identifier written into prediction records and shown in the report.
    pub id: String,
    /// Model name sent to the API.
    pub model: String,
    /// Base URL of an OpenAI-compatible chat completions API.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_concurrency: usize,
    pub instructions: Option<String>,
    pub models: Vec<ModelConfig>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            max_delay_ms: 30_000,
            timeout_secs: 120,
            temperature: 0.0,
            max_tokens: 1024,
            max_concurrency: 1,
            instructions: None,
            models: vec![
                ModelConfig {
                    id: "mistral-small-3.2".to_string(),
                    model: "mistral-small-2506".to_string(),
                    base_url: "https://api.mistral.ai/v1".to_string(),
                    api_key_env: "MISTRAL_API_KEY".to_string(),
                },
                ModelConfig {
                    id: "gpt-4o-mini".to_string(),
                    model: "gpt-4o-mini".to_string(),
                    base_url: "https://api.openai.com/v1".to_string(),
                    api_key_env: "OPENAI_API_KEY".to_string(),
                },
            ],
        }
    }
}

impl HistnerConfig {
    /// Load configuration from an optional TOML file, then apply
    /// `HISTNER_SECTION__KEY` environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        let s = builder
            .add_source(
                Environment::with_prefix("HISTNER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_complete() {
        let config = HistnerConfig::default();
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.extract.language, "nl");
        assert_eq!(config.generation.models.len(), 2);
        assert_eq!(config.ontology.allowed_prefixes, vec!["E", "F", "P"]);
        assert_eq!(config.normalizer.rules.first(), Some(&RuleConfig::Code));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = HistnerConfig::load(None).expect("defaults should load");
        assert_eq!(config.embedding.backend, "onnx");
        assert_eq!(config.generation.max_retries, 3);
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("tempfile");
        write!(
            file,
            r#"
[retrieval]
top_k = 3

[[normalizer.rules]]
kind = "synonym"
phrase = "stad"
code = "E53"

[[normalizer.rules]]
kind = "code"

[[generation.models]]
id = "local"
model = "llama3"
base_url = "http://localhost:11434/v1"
api_key_env = "LOCAL_KEY"
"#
        )
        .expect("write config");

        let path = file.path().to_string_lossy().to_string();
        let config = HistnerConfig::load(Some(path.as_str())).expect("config should load");

        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(
            config.normalizer.rules,
            vec![
                RuleConfig::Synonym {
                    phrase: "stad".to_string(),
                    code: "E53".to_string()
                },
                RuleConfig::Code,
            ]
        );
        assert_eq!(config.generation.models.len(), 1);
        assert_eq!(config.generation.models[0].id, "local");
        // untouched sections keep their defaults
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = HistnerConfig::load(Some("/nonexistent/histner.toml"));
        assert!(result.is_err());
    }
}
