use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::application::services::ServiceConfig;
use crate::domain::DomainError;
use crate::infrastructure::embeddings::{DEFAULT_SIMPLE_DIMENSIONS, DEFAULT_SIMPLE_MODEL};
use crate::infrastructure::http_client::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};

/// Default filename used to persist configuration within the data directory.
const CONFIG_FILENAME: &str = "config.json";

/// Embedding backends compiled into the binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum EmbeddingBackend {
    /// Remote embeddings endpoint, using `models.embedding`.
    #[serde(rename = "openai")]
    OpenAi,
    /// Lightweight deterministic hash embedder (always available, offline).
    Simple {
        #[serde(default = "default_simple_model")]
        model: String,
        #[serde(default = "default_simple_dim")]
        dimensions: usize,
    },
}

impl EmbeddingBackend {
    pub fn id(&self) -> &'static str {
        match self {
            EmbeddingBackend::OpenAi => "openai",
            EmbeddingBackend::Simple { .. } => "simple",
        }
    }

    pub fn with_default_model(id: &str) -> Option<Self> {
        match id {
            "openai" => Some(EmbeddingBackend::OpenAi),
            "simple" => Some(EmbeddingBackend::Simple {
                model: default_simple_model(),
                dimensions: default_simple_dim(),
            }),
            _ => None,
        }
    }
}

impl Default for EmbeddingBackend {
    fn default() -> Self {
        EmbeddingBackend::OpenAi
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelSettings {
    pub embedding: String,
    pub generation: String,
    pub moderation: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        let service = ServiceConfig::default();
        Self {
            embedding: service.embedding_model,
            generation: service.generation_model,
            moderation: service.moderation_model,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub max_context_chars: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        let service = ServiceConfig::default();
        Self {
            top_k: service.top_k,
            max_context_chars: service.max_context_chars,
        }
    }
}

/// Complete configuration payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub openai: OpenAiSettings,
    #[serde(default)]
    pub models: ModelSettings,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub embedding: EmbeddingBackend,
}

impl AppConfig {
    /// Loads `<data_dir>/config.json` when present, then applies environment overrides.
    pub fn load(data_dir: impl AsRef<Path>) -> Result<Self, DomainError> {
        let mut config = Self::from_file(config_path(data_dir))?;
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let bytes = fs::read(path).map_err(|err| {
            DomainError::configuration(format!("failed to read {}: {err}", path.display()))
        })?;
        let config: Self = serde_json::from_slice(&bytes).map_err(|err| {
            DomainError::configuration(format!("failed to parse {}: {err}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides settings from environment-style variables resolved by `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), DomainError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.openai.api_key = Some(key);
        }
        if let Some(url) = non_empty("OPENAI_BASE_URL") {
            self.openai.base_url = url;
        }
        if let Some(secs) = non_empty("OPENAI_TIMEOUT_SECS") {
            self.openai.timeout_secs = parse_number("OPENAI_TIMEOUT_SECS", &secs)?;
        }
        if let Some(model) = non_empty("EMBEDDING_MODEL") {
            self.models.embedding = model;
        }
        if let Some(model) = non_empty("GENERATION_MODEL") {
            self.models.generation = model;
        }
        if let Some(model) = non_empty("MODERATION_MODEL") {
            self.models.moderation = model;
        }
        if let Some(top_k) = non_empty("TOP_K") {
            self.retrieval.top_k = parse_number("TOP_K", &top_k)?;
        }
        if let Some(chars) = non_empty("MAX_CONTEXT_CHARS") {
            self.retrieval.max_context_chars = parse_number("MAX_CONTEXT_CHARS", &chars)?;
        }
        if let Some(id) = non_empty("GATED_RAG_EMBEDDING_BACKEND") {
            self.embedding = EmbeddingBackend::with_default_model(id.trim()).ok_or_else(|| {
                DomainError::configuration(format!("unknown embedding backend '{id}'"))
            })?;
        }

        self.validate()
    }

    /// Rejects values the services cannot run with.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.retrieval.top_k == 0 {
            return Err(DomainError::configuration("TOP_K must be at least 1"));
        }
        Ok(())
    }

    /// Settings handed to the services. The embedding model follows the active backend.
    pub fn service_config(&self) -> ServiceConfig {
        let embedding_model = match &self.embedding {
            EmbeddingBackend::OpenAi => self.models.embedding.clone(),
            EmbeddingBackend::Simple { model, .. } => model.clone(),
        };

        ServiceConfig {
            embedding_model,
            generation_model: self.models.generation.clone(),
            moderation_model: self.models.moderation.clone(),
            top_k: self.retrieval.top_k,
            max_context_chars: self.retrieval.max_context_chars,
        }
    }
}

pub fn config_path(data_dir: impl AsRef<Path>) -> PathBuf {
    data_dir.as_ref().join(CONFIG_FILENAME)
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, DomainError> {
    raw.trim()
        .parse()
        .map_err(|_| DomainError::configuration(format!("{key} must be a number, got '{raw}'")))
}

const fn default_simple_dim() -> usize {
    DEFAULT_SIMPLE_DIMENSIONS
}

fn default_simple_model() -> String {
    DEFAULT_SIMPLE_MODEL.to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_service_defaults() {
        let config = AppConfig::default();
        let service = config.service_config();
        assert_eq!(service.embedding_model, "text-embedding-3-large");
        assert_eq!(service.generation_model, "gpt-4.1");
        assert_eq!(service.moderation_model, "omni-moderation-latest");
        assert_eq!(service.top_k, 5);
        assert_eq!(service.max_context_chars, 8000);
    }

    #[test]
    fn environment_overrides_models_and_limits() {
        let mut config = AppConfig::default();
        config
            .apply_env_with(env(&[
                ("OPENAI_API_KEY", "sk-live"),
                ("GENERATION_MODEL", "gpt-4.1-mini"),
                ("TOP_K", "8"),
                ("MAX_CONTEXT_CHARS", "4000"),
                ("EMBEDDING_MODEL", ""),
            ]))
            .expect("env applied");

        assert_eq!(config.openai.api_key.as_deref(), Some("sk-live"));
        let service = config.service_config();
        assert_eq!(service.generation_model, "gpt-4.1-mini");
        assert_eq!(service.embedding_model, "text-embedding-3-large");
        assert_eq!(service.top_k, 8);
        assert_eq!(service.max_context_chars, 4000);
    }

    #[test]
    fn malformed_number_is_a_configuration_error() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_with(env(&[("TOP_K", "five")]))
            .unwrap_err();
        assert!(matches!(err, DomainError::Configuration(_)));
    }

    #[test]
    fn zero_top_k_is_a_configuration_error() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_with(env(&[("TOP_K", "0")]))
            .unwrap_err();
        assert!(matches!(err, DomainError::Configuration(_)));

        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(config_path(dir.path()), r#"{"retrieval":{"top_k":0}}"#).expect("write config");
        let err = AppConfig::from_file(config_path(dir.path())).unwrap_err();
        assert!(matches!(err, DomainError::Configuration(_)));
    }

    #[test]
    fn simple_backend_drives_embedding_model() {
        let mut config = AppConfig::default();
        config
            .apply_env_with(env(&[("GATED_RAG_EMBEDDING_BACKEND", "simple")]))
            .expect("env applied");
        assert_eq!(config.service_config().embedding_model, DEFAULT_SIMPLE_MODEL);
        assert!(config
            .apply_env_with(env(&[("GATED_RAG_EMBEDDING_BACKEND", "onnx")]))
            .is_err());
    }

    #[test]
    fn file_values_are_read_and_partial_sections_defaulted() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            config_path(dir.path()),
            r#"{"retrieval":{"top_k":3},"embedding":{"backend":"simple","dimensions":64}}"#,
        )
        .expect("write config");

        let config = AppConfig::from_file(config_path(dir.path())).expect("config");
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.max_context_chars, 8000);
        assert_eq!(
            config.embedding,
            EmbeddingBackend::Simple {
                model: DEFAULT_SIMPLE_MODEL.into(),
                dimensions: 64
            }
        );
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig::from_file(config_path(dir.path())).expect("config");
        assert_eq!(config, AppConfig::default());
    }
}
