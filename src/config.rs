use std::env;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the document QA server.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the OpenAI-compatible endpoint, required when either provider is OpenAI.
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API (`/embeddings`, `/chat/completions`).
    pub openai_base_url: String,
    /// Backend answering chat completions.
    pub chat_provider: Provider,
    /// Chat model identifier passed to the provider.
    pub chat_model: String,
    /// Backend producing embedding vectors.
    pub embedding_provider: Provider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Maximum number of texts sent in one embedding request.
    pub embedding_batch_size: usize,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Vector store backend used for per-request indexes.
    pub vector_store: VectorStoreKind,
    /// Base URL of the Qdrant instance, required for the Qdrant backend.
    pub qdrant_url: Option<String>,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Target chunk length.
    pub text_splitter_chunk_size: usize,
    /// Length shared by adjacent chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Unit in which chunk size and overlap are measured.
    pub text_splitter_length_unit: LengthUnit,
    /// Number of chunks retrieved per question.
    pub retriever_top_k: usize,
    /// Questions answered concurrently within one request.
    pub qa_max_concurrency: usize,
    /// Timeout applied to every provider HTTP call, in seconds.
    pub provider_timeout_secs: u64,
    /// Upper bound on multipart request bodies.
    pub max_upload_bytes: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Hosted model backends supported for embeddings and chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    /// OpenAI or any OpenAI-compatible API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

/// Vector store backends that can hold a per-request index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorStoreKind {
    /// Process-local brute-force cosine index.
    Memory,
    /// One throwaway Qdrant collection per index.
    Qdrant,
}

/// Unit used to measure chunk lengths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LengthUnit {
    /// Unicode scalar values.
    Chars,
    /// Tokens of the embedding model's BPE encoding.
    Tokens,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let chat_provider = parse_or(&get, "CHAT_PROVIDER", Provider::OpenAI)?;
        let embedding_provider = parse_or(&get, "EMBEDDING_PROVIDER", Provider::OpenAI)?;
        let openai_api_key = get("OPENAI_API_KEY");
        if openai_api_key.is_none()
            && (chat_provider == Provider::OpenAI || embedding_provider == Provider::OpenAI)
        {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".into()));
        }

        let vector_store = parse_or(&get, "VECTOR_STORE", VectorStoreKind::Memory)?;
        let qdrant_url = get("QDRANT_URL");
        if vector_store == VectorStoreKind::Qdrant && qdrant_url.is_none() {
            return Err(ConfigError::MissingVariable("QDRANT_URL".into()));
        }

        let chunk_size: usize = parse_or(&get, "TEXT_SPLITTER_CHUNK_SIZE", 1000)?;
        if chunk_size == 0 {
            return Err(ConfigError::InvalidValue("TEXT_SPLITTER_CHUNK_SIZE".into()));
        }
        let chunk_overlap: usize = parse_or(&get, "TEXT_SPLITTER_CHUNK_OVERLAP", 200)?;
        if chunk_overlap >= chunk_size {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_OVERLAP".into(),
            ));
        }

        Ok(Self {
            openai_api_key,
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            chat_provider,
            chat_model: get("CHAT_MODEL")
                .or_else(|| get("OPENAI_MODEL"))
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            embedding_provider,
            embedding_model: get("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_batch_size: positive(
                parse_or(&get, "EMBEDDING_BATCH_SIZE", 64)?,
                "EMBEDDING_BATCH_SIZE",
            )?,
            ollama_url: get("OLLAMA_URL").unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            vector_store,
            qdrant_url,
            qdrant_api_key: get("QDRANT_API_KEY"),
            text_splitter_chunk_size: chunk_size,
            text_splitter_chunk_overlap: chunk_overlap,
            text_splitter_length_unit: parse_or(
                &get,
                "TEXT_SPLITTER_LENGTH_UNIT",
                LengthUnit::Chars,
            )?,
            retriever_top_k: positive(parse_or(&get, "RETRIEVER_TOP_K", 3)?, "RETRIEVER_TOP_K")?,
            qa_max_concurrency: positive(
                parse_or(&get, "QA_MAX_CONCURRENCY", 4)?,
                "QA_MAX_CONCURRENCY",
            )?,
            provider_timeout_secs: parse_or(&get, "PROVIDER_TIMEOUT_SECS", 60)?,
            max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", 25 * 1024 * 1024)?,
            server_port: get("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }
}

fn parse_or<G, T>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

fn positive(value: usize, key: &str) -> Result<usize, ConfigError> {
    if value == 0 {
        Err(ConfigError::InvalidValue(key.to_string()))
    } else {
        Ok(value)
    }
}

impl std::str::FromStr for Provider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for VectorStoreKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "qdrant" => Ok(Self::Qdrant),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for LengthUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chars" | "characters" => Ok(Self::Chars),
            "tokens" => Ok(Self::Tokens),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        chat_provider = ?config.chat_provider,
        chat_model = %config.chat_model,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        vector_store = ?config.vector_store,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_source(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_follow_openai_stack() {
        let config = from_pairs(&[("OPENAI_API_KEY", "sk-test")]).expect("config");
        assert_eq!(config.chat_provider, Provider::OpenAI);
        assert_eq!(config.chat_model, "gpt-4o-mini");
        assert_eq!(config.embedding_model, "text-embedding-ada-002");
        assert_eq!(config.text_splitter_chunk_size, 1000);
        assert_eq!(config.text_splitter_chunk_overlap, 200);
        assert_eq!(config.text_splitter_length_unit, LengthUnit::Chars);
        assert_eq!(config.retriever_top_k, 3);
        assert_eq!(config.vector_store, VectorStoreKind::Memory);
        assert_eq!(config.server_port, None);
    }

    #[test]
    fn openai_key_is_required_for_openai_providers() {
        let error = from_pairs(&[]).unwrap_err();
        assert!(matches!(error, ConfigError::MissingVariable(key) if key == "OPENAI_API_KEY"));
    }

    #[test]
    fn ollama_only_setup_needs_no_openai_key() {
        let config = from_pairs(&[
            ("CHAT_PROVIDER", "ollama"),
            ("EMBEDDING_PROVIDER", "Ollama"),
            ("CHAT_MODEL", "llama3.1"),
        ])
        .expect("config");
        assert_eq!(config.chat_provider, Provider::Ollama);
        assert_eq!(config.embedding_provider, Provider::Ollama);
        assert_eq!(config.chat_model, "llama3.1");
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn openai_model_is_accepted_as_chat_model_alias() {
        let config = from_pairs(&[("OPENAI_API_KEY", "sk"), ("OPENAI_MODEL", "gpt-4o")])
            .expect("config");
        assert_eq!(config.chat_model, "gpt-4o");
    }

    #[test]
    fn qdrant_backend_requires_url() {
        let error = from_pairs(&[("OPENAI_API_KEY", "sk"), ("VECTOR_STORE", "qdrant")])
            .unwrap_err();
        assert!(matches!(error, ConfigError::MissingVariable(key) if key == "QDRANT_URL"));
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let error = from_pairs(&[
            ("OPENAI_API_KEY", "sk"),
            ("TEXT_SPLITTER_CHUNK_SIZE", "100"),
            ("TEXT_SPLITTER_CHUNK_OVERLAP", "100"),
        ])
        .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn rejects_unparsable_numbers() {
        let error = from_pairs(&[("OPENAI_API_KEY", "sk"), ("RETRIEVER_TOP_K", "three")])
            .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "RETRIEVER_TOP_K"));

        let error =
            from_pairs(&[("OPENAI_API_KEY", "sk"), ("SERVER_PORT", "99999")]).unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "SERVER_PORT"));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = from_pairs(&[("OPENAI_API_KEY", "sk"), ("RETRIEVER_TOP_K", "  ")])
            .expect("config");
        assert_eq!(config.retriever_top_k, 3);
    }
}
