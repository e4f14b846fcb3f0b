use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_CHAT_MODEL: &str = "llama3.2";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_STORE_HOST: &str = "localhost";
pub const DEFAULT_STORE_PORT: u16 = 8000;
pub const DEFAULT_COLLECTION_NAME: &str = "pdf_tables_collection";
pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const TOP_K_RESULTS: usize = 4;
pub const DEFAULT_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_UPLOAD_DIR: &str = "data/uploads";

const ENV_PREFIX: &str = "PDF_RAG_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    pub ollama_base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub store_host: String,
    pub store_port: u16,
    pub collection_name: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub temperature: f32,
    pub upload_dir: PathBuf,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            store_host: DEFAULT_STORE_HOST.to_string(),
            store_port: DEFAULT_STORE_PORT,
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: TOP_K_RESULTS,
            temperature: DEFAULT_TEMPERATURE,
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
        }
    }
}

impl RagConfig {
    /// Defaults overlaid with any `PDF_RAG_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(value) = read("OLLAMA_BASE_URL") {
            config.ollama_base_url = value;
        }
        if let Some(value) = read("CHAT_MODEL") {
            config.chat_model = value;
        }
        if let Some(value) = read("EMBEDDING_MODEL") {
            config.embedding_model = value;
        }
        if let Some(value) = read("STORE_HOST") {
            config.store_host = value;
        }
        if let Some(value) = read("STORE_PORT") {
            config.store_port = parse_setting("store_port", &value)?;
        }
        if let Some(value) = read("COLLECTION_NAME") {
            config.collection_name = value;
        }
        if let Some(value) = read("CHUNK_SIZE") {
            config.chunk_size = parse_setting("chunk_size", &value)?;
        }
        if let Some(value) = read("CHUNK_OVERLAP") {
            config.chunk_overlap = parse_setting("chunk_overlap", &value)?;
        }
        if let Some(value) = read("TOP_K") {
            config.top_k = parse_setting("top_k", &value)?;
        }
        if let Some(value) = read("TEMPERATURE") {
            config.temperature = parse_setting("temperature", &value)?;
        }
        if let Some(value) = read("UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(value);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        require_non_empty("chat_model", &self.chat_model)?;
        require_non_empty("embedding_model", &self.embedding_model)?;
        require_non_empty("collection_name", &self.collection_name)?;
        require_non_empty("store_host", &self.store_host)?;

        if self.chunk_size == 0 {
            return Err(ConfigurationError::Invalid {
                key: "chunk_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigurationError::Invalid {
                key: "chunk_overlap",
                reason: format!(
                    "overlap {} must be smaller than chunk size {}",
                    self.chunk_overlap, self.chunk_size
                ),
            });
        }
        if self.top_k == 0 {
            return Err(ConfigurationError::Invalid {
                key: "top_k",
                reason: "must be greater than zero".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigurationError::Invalid {
                key: "temperature",
                reason: format!("{} is outside 0.0..=2.0", self.temperature),
            });
        }

        self.ollama_url()?;
        self.store_url()?;
        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigurationError> {
        Url::parse(&self.ollama_base_url).map_err(|source| ConfigurationError::Url {
            key: "ollama_base_url",
            source,
        })
    }

    /// Base URL of the vector store built from host and port.
    pub fn store_url(&self) -> Result<Url, ConfigurationError> {
        Url::parse(&format!("http://{}:{}", self.store_host, self.store_port)).map_err(|source| {
            ConfigurationError::Url {
                key: "store_host",
                source,
            }
        })
    }
}

fn require_non_empty(key: &'static str, value: &str) -> Result<(), ConfigurationError> {
    if value.trim().is_empty() {
        return Err(ConfigurationError::Missing(key));
    }
    Ok(())
}

fn parse_setting<T>(key: &'static str, value: &str) -> Result<T, ConfigurationError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|error| ConfigurationError::Invalid {
        key,
        reason: format!("{value:?}: {error}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 1_000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.top_k, 4);
        assert_eq!(config.store_url().expect("url").as_str(), "http://localhost:8000/");
        assert_eq!(config.upload_dir, PathBuf::from(DEFAULT_UPLOAD_DIR));
    }

    #[test]
    fn upload_dir_comes_from_environment() {
        let config = RagConfig::from_lookup(lookup(&[("UPLOAD_DIR", "/srv/pdfs")]))
            .expect("config should load");
        assert_eq!(config.upload_dir, PathBuf::from("/srv/pdfs"));

        let config = RagConfig::from_lookup(lookup(&[("UPLOAD_DIR", "   ")]))
            .expect("config should load");
        assert_eq!(config.upload_dir, PathBuf::from(DEFAULT_UPLOAD_DIR));
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let config = RagConfig {
            chunk_size: 100,
            chunk_overlap: 100,
            ..RagConfig::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::Invalid { key: "chunk_overlap", .. })
        ));
    }

    #[test]
    fn empty_collection_name_is_missing() {
        let config = RagConfig {
            collection_name: "  ".to_string(),
            ..RagConfig::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::Missing("collection_name"))
        ));
    }

    #[test]
    fn environment_overrides_are_applied() {
        let config = RagConfig::from_lookup(lookup(&[
            ("CHUNK_SIZE", "500"),
            ("CHUNK_OVERLAP", "50"),
            ("COLLECTION_NAME", "reports"),
            ("TOP_K", " 6 "),
        ]))
        .expect("config should load");

        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.collection_name, "reports");
        assert_eq!(config.top_k, 6);
        assert_eq!(config.chat_model, DEFAULT_CHAT_MODEL);
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let result = RagConfig::from_lookup(lookup(&[("STORE_PORT", "eighty")]));
        assert!(matches!(
            result,
            Err(ConfigurationError::Invalid { key: "store_port", .. })
        ));
    }

    #[test]
    fn bad_ollama_url_is_reported() {
        let config = RagConfig {
            ollama_base_url: "not a url".to_string(),
            ..RagConfig::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::Url { key: "ollama_base_url", .. })
        ));
    }
}
