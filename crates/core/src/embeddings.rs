use crate::error::BackendError;
use crate::llm::join_endpoint;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

#[async_trait]
pub trait Embedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError>;
}

/// Deterministic hashed trigram embedder; needs no service.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        Ok(self.embed_sync(text))
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

/// Embeddings from an Ollama server's `/api/embed` endpoint.
pub struct OllamaEmbedder {
    client: Client,
    endpoint: Url,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(base_url: &Url, model: impl Into<String>) -> Result<Self, BackendError> {
        Ok(Self {
            client: Client::new(),
            endpoint: join_endpoint(base_url, "api/embed")?,
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&EmbedRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackendError::BackendResponse {
                backend: "ollama".to_string(),
                details: format!("embed returned {}", response.status()),
            });
        }

        let payload: EmbedResponse = response.json().await?;
        let embedding = payload
            .embeddings
            .into_iter()
            .next()
            .filter(|vector| !vector.is_empty())
            .ok_or_else(|| BackendError::BackendResponse {
                backend: "ollama".to_string(),
                details: format!("model {} returned no embedding", self.model),
            })?;

        debug!(model = %self.model, dimensions = embedding.len(), "embedded text");
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::{CharacterNgramEmbedder, Embedder, EmbedResponse, OllamaEmbedder};
    use url::Url;

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed_sync("Quarterly revenue by region");
        let second = embedder.embed_sync("Quarterly revenue by region");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed_sync("abc");
        assert_eq!(vector.len(), 32);
    }

    #[tokio::test]
    async fn async_embedding_matches_sync_path() {
        let embedder = CharacterNgramEmbedder::default();
        let vector = embedder.embed("The sky is blue.").await.expect("embedding");
        assert_eq!(vector, embedder.embed_sync("The sky is blue."));
    }

    #[test]
    fn ollama_endpoint_is_joined_onto_base_url() {
        let base = Url::parse("http://localhost:11434").expect("url");
        let embedder = OllamaEmbedder::new(&base, "nomic-embed-text").expect("embedder");
        assert_eq!(embedder.endpoint.as_str(), "http://localhost:11434/api/embed");
        assert_eq!(embedder.model(), "nomic-embed-text");
    }

    #[test]
    fn ollama_endpoint_keeps_a_base_path_prefix() {
        let base = Url::parse("http://gateway.local/ollama").expect("url");
        let embedder = OllamaEmbedder::new(&base, "nomic-embed-text").expect("embedder");
        assert_eq!(embedder.endpoint.as_str(), "http://gateway.local/ollama/api/embed");
    }

    #[test]
    fn ollama_response_parses_first_embedding() {
        let payload: EmbedResponse =
            serde_json::from_str(r#"{"model":"m","embeddings":[[0.5,0.25]]}"#).expect("json");
        assert_eq!(payload.embeddings, vec![vec![0.5, 0.25]]);
    }
}
