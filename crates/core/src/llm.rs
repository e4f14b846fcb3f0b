use crate::error::BackendError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

#[async_trait]
pub trait LanguageModel {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError>;
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Joins `path` under `base`, treating the base path as a directory so a
/// prefix like `http://host/ollama` is kept.
pub(crate) fn join_endpoint(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let directory = format!("{}/", base.path());
        base.set_path(&directory);
    }
    base.join(path)
}

/// Non-streaming completions from an Ollama server's `/api/generate`.
pub struct OllamaChatModel {
    client: Client,
    endpoint: Url,
    model: String,
    temperature: f32,
}

impl OllamaChatModel {
    pub fn new(base_url: &Url, model: impl Into<String>, temperature: f32) -> Result<Self, BackendError> {
        Ok(Self {
            client: Client::new(),
            endpoint: join_endpoint(base_url, "api/generate")?,
            model: model.into(),
            temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request<'a>(&'a self, prompt: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaChatModel {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&self.request(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackendError::BackendResponse {
                backend: "ollama".to_string(),
                details: format!("generate returned {}", response.status()),
            });
        }

        let payload: GenerateResponse = response.json().await?;
        debug!(model = %self.model, chars = payload.response.len(), "model answered");
        Ok(payload.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_disables_streaming_and_pins_temperature() {
        let base = Url::parse("http://localhost:11434/").expect("url");
        let model = OllamaChatModel::new(&base, "llama3.2", 0.1).expect("model");

        let body = serde_json::to_value(model.request("hi")).expect("json");

        assert_eq!(
            body,
            json!({
                "model": "llama3.2",
                "prompt": "hi",
                "stream": false,
                "options": {"temperature": 0.1f32},
            })
        );
        assert_eq!(model.endpoint.as_str(), "http://localhost:11434/api/generate");
    }

    #[test]
    fn base_path_prefix_survives_endpoint_join() {
        let base = Url::parse("http://gateway.local/ollama").expect("url");
        let model = OllamaChatModel::new(&base, "llama3.2", 0.1).expect("model");
        assert_eq!(model.endpoint.as_str(), "http://gateway.local/ollama/api/generate");

        let slashed = Url::parse("http://gateway.local/ollama/").expect("url");
        assert_eq!(
            join_endpoint(&slashed, "api/generate").expect("join").as_str(),
            "http://gateway.local/ollama/api/generate"
        );
    }
}
