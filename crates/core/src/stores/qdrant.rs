use crate::error::BackendError;
use crate::models::{Chunk, ChunkMetadata, EmbeddedChunk, MetadataFilter, ScoredChunk};
use crate::store::VectorStore;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

pub struct QdrantStore {
    endpoint: String,
    client: Client,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn failure(status: StatusCode) -> BackendError {
        BackendError::BackendResponse {
            backend: "qdrant".to_string(),
            details: status.to_string(),
        }
    }
}

fn filter_body(filter: &MetadataFilter) -> Option<Value> {
    let mut must = Vec::new();
    if let Some(kind) = filter.kind {
        must.push(json!({ "key": "type", "match": { "value": kind.as_str() } }));
    }
    if let Some(page) = filter.page {
        must.push(json!({ "key": "page", "match": { "value": page } }));
    }
    (!must.is_empty()).then(|| json!({ "must": must }))
}

fn point(entry: &EmbeddedChunk) -> Result<Value, BackendError> {
    let mut payload = serde_json::to_value(entry.chunk.metadata)?;
    payload["content"] = Value::String(entry.chunk.content.clone());

    Ok(json!({
        "id": entry.id,
        "vector": entry.embedding,
        "payload": payload,
    }))
}

fn parse_hits(parsed: &Value) -> Result<Vec<ScoredChunk>, BackendError> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut result = Vec::new();
    for hit in hits {
        let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
        let payload = hit.pointer("/payload").cloned().unwrap_or(Value::Null);
        let content = payload
            .pointer("/content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let metadata: ChunkMetadata = serde_json::from_value(payload)?;

        result.push(ScoredChunk {
            chunk: Chunk { content, metadata },
            score: score as f32,
        });
    }

    Ok(result)
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn backend(&self) -> &'static str {
        "qdrant"
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<(), BackendError> {
        let response = self
            .client
            .put(format!("{}/collections/{}", self.endpoint, name))
            .json(&json!({
                "vectors": { "size": dimensions, "distance": "Cosine" },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response.status()));
        }
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), BackendError> {
        let response = self
            .client
            .delete(format!("{}/collections/{}", self.endpoint, name))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND || response.status().is_success() {
            return Ok(());
        }
        Err(Self::failure(response.status()))
    }

    async fn list_collections(&self) -> Result<Vec<String>, BackendError> {
        let response = self
            .client
            .get(format!("{}/collections", self.endpoint))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response.status()));
        }

        let parsed: Value = response.json().await?;
        Ok(parsed
            .pointer("/result/collections")
            .and_then(Value::as_array)
            .map(|collections| {
                collections
                    .iter()
                    .filter_map(|collection| collection.pointer("/name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(&self, name: &str, chunks: &[EmbeddedChunk]) -> Result<(), BackendError> {
        let points = chunks.iter().map(point).collect::<Result<Vec<_>, BackendError>>()?;

        if points.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .put(format!(
                "{}/collections/{}/points?wait=true",
                self.endpoint, name
            ))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response.status()));
        }

        Ok(())
    }

    async fn similarity_search(
        &self,
        name: &str,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>, BackendError> {
        let mut body = json!({
            "vector": query_embedding,
            "limit": k,
            "with_payload": true,
        });
        if let Some(filter) = filter.and_then(filter_body) {
            body["filter"] = filter;
        }

        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/search",
                self.endpoint, name
            ))
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(Self::failure(response.status()));
        }

        let parsed: Value = response.json().await?;
        parse_hits(&parsed)
    }
}
