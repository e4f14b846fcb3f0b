use crate::error::BackendError;
use crate::models::{Chunk, ChunkMetadata, EmbeddedChunk, MetadataFilter, ScoredChunk};
use crate::store::VectorStore;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

pub const DEFAULT_TENANT: &str = "default_tenant";
pub const DEFAULT_DATABASE: &str = "default_database";

/// Chroma server reached over its v2 REST API.
pub struct ChromaStore {
    endpoint: String,
    tenant: String,
    database: String,
    client: Client,
}

impl ChromaStore {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_database(endpoint, DEFAULT_TENANT, DEFAULT_DATABASE)
    }

    pub fn with_database(
        endpoint: impl Into<String>,
        tenant: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            tenant: tenant.into(),
            database: database.into(),
            client: Client::new(),
        }
    }

    fn collections_url(&self) -> String {
        format!(
            "{}/api/v2/tenants/{}/databases/{}/collections",
            self.endpoint, self.tenant, self.database
        )
    }

    /// Resolves a collection name to Chroma's internal id, `None` when absent.
    async fn collection_id(&self, name: &str) -> Result<Option<String>, BackendError> {
        let response = self
            .client
            .get(format!("{}/{}", self.collections_url(), name))
            .send()
            .await?;

        if is_missing(response.status()) {
            return Ok(None);
        }
        let parsed: Value = checked(response).await?.json().await?;
        parsed
            .pointer("/id")
            .and_then(Value::as_str)
            .map(|id| Some(id.to_string()))
            .ok_or_else(|| BackendError::BackendResponse {
                backend: "chroma".to_string(),
                details: format!("collection {name} has no id"),
            })
    }
}

fn is_missing(status: StatusCode) -> bool {
    status == StatusCode::NOT_FOUND
}

async fn checked(response: Response) -> Result<Response, BackendError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::BackendResponse {
        backend: "chroma".to_string(),
        details: format!("{status}: {body}"),
    })
}

fn where_clause(filter: &MetadataFilter) -> Option<Value> {
    let mut conditions = Vec::new();
    if let Some(kind) = filter.kind {
        conditions.push(json!({ "type": { "$eq": kind.as_str() } }));
    }
    if let Some(page) = filter.page {
        conditions.push(json!({ "page": { "$eq": page } }));
    }

    match conditions.len() {
        0 => None,
        1 => conditions.pop(),
        _ => Some(json!({ "$and": conditions })),
    }
}

/// Reads the first (and only) query row of a Chroma query response.
fn parse_query_response(parsed: &Value) -> Result<Vec<ScoredChunk>, BackendError> {
    let first_row = |key: &str| {
        parsed
            .pointer(&format!("/{key}/0"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    };

    let documents = first_row("documents");
    let metadatas = first_row("metadatas");
    let distances = first_row("distances");

    documents
        .into_iter()
        .zip(metadatas)
        .enumerate()
        .map(|(position, (document, metadata))| -> Result<ScoredChunk, BackendError> {
            let metadata: ChunkMetadata = serde_json::from_value(metadata)?;
            let distance = distances
                .get(position)
                .and_then(Value::as_f64)
                .unwrap_or(1.0) as f32;
            Ok(ScoredChunk {
                chunk: Chunk {
                    content: document.as_str().unwrap_or_default().to_string(),
                    metadata,
                },
                score: 1.0 - distance,
            })
        })
        .collect()
}

#[async_trait]
impl VectorStore for ChromaStore {
    fn backend(&self) -> &'static str {
        "chroma"
    }

    async fn create_collection(&self, name: &str, _dimensions: usize) -> Result<(), BackendError> {
        let response = self
            .client
            .post(self.collections_url())
            .json(&json!({
                "name": name,
                "get_or_create": true,
                "metadata": { "hnsw:space": "cosine" },
            }))
            .send()
            .await?;
        checked(response).await?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), BackendError> {
        let response = self
            .client
            .delete(format!("{}/{}", self.collections_url(), name))
            .send()
            .await?;

        if is_missing(response.status()) {
            debug!(collection = name, "chroma collection already absent");
            return Ok(());
        }
        checked(response).await?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>, BackendError> {
        let response = self.client.get(self.collections_url()).send().await?;
        let parsed: Value = checked(response).await?.json().await?;

        Ok(parsed
            .as_array()
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
        if chunks.is_empty() {
            return Ok(());
        }

        let collection_id = self
            .collection_id(name)
            .await?
            .ok_or_else(|| BackendError::Request(format!("collection '{name}' does not exist")))?;

        let metadatas = chunks
            .iter()
            .map(|entry| serde_json::to_value(entry.chunk.metadata))
            .collect::<Result<Vec<_>, _>>()?;

        let response = self
            .client
            .post(format!("{}/{}/add", self.collections_url(), collection_id))
            .json(&json!({
                "ids": chunks.iter().map(|entry| entry.id.as_str()).collect::<Vec<_>>(),
                "embeddings": chunks.iter().map(|entry| &entry.embedding).collect::<Vec<_>>(),
                "documents": chunks.iter().map(|entry| entry.chunk.content.as_str()).collect::<Vec<_>>(),
                "metadatas": metadatas,
            }))
            .send()
            .await?;
        checked(response).await?;
        Ok(())
    }

    async fn similarity_search(
        &self,
        name: &str,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>, BackendError> {
        let Some(collection_id) = self.collection_id(name).await? else {
            return Ok(Vec::new());
        };

        let mut body = json!({
            "query_embeddings": [query_embedding],
            "n_results": k,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(clause) = filter.and_then(where_clause) {
            body["where"] = clause;
        }

        let response = self
            .client
            .post(format!("{}/{}/query", self.collections_url(), collection_id))
            .json(&body)
            .send()
            .await?;
        let parsed: Value = checked(response).await?.json().await?;

        parse_query_response(&parsed)
    }
}
