use crate::error::BackendError;
use crate::models::{EmbeddedChunk, MetadataFilter, ScoredChunk};
use async_trait::async_trait;

/// The narrow surface the pipeline needs from a vector database.
#[async_trait]
pub trait VectorStore {
    /// Name of the backend, for logs and error messages.
    fn backend(&self) -> &'static str;

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<(), BackendError>;

    /// Deleting a collection that does not exist succeeds.
    async fn delete_collection(&self, name: &str) -> Result<(), BackendError>;

    async fn list_collections(&self) -> Result<Vec<String>, BackendError>;

    async fn insert(&self, name: &str, chunks: &[EmbeddedChunk]) -> Result<(), BackendError>;

    /// Returns up to `k` chunks, most similar first.
    async fn similarity_search(
        &self,
        name: &str,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>, BackendError>;

    async fn collection_exists(&self, name: &str) -> Result<bool, BackendError> {
        Ok(self
            .list_collections()
            .await?
            .iter()
            .any(|existing| existing == name))
    }
}
