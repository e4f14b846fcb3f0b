//! In-process vector store using cosine similarity.

use crate::error::BackendError;
use crate::models::{EmbeddedChunk, MetadataFilter, ScoredChunk};
use crate::store::VectorStore;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Vec<EmbeddedChunk>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create_collection(&self, name: &str, _dimensions: usize) -> Result<(), BackendError> {
        let mut collections = self.collections.write().await;
        collections.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), BackendError> {
        self.collections.write().await.remove(name);
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>, BackendError> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort_unstable();
        Ok(names)
    }

    async fn insert(&self, name: &str, chunks: &[EmbeddedChunk]) -> Result<(), BackendError> {
        let mut collections = self.collections.write().await;
        let stored = collections
            .get_mut(name)
            .ok_or_else(|| BackendError::Request(format!("collection '{name}' does not exist")))?;
        stored.extend(chunks.iter().cloned());
        Ok(())
    }

    async fn similarity_search(
        &self,
        name: &str,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>, BackendError> {
        let collections = self.collections.read().await;
        let Some(stored) = collections.get(name) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<ScoredChunk> = stored
            .iter()
            .filter(|entry| filter.map_or(true, |filter| filter.matches(&entry.chunk.metadata)))
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(query_embedding, &entry.embedding),
            })
            .collect();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BlockKind, Chunk, ChunkMetadata, ChunkOrigin};

    fn entry(id: &str, content: &str, page: u32, origin: ChunkOrigin, embedding: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            id: id.to_string(),
            chunk: Chunk {
                content: content.to_string(),
                metadata: ChunkMetadata { page, origin },
            },
            embedding,
        }
    }

    #[tokio::test]
    async fn search_ranks_by_cosine_similarity() -> Result<(), BackendError> {
        let store = InMemoryStore::new();
        store.create_collection("docs", 2).await?;
        store
            .insert(
                "docs",
                &[
                    entry("a", "far", 1, ChunkOrigin::Text { chunk_index: 0 }, vec![0.0, 1.0]),
                    entry("b", "near", 1, ChunkOrigin::Text { chunk_index: 1 }, vec![1.0, 0.1]),
                ],
            )
            .await?;

        let hits = store.similarity_search("docs", &[1.0, 0.0], 2, None).await?;

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.content, "near");
        assert!(hits[0].score > hits[1].score);
        Ok(())
    }

    #[tokio::test]
    async fn filter_applies_before_ranking() -> Result<(), BackendError> {
        let store = InMemoryStore::new();
        store.create_collection("docs", 2).await?;
        store
            .insert(
                "docs",
                &[
                    entry("a", "text", 1, ChunkOrigin::Text { chunk_index: 0 }, vec![1.0, 0.0]),
                    entry("b", "table", 2, ChunkOrigin::Table { table_index: 1 }, vec![0.0, 1.0]),
                ],
            )
            .await?;

        let filter = MetadataFilter {
            kind: Some(BlockKind::Table),
            page: None,
        };
        let hits = store
            .similarity_search("docs", &[1.0, 0.0], 4, Some(&filter))
            .await?;

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.content, "table");
        Ok(())
    }

    #[tokio::test]
    async fn deleting_missing_collection_is_ok() -> Result<(), BackendError> {
        let store = InMemoryStore::new();
        store.delete_collection("never-created").await?;
        assert!(!store.collection_exists("never-created").await?);
        Ok(())
    }

    #[tokio::test]
    async fn insert_into_missing_collection_fails() {
        let store = InMemoryStore::new();
        let result = store
            .insert("nope", &[entry("a", "x", 1, ChunkOrigin::Text { chunk_index: 0 }, vec![1.0])])
            .await;
        assert!(matches!(result, Err(BackendError::Request(_))));
    }
}
