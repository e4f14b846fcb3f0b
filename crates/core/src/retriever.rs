use crate::embeddings::Embedder;
use crate::error::RetrievalError;
use crate::models::{Chunk, MetadataFilter, ScoredChunk};
use crate::store::VectorStore;
use tracing::{debug, info};

pub struct Retriever<'a, E, S> {
    embedder: &'a E,
    store: &'a S,
}

impl<'a, E, S> Retriever<'a, E, S>
where
    E: Embedder + Sync,
    S: VectorStore + Sync,
{
    pub fn new(embedder: &'a E, store: &'a S) -> Self {
        Self { embedder, store }
    }

    /// Top `k` chunks for `query`, most similar first.
    pub async fn retrieve(
        &self,
        collection_name: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<Chunk>, RetrievalError> {
        let scored = self.search(collection_name, query, k, None).await?;
        Ok(scored.into_iter().map(|hit| hit.chunk).collect())
    }

    /// Like [`Retriever::retrieve`] but keeps scores and accepts a metadata
    /// filter. A collection that does not exist yields no hits.
    pub async fn search(
        &self,
        collection_name: &str,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        if query.trim().is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let exists = self
            .store
            .collection_exists(collection_name)
            .await
            .map_err(RetrievalError::Store)?;
        if !exists {
            debug!(collection = collection_name, "collection absent, nothing to retrieve");
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(RetrievalError::Embedding)?;

        let filter = filter.filter(|filter| !filter.is_empty());
        let mut hits = self
            .store
            .similarity_search(collection_name, &query_embedding, k, filter)
            .await
            .map_err(RetrievalError::Store)?;

        hits.sort_by(|left, right| right.score.total_cmp(&left.score));
        hits.truncate(k);

        info!(
            backend = self.store.backend(),
            collection = collection_name,
            hits = hits.len(),
            top_score = hits.first().map(|hit| hit.score),
            "retrieved chunks"
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::indexer::Indexer;
    use crate::models::{BlockKind, ChunkMetadata, ChunkOrigin};
    use crate::stores::InMemoryStore;

    fn chunk(content: &str, page: u32, origin: ChunkOrigin) -> Chunk {
        Chunk {
            content: content.to_string(),
            metadata: ChunkMetadata { page, origin },
        }
    }

    #[tokio::test]
    async fn missing_collection_returns_empty() -> Result<(), RetrievalError> {
        let embedder = CharacterNgramEmbedder::default();
        let store = InMemoryStore::new();

        let hits = Retriever::new(&embedder, &store)
            .retrieve("does-not-exist", "anything", 4)
            .await?;

        assert!(hits.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let embedder = CharacterNgramEmbedder::default();
        let store = InMemoryStore::new();

        let result = Retriever::new(&embedder, &store).retrieve("docs", "   ", 4).await;

        assert!(matches!(result, Err(RetrievalError::EmptyQuery)));
    }

    #[tokio::test]
    async fn sky_question_finds_the_sky_chunk() -> Result<(), Box<dyn std::error::Error>> {
        let embedder = CharacterNgramEmbedder::default();
        let store = InMemoryStore::new();
        Indexer::new(&embedder, &store)
            .index(
                "docs",
                &[chunk("The sky is blue.", 1, ChunkOrigin::Text { chunk_index: 0 })],
            )
            .await?;

        let hits = Retriever::new(&embedder, &store)
            .retrieve("docs", "What color is the sky?", 4)
            .await?;

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "The sky is blue.");
        assert_eq!(hits[0].page(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn results_are_bounded_ranked_and_filtered() -> Result<(), Box<dyn std::error::Error>> {
        let embedder = CharacterNgramEmbedder::default();
        let store = InMemoryStore::new();
        Indexer::new(&embedder, &store)
            .index(
                "docs",
                &[
                    chunk("Revenue by region for the year", 1, ChunkOrigin::Text { chunk_index: 0 }),
                    chunk("Staff headcount and hiring", 1, ChunkOrigin::Text { chunk_index: 1 }),
                    chunk(
                        "Table with columns: Region, Revenue\n\nNorth | 10\nSouth | 12\n",
                        2,
                        ChunkOrigin::Table { table_index: 1 },
                    ),
                ],
            )
            .await?;
        let retriever = Retriever::new(&embedder, &store);

        let top_two = retriever.search("docs", "revenue by region", 2, None).await?;
        assert_eq!(top_two.len(), 2);
        assert!(top_two[0].score >= top_two[1].score);

        let tables_only = MetadataFilter {
            kind: Some(BlockKind::Table),
            page: None,
        };
        let tables = retriever
            .search("docs", "revenue by region", 4, Some(&tables_only))
            .await?;
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].chunk.page(), 2);
        Ok(())
    }
}
