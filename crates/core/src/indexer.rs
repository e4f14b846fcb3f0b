use crate::embeddings::Embedder;
use crate::error::IndexingError;
use crate::models::{Chunk, CollectionHandle, EmbeddedChunk};
use crate::store::VectorStore;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

const INSERT_BATCH: usize = 256;

/// Writes chunks into a named collection, replacing whatever it held before.
pub struct Indexer<'a, E, S> {
    embedder: &'a E,
    store: &'a S,
}

impl<'a, E, S> Indexer<'a, E, S>
where
    E: Embedder + Sync,
    S: VectorStore + Sync,
{
    pub fn new(embedder: &'a E, store: &'a S) -> Self {
        Self { embedder, store }
    }

    /// Embeds every chunk, then drops and recreates the collection and
    /// inserts them.
    ///
    /// Embedding happens before the store is touched, so an embedding failure
    /// leaves the previous collection as it was. A store failure after the
    /// delete can leave the collection missing or partially written; callers
    /// must treat the collection as not ready in that case.
    pub async fn index(
        &self,
        collection_name: &str,
        chunks: &[Chunk],
    ) -> Result<CollectionHandle, IndexingError> {
        if chunks.is_empty() {
            return Err(IndexingError::EmptyDocument);
        }

        let mut embedded = Vec::with_capacity(chunks.len());
        let mut dimensions: Option<usize> = None;

        for (position, chunk) in chunks.iter().enumerate() {
            let embedding = self
                .embedder
                .embed(&chunk.content)
                .await
                .map_err(|source| IndexingError::Embedding { position, source })?;

            match dimensions {
                None => dimensions = Some(embedding.len()),
                Some(expected) if expected != embedding.len() => {
                    return Err(IndexingError::DimensionMismatch {
                        expected,
                        found: embedding.len(),
                    });
                }
                Some(_) => {}
            }

            embedded.push(EmbeddedChunk {
                id: make_chunk_id(collection_name, position, &chunk.content),
                chunk: chunk.clone(),
                embedding,
            });
        }
        let dimensions = dimensions.unwrap_or_default();

        if let Err(error) = self.store.delete_collection(collection_name).await {
            warn!(
                backend = self.store.backend(),
                collection = collection_name,
                error = %error,
                "ignoring failed delete of previous collection"
            );
        }

        self.store
            .create_collection(collection_name, dimensions)
            .await
            .map_err(IndexingError::Store)?;

        for batch in embedded.chunks(INSERT_BATCH) {
            self.store
                .insert(collection_name, batch)
                .await
                .map_err(IndexingError::Store)?;
        }

        info!(
            backend = self.store.backend(),
            collection = collection_name,
            chunk_count = embedded.len(),
            dimensions,
            "collection indexed"
        );

        Ok(CollectionHandle {
            name: collection_name.to_string(),
            chunk_count: embedded.len(),
            dimensions,
            indexed_at: Utc::now(),
        })
    }
}

/// Stable id for a chunk, shaped as a UUID so every backend accepts it.
fn make_chunk_id(collection_name: &str, position: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(collection_name.as_bytes());
    hasher.update((position as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}
