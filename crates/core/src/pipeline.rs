use crate::answer::AnswerAssembler;
use crate::chunking::{Chunker, ChunkingConfig};
use crate::config::RagConfig;
use crate::embeddings::Embedder;
use crate::error::{IndexingError, RagError, RetrievalError};
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::indexer::Indexer;
use crate::llm::LanguageModel;
use crate::models::{BlockKind, CollectionHandle, MetadataFilter, ScoredChunk};
use crate::retriever::Retriever;
use crate::store::VectorStore;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub handle: CollectionHandle,
    pub text_blocks: usize,
    pub table_blocks: usize,
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<ScoredChunk>,
}

/// Extraction, chunking, indexing, retrieval and answering wired together
/// for one collection.
pub struct RagPipeline<E, S, L> {
    embedder: E,
    store: S,
    model: L,
    extractor: Box<dyn PdfExtractor + Send + Sync>,
    chunker: Chunker,
    collection_name: String,
    top_k: usize,
}

impl<E, S, L> RagPipeline<E, S, L>
where
    E: Embedder + Send + Sync,
    S: VectorStore + Send + Sync,
    L: LanguageModel + Send + Sync,
{
    pub fn new(config: &RagConfig, embedder: E, store: S, model: L) -> Result<Self, RagError> {
        config.validate()?;
        let chunking = ChunkingConfig::new(config.chunk_size, config.chunk_overlap)?;

        Ok(Self {
            embedder,
            store,
            model,
            extractor: Box::new(LopdfExtractor),
            chunker: Chunker::new(chunking),
            collection_name: config.collection_name.clone(),
            top_k: config.top_k,
        })
    }

    pub fn with_extractor(mut self, extractor: impl PdfExtractor + Send + Sync + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Extracts, chunks and indexes a PDF, replacing the collection.
    pub async fn process(&self, pdf_path: &Path) -> Result<ProcessReport, RagError> {
        let blocks = self.extractor.extract(pdf_path)?;
        let table_blocks = blocks
            .iter()
            .filter(|block| block.block_kind() == BlockKind::Table)
            .count();
        let text_blocks = blocks.len() - table_blocks;

        let chunks = self.chunker.chunk(&blocks);
        let handle = Indexer::new(&self.embedder, &self.store)
            .index(&self.collection_name, &chunks)
            .await?;

        info!(
            path = %pdf_path.display(),
            text_blocks,
            table_blocks,
            chunks = handle.chunk_count,
            "pdf processed"
        );

        Ok(ProcessReport {
            handle,
            text_blocks,
            table_blocks,
        })
    }

    /// Retrieves the configured top-K chunks and asks the model once.
    pub async fn ask(
        &self,
        question: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<Answer, RagError> {
        let sources = Retriever::new(&self.embedder, &self.store)
            .search(&self.collection_name, question, self.top_k, filter)
            .await?;

        let chunks: Vec<_> = sources.iter().map(|hit| hit.chunk.clone()).collect();
        let text = AnswerAssembler::new(&self.model)
            .answer(question, &chunks)
            .await?;

        Ok(Answer { text, sources })
    }

    /// Whether the configured collection exists in the store.
    pub async fn is_indexed(&self) -> Result<bool, RagError> {
        self.store
            .collection_exists(&self.collection_name)
            .await
            .map_err(|error| RagError::Retrieval(RetrievalError::Store(error)))
    }

    pub async fn list_collections(&self) -> Result<Vec<String>, RagError> {
        self.store
            .list_collections()
            .await
            .map_err(|error| RagError::Retrieval(RetrievalError::Store(error)))
    }

    /// Deletes the configured collection; absent collections are fine.
    pub async fn delete_collection(&self) -> Result<(), RagError> {
        self.store
            .delete_collection(&self.collection_name)
            .await
            .map_err(|error| RagError::Indexing(IndexingError::Store(error)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::{BackendError, ExtractionError};
    use crate::models::ContentBlock;
    use crate::stores::InMemoryStore;
    use async_trait::async_trait;

    struct FixedExtractor(Vec<ContentBlock>);

    impl PdfExtractor for FixedExtractor {
        fn extract(&self, _path: &Path) -> Result<Vec<ContentBlock>, ExtractionError> {
            Ok(self.0.clone())
        }
    }

    struct EchoModel;

    #[async_trait]
    impl LanguageModel for EchoModel {
        async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
            Ok(format!("prompt had {} chars", prompt.len()))
        }
    }

    fn pipeline(blocks: Vec<ContentBlock>) -> Result<RagPipeline<CharacterNgramEmbedder, InMemoryStore, EchoModel>, RagError> {
        let config = RagConfig {
            chunk_size: 1_000,
            chunk_overlap: 200,
            ..RagConfig::default()
        };
        Ok(RagPipeline::new(&config, CharacterNgramEmbedder::default(), InMemoryStore::new(), EchoModel)?
            .with_extractor(FixedExtractor(blocks)))
    }

    #[test]
    fn invalid_config_is_a_configuration_error() {
        let config = RagConfig {
            chunk_overlap: 2_000,
            ..RagConfig::default()
        };
        let result = RagPipeline::new(
            &config,
            CharacterNgramEmbedder::default(),
            InMemoryStore::new(),
            EchoModel,
        );
        assert!(matches!(result, Err(RagError::Configuration(_))));
    }

    #[tokio::test]
    async fn process_counts_blocks_and_indexes_chunks() -> Result<(), RagError> {
        let pipeline = pipeline(vec![
            ContentBlock::text(1, "The sky is blue."),
            ContentBlock::table(1, 1, "Table with columns: Name, Score\n\nAlice | 90\nBob | 85\n"),
        ])?;

        let report = pipeline.process(Path::new("ignored.pdf")).await?;

        assert_eq!(report.text_blocks, 1);
        assert_eq!(report.table_blocks, 1);
        assert_eq!(report.handle.chunk_count, 2);
        assert_eq!(report.handle.name, pipeline.collection_name());
        assert!(pipeline.is_indexed().await?);
        Ok(())
    }

    #[tokio::test]
    async fn ask_returns_model_text_and_sources() -> Result<(), RagError> {
        let pipeline = pipeline(vec![ContentBlock::text(1, "The sky is blue.")])?;
        pipeline.process(Path::new("ignored.pdf")).await?;

        let answer = pipeline.ask("What color is the sky?", None).await?;

        assert!(answer.text.starts_with("prompt had "));
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].chunk.content, "The sky is blue.");
        Ok(())
    }

    #[tokio::test]
    async fn document_without_content_fails_to_index() -> Result<(), RagError> {
        let pipeline = pipeline(Vec::new())?;

        let result = pipeline.process(Path::new("ignored.pdf")).await;

        assert!(matches!(
            result,
            Err(RagError::Indexing(IndexingError::EmptyDocument))
        ));
        assert!(!pipeline.is_indexed().await?);
        Ok(())
    }

    #[tokio::test]
    async fn delete_then_list_shows_no_collection() -> Result<(), RagError> {
        let pipeline = pipeline(vec![ContentBlock::text(1, "content")])?;
        pipeline.process(Path::new("ignored.pdf")).await?;
        assert_eq!(pipeline.list_collections().await?, vec![pipeline.collection_name().to_string()]);

        pipeline.delete_collection().await?;
        pipeline.delete_collection().await?;

        assert!(pipeline.list_collections().await?.is_empty());
        Ok(())
    }
}
