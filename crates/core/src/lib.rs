pub mod answer;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod indexer;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod retriever;
pub mod session;
pub mod store;
pub mod stores;
pub mod tables;

pub use answer::{build_prompt, format_context, AnswerAssembler};
pub use chunking::{Chunker, ChunkingConfig, RecursiveSplitter, DEFAULT_SEPARATORS};
pub use config::{RagConfig, TOP_K_RESULTS};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{
    AnswerGenerationError, BackendError, ConfigurationError, ExtractionError, IndexingError,
    RagError, RetrievalError,
};
pub use extractor::{LopdfExtractor, PdfExtractor};
pub use indexer::Indexer;
pub use llm::{LanguageModel, OllamaChatModel};
pub use models::{
    BlockKind, ChatTurn, Chunk, ChunkMetadata, ChunkOrigin, CollectionHandle, ContentBlock,
    ContentKind, EmbeddedChunk, MetadataFilter, ScoredChunk,
};
pub use pipeline::{Answer, ProcessReport, RagPipeline};
pub use retriever::Retriever;
pub use session::{
    citations, preview, ActiveDocument, Session, SessionStatus, SourceCitation,
    SOURCE_PREVIEW_CHARS,
};
pub use store::VectorStore;
pub use stores::{ChromaStore, InMemoryStore, QdrantStore};
