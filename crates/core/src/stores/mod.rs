pub mod chroma;
pub mod memory;
pub mod qdrant;

pub use chroma::ChromaStore;
pub use memory::InMemoryStore;
pub use qdrant::QdrantStore;
