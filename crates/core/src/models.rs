use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Text,
    Table,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Text => "text",
            BlockKind::Table => "table",
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a content block holds; tables carry their position on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    /// 1-based index of the table within its page.
    Table { table_index: usize },
}

/// Raw extracted content for one page (text) or one detected table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlock {
    pub content: String,
    /// 1-based page number.
    pub page: u32,
    pub kind: ContentKind,
}

impl ContentBlock {
    pub fn text(page: u32, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            page,
            kind: ContentKind::Text,
        }
    }

    pub fn table(page: u32, table_index: usize, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            page,
            kind: ContentKind::Table { table_index },
        }
    }

    pub fn block_kind(&self) -> BlockKind {
        match self.kind {
            ContentKind::Text => BlockKind::Text,
            ContentKind::Table { .. } => BlockKind::Table,
        }
    }

    pub fn table_index(&self) -> Option<usize> {
        match self.kind {
            ContentKind::Text => None,
            ContentKind::Table { table_index } => Some(table_index),
        }
    }
}

/// Position of a chunk inside the block it was cut from.
///
/// Serialized with a `type` tag so the stored metadata reads
/// `{"page": 1, "type": "text", "chunk_index": 0}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChunkOrigin {
    Text { chunk_index: usize },
    Table { table_index: usize },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub page: u32,
    #[serde(flatten)]
    pub origin: ChunkOrigin,
}

impl ChunkMetadata {
    pub fn kind(&self) -> BlockKind {
        match self.origin {
            ChunkOrigin::Text { .. } => BlockKind::Text,
            ChunkOrigin::Table { .. } => BlockKind::Table,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn kind(&self) -> BlockKind {
        self.metadata.kind()
    }

    pub fn page(&self) -> u32 {
        self.metadata.page
    }
}

/// A chunk paired with its embedding, ready to be written to a store.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub id: String,
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Higher is more similar, regardless of the backend's native metric.
    pub score: f32,
}

/// Narrows similarity search to chunks whose metadata match every set field.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MetadataFilter {
    pub kind: Option<BlockKind>,
    pub page: Option<u32>,
}

impl MetadataFilter {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.page.is_none()
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        self.kind.map_or(true, |kind| metadata.kind() == kind)
            && self.page.map_or(true, |page| metadata.page == page)
    }
}

/// Reference to an indexed collection; enough to reopen it for retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionHandle {
    pub name: String,
    pub chunk_count: usize,
    pub dimensions: usize,
    pub indexed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
    pub sources: Vec<Chunk>,
    pub asked_at: DateTime<Utc>,
}
