use crate::error::ConfigurationError;
use crate::models::{Chunk, ChunkMetadata, ChunkOrigin, ContentBlock, ContentKind};
use std::collections::VecDeque;

/// Separators tried in order: paragraph, line, word, then any character.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ConfigurationError> {
        if chunk_size == 0 {
            return Err(ConfigurationError::Invalid {
                key: "chunk_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if chunk_overlap >= chunk_size {
            return Err(ConfigurationError::Invalid {
                key: "chunk_overlap",
                reason: format!("overlap {chunk_overlap} must be smaller than chunk size {chunk_size}"),
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::config::DEFAULT_CHUNK_SIZE,
            chunk_overlap: crate::config::DEFAULT_CHUNK_OVERLAP,
        }
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Boundary-aware splitter producing pieces of at most `chunk_size` chars,
/// consecutive pieces sharing up to `chunk_overlap` chars.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    config: ChunkingConfig,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    pub fn new(config: ChunkingConfig) -> Self {
        Self {
            config,
            separators: DEFAULT_SEPARATORS.iter().map(|sep| sep.to_string()).collect(),
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        // First separator present in the text wins; "" always matches.
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (position, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate.as_str();
                remaining = &separators[position + 1..];
                break;
            }
        }

        let mut finished = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.config.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                finished.extend(self.merge(&pending));
                pending.clear();
            }
            if remaining.is_empty() {
                finished.push(piece.to_string());
            } else {
                finished.extend(self.split_with(piece, remaining));
            }
        }

        if !pending.is_empty() {
            finished.extend(self.merge(&pending));
        }

        finished
    }

    /// Packs small pieces into windows, carrying the tail of each emitted
    /// window forward as overlap.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let ChunkingConfig {
            chunk_size,
            chunk_overlap,
        } = self.config;

        let mut merged = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > chunk_size && !window.is_empty() {
                push_joined(&mut merged, &window);
                while total > chunk_overlap || (total + len > chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(dropped) => total -= char_len(dropped),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }

        push_joined(&mut merged, &window);
        merged
    }
}

fn push_joined(target: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        target.push(trimmed.to_string());
    }
}

/// Splits on `separator`, attaching each separator to the start of the piece
/// that follows it. An empty separator splits into single chars.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(start, ch)| &text[start..start + ch.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    let mut search_from = 0;
    while let Some(found) = text[search_from..].find(separator) {
        let boundary = search_from + found;
        if boundary > start {
            pieces.push(&text[start..boundary]);
        }
        start = boundary;
        search_from = boundary + separator.len();
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces.retain(|piece| !piece.is_empty());
    pieces
}

/// Turns content blocks into chunks: text blocks are split, tables kept whole.
#[derive(Debug, Clone)]
pub struct Chunker {
    splitter: RecursiveSplitter,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self {
            splitter: RecursiveSplitter::new(config),
        }
    }

    pub fn chunk(&self, blocks: &[ContentBlock]) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for block in blocks {
            match block.kind {
                ContentKind::Text => {
                    let pieces = self.splitter.split(&block.content);
                    chunks.extend(pieces.into_iter().enumerate().map(|(chunk_index, content)| {
                        Chunk {
                            content,
                            metadata: ChunkMetadata {
                                page: block.page,
                                origin: ChunkOrigin::Text { chunk_index },
                            },
                        }
                    }));
                }
                ContentKind::Table { table_index } => chunks.push(Chunk {
                    content: block.content.clone(),
                    metadata: ChunkMetadata {
                        page: block.page,
                        origin: ChunkOrigin::Table { table_index },
                    },
                }),
            }
        }

        chunks
    }
}
