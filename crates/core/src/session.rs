use crate::config::RagConfig;
use crate::embeddings::Embedder;
use crate::error::{ExtractionError, IndexingError, RagError};
use crate::llm::LanguageModel;
use crate::models::{ChatTurn, Chunk, CollectionHandle, MetadataFilter};
use crate::pipeline::{ProcessReport, RagPipeline};
use crate::store::VectorStore;
use chrono::Utc;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Characters of chunk content shown in a citation before it is cut off.
pub const SOURCE_PREVIEW_CHARS: usize = 300;

#[derive(Debug, Clone)]
pub struct ActiveDocument {
    pub file_name: String,
    pub handle: CollectionHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Ready { file_name: String },
    AwaitingDocument,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Ready { file_name } => write!(f, "Ready: {file_name}"),
            SessionStatus::AwaitingDocument => f.write_str("Please upload and process a PDF"),
        }
    }
}

/// One numbered citation under an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCitation {
    pub number: usize,
    pub page: u32,
    pub kind: String,
    pub preview: String,
}

impl SourceCitation {
    pub fn from_chunk(number: usize, chunk: &Chunk) -> Self {
        Self {
            number,
            page: chunk.page(),
            kind: chunk.kind().to_string(),
            preview: preview(&chunk.content, SOURCE_PREVIEW_CHARS),
        }
    }
}

impl fmt::Display for SourceCitation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Source {} (Page {}, Type: {})\n{}",
            self.number, self.page, self.kind, self.preview
        )
    }
}

/// First `limit` characters of `content`, with `...` appended when cut.
pub fn preview(content: &str, limit: usize) -> String {
    match content.char_indices().nth(limit) {
        Some((end, _)) => format!("{}...", &content[..end]),
        None => content.to_string(),
    }
}

pub fn citations(turn: &ChatTurn) -> Vec<SourceCitation> {
    turn.sources
        .iter()
        .enumerate()
        .map(|(index, chunk)| SourceCitation::from_chunk(index + 1, chunk))
        .collect()
}

/// State for one user's interaction: the uploaded file, the processed
/// collection and the chat log. Nothing here is shared between sessions.
pub struct Session<E, S, L> {
    pipeline: RagPipeline<E, S, L>,
    upload_dir: PathBuf,
    uploaded: Option<PathBuf>,
    active: Option<ActiveDocument>,
    history: Vec<ChatTurn>,
}

impl<E, S, L> Session<E, S, L>
where
    E: Embedder + Send + Sync,
    S: VectorStore + Send + Sync,
    L: LanguageModel + Send + Sync,
{
    pub fn new(config: &RagConfig, embedder: E, store: S, model: L) -> Result<Self, RagError> {
        let pipeline = RagPipeline::new(config, embedder, store, model)?;
        Ok(Self::from_pipeline(pipeline, config.upload_dir.clone()))
    }

    pub fn from_pipeline(pipeline: RagPipeline<E, S, L>, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            pipeline,
            upload_dir: upload_dir.into(),
            uploaded: None,
            active: None,
            history: Vec::new(),
        }
    }

    pub fn pipeline(&self) -> &RagPipeline<E, S, L> {
        &self.pipeline
    }

    pub fn uploaded(&self) -> Option<&Path> {
        self.uploaded.as_deref()
    }

    pub fn active_document(&self) -> Option<&ActiveDocument> {
        self.active.as_ref()
    }

    /// Copies a PDF into the upload directory. The previous collection stays
    /// queryable until the new upload is processed.
    pub async fn upload(&mut self, source: &Path) -> Result<PathBuf, RagError> {
        let file_name = file_name_of(source)?;
        ensure_pdf(&file_name)?;

        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(RagError::Upload)?;
        let destination = self.upload_dir.join(&file_name);

        let source_canonical = tokio::fs::canonicalize(source)
            .await
            .map_err(RagError::Upload)?;
        let same_file = tokio::fs::canonicalize(&destination)
            .await
            .map(|existing| existing == source_canonical)
            .unwrap_or(false);
        if !same_file {
            tokio::fs::copy(source, &destination)
                .await
                .map_err(RagError::Upload)?;
        }

        info!(file = %file_name, destination = %destination.display(), "pdf uploaded");
        self.uploaded = Some(destination.clone());
        Ok(destination)
    }

    /// Stores uploaded bytes under the upload directory. Only the final path
    /// component of `file_name` is used.
    pub async fn upload_bytes(&mut self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, RagError> {
        let file_name = file_name_of(Path::new(file_name))?;
        ensure_pdf(&file_name)?;

        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(RagError::Upload)?;
        let destination = self.upload_dir.join(&file_name);
        tokio::fs::write(&destination, bytes)
            .await
            .map_err(RagError::Upload)?;

        info!(file = %file_name, bytes = bytes.len(), "pdf uploaded");
        self.uploaded = Some(destination.clone());
        Ok(destination)
    }

    /// Processes the last upload into the session's collection.
    pub async fn process(&mut self) -> Result<ProcessReport, RagError> {
        let path = self.uploaded.clone().ok_or(RagError::NoUpload)?;
        let file_name = file_name_of(&path)?;

        match self.pipeline.process(&path).await {
            Ok(report) => {
                self.active = Some(ActiveDocument {
                    file_name,
                    handle: report.handle.clone(),
                });
                Ok(report)
            }
            Err(error) => {
                // A store failure after the delete leaves the collection unusable.
                if matches!(error, RagError::Indexing(IndexingError::Store(_))) {
                    warn!(error = %error, "collection left incomplete, marking session not ready");
                    self.active = None;
                }
                Err(error)
            }
        }
    }

    /// Answers a question against the processed document and logs the turn.
    pub async fn ask(&mut self, question: &str) -> Result<&ChatTurn, RagError> {
        self.ask_filtered(question, None).await
    }

    pub async fn ask_filtered(
        &mut self,
        question: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<&ChatTurn, RagError> {
        if self.active.is_none() {
            return Err(RagError::NotReady);
        }
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::EmptyQuestion);
        }

        let answer = self.pipeline.ask(question, filter).await?;
        let position = self.history.len();
        self.history.push(ChatTurn {
            question: question.to_string(),
            answer: answer.text,
            sources: answer.sources.into_iter().map(|hit| hit.chunk).collect(),
            asked_at: Utc::now(),
        });

        Ok(&self.history[position])
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn status(&self) -> SessionStatus {
        match &self.active {
            Some(document) => SessionStatus::Ready {
                file_name: document.file_name.clone(),
            },
            None => SessionStatus::AwaitingDocument,
        }
    }

    /// Ends the session and removes its collection from the store.
    pub async fn discard(self) -> Result<(), RagError> {
        self.pipeline.delete_collection().await
    }
}

fn file_name_of(path: &Path) -> Result<String, RagError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| ExtractionError::MissingFileName(path.display().to_string()).into())
}

fn ensure_pdf(file_name: &str) -> Result<(), RagError> {
    let is_pdf = Path::new(file_name)
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        Ok(())
    } else {
        Err(RagError::NotAPdf(file_name.to_string()))
    }
}
