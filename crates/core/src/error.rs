use thiserror::Error;

/// Failure talking to a remote service (vector store, embedding or chat model).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),
}

#[derive(Debug, Error)]
pub enum IndexingError {
    #[error("nothing to index: the document produced no chunks")]
    EmptyDocument,

    #[error("embedding chunk {position} failed: {source}")]
    Embedding {
        position: usize,
        #[source]
        source: BackendError,
    },

    #[error("embedding dimension {found} does not match {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("vector store write failed: {0}")]
    Store(#[source] BackendError),
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("embedding the query failed: {0}")]
    Embedding(#[source] BackendError),

    #[error("vector store unreachable: {0}")]
    Store(#[source] BackendError),
}

#[derive(Debug, Error)]
pub enum AnswerGenerationError {
    #[error("language model call failed: {0}")]
    Model(#[from] BackendError),
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("invalid url for {key}: {source}")]
    Url {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },
}

/// Everything the session boundary can report back to the user.
#[derive(Debug, Error)]
pub enum RagError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Indexing(#[from] IndexingError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    AnswerGeneration(#[from] AnswerGenerationError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("please upload and process a PDF first")]
    NotReady,

    #[error("no PDF has been uploaded yet")]
    NoUpload,

    #[error("only PDF files are accepted: {0}")]
    NotAPdf(String),

    #[error("storing upload failed: {0}")]
    Upload(#[source] std::io::Error),

    #[error("question is empty")]
    EmptyQuestion,
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;
