use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use pdf_rag_core::{
    citations, BlockKind, ChatTurn, ChromaStore, Embedder, InMemoryStore, LanguageModel,
    MetadataFilter, OllamaChatModel, OllamaEmbedder, QdrantStore, RagConfig, RagError, Session,
    VectorStore,
};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Vector store backend.
    #[arg(long, global = true, env = "PDF_RAG_STORE", value_enum, default_value_t = StoreBackend::Chroma)]
    store: StoreBackend,

    // Settings below override `RagConfig::from_env`, which reads
    // `PDF_RAG_*` variables on top of the built-in defaults.
    /// Ollama base URL used for embeddings and answers [env: PDF_RAG_OLLAMA_BASE_URL].
    #[arg(long, global = true)]
    ollama_url: Option<String>,

    /// Chat model name [env: PDF_RAG_CHAT_MODEL].
    #[arg(long, global = true)]
    chat_model: Option<String>,

    /// Embedding model name [env: PDF_RAG_EMBEDDING_MODEL].
    #[arg(long, global = true)]
    embedding_model: Option<String>,

    /// Vector store host [env: PDF_RAG_STORE_HOST].
    #[arg(long, global = true)]
    store_host: Option<String>,

    /// Vector store port [env: PDF_RAG_STORE_PORT].
    #[arg(long, global = true)]
    store_port: Option<u16>,

    /// Collection holding the processed document [env: PDF_RAG_COLLECTION_NAME].
    #[arg(long, global = true)]
    collection: Option<String>,

    /// Maximum characters per text chunk [env: PDF_RAG_CHUNK_SIZE].
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    /// Characters shared by consecutive text chunks [env: PDF_RAG_CHUNK_OVERLAP].
    #[arg(long, global = true)]
    chunk_overlap: Option<usize>,

    /// Number of chunks retrieved per question [env: PDF_RAG_TOP_K].
    #[arg(long, global = true)]
    top_k: Option<usize>,

    /// Sampling temperature for the chat model [env: PDF_RAG_TEMPERATURE].
    #[arg(long, global = true)]
    temperature: Option<f32>,

    /// Directory uploaded PDFs are copied into [env: PDF_RAG_UPLOAD_DIR].
    #[arg(long, global = true)]
    upload_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreBackend {
    Chroma,
    Qdrant,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceType {
    Text,
    Table,
}

impl From<SourceType> for BlockKind {
    fn from(value: SourceType) -> Self {
        match value {
            SourceType::Text => BlockKind::Text,
            SourceType::Table => BlockKind::Table,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Upload a PDF and index its text and tables, replacing the collection.
    Process {
        /// PDF file to process.
        #[arg(long)]
        pdf: PathBuf,
    },
    /// Ask one question about the processed PDF.
    Ask {
        /// Question text.
        #[arg(long)]
        question: String,
        /// Only retrieve chunks of this type.
        #[arg(long = "type", value_enum)]
        source_type: Option<SourceType>,
        /// Only retrieve chunks from this page.
        #[arg(long)]
        page: Option<u32>,
        /// Print the chunks the answer was grounded on.
        #[arg(long, default_value_t = false)]
        show_sources: bool,
    },
    /// Interactive session: upload, process and ask in one process.
    Chat {
        /// PDF to upload and process before the first prompt.
        #[arg(long)]
        pdf: Option<PathBuf>,
    },
    /// List collections in the vector store.
    Collections,
    /// Delete the configured collection.
    Delete,
}

impl Cli {
    /// Applies the flags that were given on top of `base`.
    fn overlay(&self, mut base: RagConfig) -> RagConfig {
        if let Some(value) = &self.ollama_url {
            base.ollama_base_url = value.clone();
        }
        if let Some(value) = &self.chat_model {
            base.chat_model = value.clone();
        }
        if let Some(value) = &self.embedding_model {
            base.embedding_model = value.clone();
        }
        if let Some(value) = &self.store_host {
            base.store_host = value.clone();
        }
        if let Some(value) = self.store_port {
            base.store_port = value;
        }
        if let Some(value) = &self.collection {
            base.collection_name = value.clone();
        }
        if let Some(value) = self.chunk_size {
            base.chunk_size = value;
        }
        if let Some(value) = self.chunk_overlap {
            base.chunk_overlap = value;
        }
        if let Some(value) = self.top_k {
            base.top_k = value;
        }
        if let Some(value) = self.temperature {
            base.temperature = value;
        }
        if let Some(value) = &self.upload_dir {
            base.upload_dir = value.clone();
        }
        base
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.overlay(RagConfig::from_env().context("invalid PDF_RAG_* environment")?);
    config.validate().context("invalid configuration")?;

    info!(
        version = app_version,
        store = ?cli.store,
        collection = %config.collection_name,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-rag boot"
    );

    match cli.store {
        StoreBackend::Chroma => {
            let store = ChromaStore::new(config.store_url()?.as_str());
            run(cli.command, config, store).await
        }
        StoreBackend::Qdrant => {
            let store = QdrantStore::new(config.store_url()?.as_str());
            run(cli.command, config, store).await
        }
        StoreBackend::Memory => {
            warn!("memory store keeps nothing between runs");
            run(cli.command, config, InMemoryStore::new()).await
        }
    }
}

async fn run<S>(command: Command, config: RagConfig, store: S) -> anyhow::Result<()>
where
    S: VectorStore + Send + Sync,
{
    let ollama_url = config.ollama_url()?;
    let embedder = OllamaEmbedder::new(&ollama_url, config.embedding_model.clone())?;
    let model = OllamaChatModel::new(&ollama_url, config.chat_model.clone(), config.temperature)?;
    let mut session = Session::new(&config, embedder, store, model)?;

    match command {
        Command::Process { pdf } => {
            process(&mut session, pdf).await?;
        }
        Command::Ask {
            question,
            source_type,
            page,
            show_sources,
        } => {
            let pipeline = session.pipeline();
            if !pipeline.is_indexed().await? {
                return Err(RagError::NotReady.into());
            }

            let filter = MetadataFilter {
                kind: source_type.map(BlockKind::from),
                page,
            };
            let answer = pipeline.ask(&question, Some(&filter)).await?;

            println!("{}", answer.text);
            if show_sources {
                let turn = ChatTurn {
                    question,
                    answer: answer.text,
                    sources: answer.sources.into_iter().map(|hit| hit.chunk).collect(),
                    asked_at: Utc::now(),
                };
                println!();
                print_sources(&turn);
            }
        }
        Command::Chat { pdf } => {
            if let Some(pdf) = pdf {
                if let Err(error) = process(&mut session, pdf).await {
                    println!("Error processing PDF: {error}");
                }
            }
            chat(&mut session, &config).await?;
        }
        Command::Collections => {
            let collections = session.pipeline().list_collections().await?;
            if collections.is_empty() {
                println!("no collections");
            }
            for name in collections {
                println!("{name}");
            }
        }
        Command::Delete => {
            session.pipeline().delete_collection().await?;
            println!("deleted collection {}", config.collection_name);
        }
    }

    Ok(())
}

async fn process<E, S, L>(session: &mut Session<E, S, L>, pdf: PathBuf) -> anyhow::Result<()>
where
    E: Embedder + Send + Sync,
    S: VectorStore + Send + Sync,
    L: LanguageModel + Send + Sync,
{
    let stored = session.upload(&pdf).await?;
    println!("Uploaded: {}", stored.display());

    let report = session.process().await?;
    println!(
        "Processed {} chunks! ({} text blocks, {} tables)",
        report.handle.chunk_count, report.text_blocks, report.table_blocks
    );
    Ok(())
}

async fn chat<E, S, L>(session: &mut Session<E, S, L>, config: &RagConfig) -> anyhow::Result<()>
where
    E: Embedder + Send + Sync,
    S: VectorStore + Send + Sync,
    L: LanguageModel + Send + Sync,
{
    println!("PDF RAG System");
    println!("Commands: /upload <path>, /process, /clear, /history, /status, /config, /quit");
    println!("{}", session.status());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, argument) = match line.split_once(char::is_whitespace) {
            Some((command, argument)) => (command, argument.trim()),
            None => (line, ""),
        };

        match command {
            "/quit" | "/exit" => break,
            "/upload" => {
                if argument.is_empty() {
                    println!("usage: /upload <path>");
                    continue;
                }
                match session.upload(&PathBuf::from(argument)).await {
                    Ok(stored) => println!("Uploaded: {}", stored.display()),
                    Err(error) => println!("Error: {error}"),
                }
            }
            "/process" => match session.process().await {
                Ok(report) => println!("Processed {} chunks!", report.handle.chunk_count),
                Err(error) => println!("Error processing PDF: {error}"),
            },
            "/clear" => {
                session.clear_history();
                println!("history cleared");
            }
            "/history" => print_history(session.history()),
            "/status" => println!("{}", session.status()),
            "/config" => print_config(config),
            _ if command.starts_with('/') => println!("unknown command: {command}"),
            _ => match session.ask(line).await {
                Ok(turn) => println!("A: {}", turn.answer),
                Err(error) => println!("Error: {error}"),
            },
        }
    }

    Ok(())
}

fn print_config(config: &RagConfig) {
    println!("Configurations");
    println!("Model: {}", config.chat_model);
    println!("Embeddings: {}", config.embedding_model);
    println!("Chunks: {} (overlap {})", config.chunk_size, config.chunk_overlap);
    println!("Top K: {}", config.top_k);
}

fn print_history(history: &[ChatTurn]) {
    if history.is_empty() {
        println!("no questions asked yet");
        return;
    }

    for (index, turn) in history.iter().enumerate().rev() {
        println!("Q{}: {}", index + 1, turn.question);
        println!("A: {}", turn.answer);
        print_sources(turn);
        println!("---");
    }
}

fn print_sources(turn: &ChatTurn) {
    println!("View Sources");
    for citation in citations(turn) {
        println!("{citation}");
        println!();
    }
}
