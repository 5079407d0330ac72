use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use parley::config::ParleyConfig;
use parley::db;
use parley::embedding::{create_provider, EmbeddingProvider};
use parley::gateway::ModelGateway;
use parley::index::search::SqliteDocumentIndex;
use parley::index::DocumentIndex;
use parley::langfuse::{LangfuseClient, NoPromptSource, PromptSource};
use parley::session::menu::{IndexOpener, Menu};
use parley::session::Console;
use parley::trace::{LogSink, TraceRecorder, TraceSink};

#[derive(Parser)]
#[command(name = "parley", version, about = "Terminal assistant for a local Ollama model")]
struct Cli {
    /// Config file (default: ~/.parley/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Open the interactive assistant menu (default)
    Chat,
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Build and inspect the document index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
    /// Check the model server, Langfuse keys and the document index
    Doctor,
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download all-MiniLM-L6-v2 into the embedding cache dir
    Download,
}

#[derive(Subcommand)]
enum IndexAction {
    /// Add text files to a collection, creating it if needed
    Add {
        #[arg(long, short)]
        collection: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List collections and their sizes
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ParleyConfig::load_from(path)?,
        None => ParleyConfig::load()?,
    };

    // stdout is the conversation; logs go to stderr.
    let filter = EnvFilter::try_new(&config.general.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => chat(&config).await?,
        Command::Model { action } => match action {
            ModelAction::Download => parley::cli::model_download(&config.embedding).await?,
        },
        Command::Index { action } => match action {
            IndexAction::Add { collection, files } => {
                parley::cli::index::add(&config, &collection, &files)?
            }
            IndexAction::List => parley::cli::index::list(&config)?,
        },
        Command::Doctor => parley::cli::doctor::doctor(&config).await?,
    }

    Ok(())
}

/// Wire the clients, run the menu, and flush traces on the way out whatever
/// the menu returned.
async fn chat(config: &ParleyConfig) -> Result<()> {
    let (sink, prompts): (Arc<dyn TraceSink>, Arc<dyn PromptSource>) =
        match LangfuseClient::from_config(&config.observability)? {
            Some(client) => {
                tracing::info!(host = client.host(), "tracing to Langfuse");
                let client = Arc::new(client);
                let sink: Arc<dyn TraceSink> = client.clone();
                let prompts: Arc<dyn PromptSource> = client;
                (sink, prompts)
            }
            None => {
                tracing::warn!("Langfuse keys not set; traces go to the log and persona chat is unavailable");
                let sink: Arc<dyn TraceSink> = Arc::new(LogSink);
                let prompts: Arc<dyn PromptSource> = Arc::new(NoPromptSource);
                (sink, prompts)
            }
        };

    let recorder = TraceRecorder::new(sink);
    recorder.flush().await;

    let gateway = ModelGateway::new(&config.model, recorder.clone())?;

    let index_path = config.resolved_index_path();
    let embedder: RefCell<Option<Arc<dyn EmbeddingProvider>>> = RefCell::new(None);
    let open_index: IndexOpener = Box::new(|name: &str| {
        let conn = db::open_index_read_only(&index_path)?;
        let cached = embedder.borrow().clone();
        let provider = match cached {
            Some(provider) => provider,
            None => {
                let provider: Arc<dyn EmbeddingProvider> =
                    Arc::from(create_provider(&config.embedding)?);
                *embedder.borrow_mut() = Some(Arc::clone(&provider));
                provider
            }
        };
        let index = SqliteDocumentIndex::open(conn, name, provider)?;
        Ok(Box::new(index) as Box<dyn DocumentIndex + Send + Sync>)
    });

    let menu = Menu::new(&gateway, prompts, config, open_index);
    let stdin = std::io::stdin();
    let mut console = Console::new(stdin.lock(), std::io::stdout());
    let outcome = menu.run(&mut console).await;

    recorder.flush().await;
    if let Err(e) = &outcome {
        tracing::error!(error = %e, "session ended with an error");
    }
    outcome
}
