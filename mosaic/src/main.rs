use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mosaic::{
    client_id, Backends, Modality, MultiModalRequest, PipelineConfig, ServiceContext,
    DEFAULT_SEARCH_LIMIT,
};

#[derive(Parser)]
#[command(name = "mosaic")]
#[command(about = "Multi-modal retrieval-augmented generation", long_about = None)]
struct Cli {
    /// Use the in-memory index and stub models regardless of the environment
    #[arg(long)]
    stub: bool,

    /// API key identifying this client for rate limiting
    #[arg(long, env = "MOSAIC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question from the knowledge base
    Ask {
        query: String,

        /// Only use documents owned by this user
        #[arg(short, long)]
        owner: Option<String>,
    },

    /// Answer a question with attached media
    AskMedia {
        query: String,

        #[arg(long)]
        image: Option<PathBuf>,

        #[arg(long)]
        audio: Option<PathBuf>,

        #[arg(long)]
        video: Option<PathBuf>,

        #[arg(short, long)]
        owner: Option<String>,
    },

    /// Ingest a file into the knowledge base and print the finished task
    Ingest {
        path: PathBuf,

        #[arg(short, long, value_enum, default_value = "text")]
        kind: MediaKind,

        #[arg(short, long, default_value = "cli")]
        owner: String,
    },

    /// Find ingested media of one kind by text or by a reference image
    Search {
        /// Text query; omit when searching with --like
        query: Option<String>,

        #[arg(short, long, value_enum, default_value = "image")]
        kind: MediaKind,

        /// Reference image to search by
        #[arg(long, conflicts_with = "query")]
        like: Option<PathBuf>,

        #[arg(short, long)]
        owner: Option<String>,

        #[arg(short, long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },

    /// Summarize a text file
    Summarize {
        path: PathBuf,

        /// Maximum summary length in words
        #[arg(short, long, default_value = "100")]
        max_length: usize,
    },

    /// Classify the sentiment of a text
    Sentiment { text: String },

    /// Print the effective configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum MediaKind {
    Text,
    Image,
    Audio,
    Video,
}

impl MediaKind {
    fn modality(self) -> Modality {
        match self {
            MediaKind::Text => Modality::Text,
            MediaKind::Image => Modality::Image,
            MediaKind::Audio => Modality::Audio,
            MediaKind::Video => Modality::Video,
        }
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env()?;
    if cli.stub {
        let stub = PipelineConfig::in_memory();
        config.backend.vector_index_url = stub.backend.vector_index_url;
        config.backend.use_stub_models = true;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "mosaic=info,mosaic_cache=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    // Config printing skips validation
    if matches!(cli.command, Commands::Config) {
        return print_json(&config.redacted());
    }

    let persistent = Backends::index_is_persistent(&config);
    let mut context = ServiceContext::from_config(config).await?;
    context
        .admission
        .check(&client_id(cli.api_key.as_deref(), None))
        .await?;

    match cli.command {
        Commands::Ask { ref query, ref owner } => {
            let result = context.orchestrator.answer(query, owner.as_deref()).await;
            print_json(&result)?;
        }

        Commands::AskMedia {
            ref query,
            ref image,
            ref audio,
            ref video,
            ref owner,
        } => {
            let mut request = MultiModalRequest::new(query.clone());
            request.owner_id = owner.clone();
            if let Some(path) = image {
                request.image = Some(read_media(path).await?);
            }
            if let Some(path) = audio {
                request.audio = Some(read_media(path).await?);
            }
            if let Some(path) = video {
                request.video = Some(read_media(path).await?);
            }

            let result = context.orchestrator.answer_multi_modal(&request).await;
            print_json(&result)?;
        }

        Commands::Ingest {
            ref path,
            kind,
            ref owner,
        } => {
            let task_id = match kind {
                MediaKind::Text => {
                    let text = tokio::fs::read_to_string(path)
                        .await
                        .with_context(|| format!("Failed to read {:?}", path))?;
                    context.ingestor.dispatch_text(text, owner.clone()).await?
                }
                MediaKind::Image => context.ingestor.dispatch_image(path.clone(), owner.clone()).await?,
                MediaKind::Audio => context.ingestor.dispatch_audio(path.clone(), owner.clone()).await?,
                MediaKind::Video => context.ingestor.dispatch_video(path.clone(), owner.clone()).await?,
            };

            // The task dies with the process, so always see it through
            if let Some(task) = context.tasks.wait(&task_id, Duration::from_millis(200)).await {
                print_json(&task)?;
            }
            if !persistent {
                eprintln!("Note: the in-memory index is discarded on exit. Use VECTOR_INDEX_URL=lancedb://<dir> to keep ingested records.");
            }
        }

        Commands::Search {
            ref query,
            kind,
            ref like,
            ref owner,
            limit,
        } => {
            let owner = owner.as_deref();
            let result = match (query, like) {
                (_, Some(path)) => {
                    if !matches!(kind, MediaKind::Image) {
                        bail!("--like searches images only");
                    }
                    let image = read_media(path).await?;
                    context.search.search_images_by_example(&image, owner, limit).await?
                }
                (Some(query), None) => {
                    context
                        .search
                        .search_text(kind.modality(), query, owner, limit)
                        .await?
                }
                (None, None) => bail!("give a text query or --like <image>"),
            };
            print_json(&result)?;
        }

        Commands::Summarize { ref path, max_length } => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {:?}", path))?;
            let summary = context.text.summarize(&text, max_length).await?;
            println!("{}", summary);
        }

        Commands::Sentiment { ref text } => {
            let sentiment = context.text.sentiment(text).await?;
            print_json(&sentiment)?;
        }

        Commands::Config => {}
    }

    context.shutdown();
    Ok(())
}

async fn read_media(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))
}
