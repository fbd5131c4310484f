use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

use histner_core::completion::create_clients;
use histner_core::embeddings::backend_from_config;
use histner_core::models::{AnnotatedExample, ExtractedSentence};
use histner_core::{HistnerConfig, Normalizer, Ontology};
use histner_eval::stages::retrieve::ExamplePool;
use histner_eval::{convert, extract_documents, normalize_all, read_jsonl, write_jsonl_atomic, Generator};

#[derive(Debug, Parser)]
#[command(
    name = "histner",
    author,
    version,
    about = "Entity extraction evaluation pipeline for annotated historical texts"
)]
struct Cli {
    /// TOML configuration file (optional, defaults apply without it)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Extract annotated sentences from markdown documents
    Extract {
        #[arg(required = true)]
        documents: Vec<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Normalize raw labels to ontology codes
    Normalize {
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show the pool examples most similar to a sentence, as JSON
    Retrieve {
        /// Normalized example pool (JSONL)
        #[arg(long)]
        pool: PathBuf,

        text: String,

        /// Number of examples (overrides retrieval.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Query every configured model for every input sentence
    Predict {
        /// Normalized example pool (JSONL)
        #[arg(long)]
        pool: PathBuf,

        /// Normalized sentences to annotate (JSONL)
        #[arg(long)]
        queries: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Render a predictions file as an HTML comparison report
    Convert { predictions: PathBuf, output: PathBuf },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match HistnerConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("histner: failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    if let Err(e) = run(cli.command, config).await {
        tracing::error!(error = %e, "Stage failed");
        eprintln!("histner: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: HistnerConfig) -> anyhow::Result<()> {
    match command {
        Commands::Extract { documents, output } => {
            let extracted = extract_documents(&documents, &config.extract);
            write_jsonl_atomic(&output, &extracted.sentences)?;
            tracing::info!(
                documents = documents.len(),
                failed = extracted.failed.len(),
                sentences = extracted.sentences.len(),
                output = %output.display(),
                "Extraction finished"
            );
        }

        Commands::Normalize { input, output } => {
            let normalizer = Normalizer::from_config(&config.ontology, &config.normalizer)?;
            let sentences: Vec<ExtractedSentence> = read_jsonl(&input)?;
            let examples = normalize_all(&sentences, &normalizer);
            write_jsonl_atomic(&output, &examples)?;
        }

        Commands::Retrieve { pool, text, top_k } => {
            let backend = backend_from_config(&config.embedding)
                .context("failed to create embedding backend")?;
            let examples: Vec<AnnotatedExample> = read_jsonl(&pool)?;
            let pool = ExamplePool::build(examples, backend.as_ref()).await;

            let k = top_k.unwrap_or(config.retrieval.top_k);
            let neighbors = pool
                .query(backend.as_ref(), &text, None, k)
                .await
                .context("failed to embed query")?;
            println!("{}", serde_json::to_string_pretty(&neighbors)?);
        }

        Commands::Predict { pool, queries, output } => {
            let normalizer = Normalizer::from_config(&config.ontology, &config.normalizer)?;
            let backend = backend_from_config(&config.embedding)
                .context("failed to create embedding backend")?;
            let models = create_clients(&config.generation).context("failed to create model clients")?;

            let examples: Vec<AnnotatedExample> = read_jsonl(&pool)?;
            let queries: Vec<AnnotatedExample> = read_jsonl(&queries)?;
            let pool = ExamplePool::build(examples, backend.as_ref()).await;
            if pool.is_empty() {
                tracing::warn!("Example pool is empty, prompts will have no examples");
            }

            let generator = Generator::new(&pool, backend.as_ref(), &models, &normalizer)?
                .with_top_k(config.retrieval.top_k)
                .with_instructions(config.generation.instructions.clone())
                .with_max_concurrency(config.generation.max_concurrency);

            let records = generator.run(&queries).await;
            write_jsonl_atomic(&output, &records)?;
        }

        Commands::Convert { predictions, output } => {
            let ontology = Ontology::new(&config.ontology);
            let summary = convert(&predictions, &output, &ontology)?;
            println!(
                "Wrote {} ({} sentences, {} records, {} failed, {} malformed lines)",
                output.display(),
                summary.sentences,
                summary.records,
                summary.failed,
                summary.malformed
            );
        }
    }

    Ok(())
}
