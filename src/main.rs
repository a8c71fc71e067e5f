use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use medrag::cli::{self, EmbedderOpts, EngineOpts, TrainOpts};
use medrag::data::ChunkConfig;
use medrag::training::DevicePreference;

#[derive(Parser)]
#[command(name = "medrag")]
#[command(about = "Retrieval-augmented question answering over medical literature", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tokenize text with the medical vocabulary
    Tokenize {
        /// Text to tokenize
        text: String,

        /// Vocabulary file (one token per line)
        #[arg(long, default_value = "data/vocab.txt")]
        vocab: PathBuf,
    },

    /// Convert raw PDFs into processed text plus metadata
    Process {
        /// Directory of raw PDFs
        #[arg(long, default_value = "data/research_papers/raw")]
        raw: PathBuf,

        /// Output directory for extracted text
        #[arg(long, default_value = "data/research_papers/processed")]
        processed: PathBuf,
    },

    /// Analyze a single PDF (title, DOI references)
    Analyze {
        /// Path to the PDF
        pdf: PathBuf,
    },

    /// Build retrieval indexes from a document directory
    Index {
        /// Input file or directory
        #[arg(short, long, default_value = "data/knowledge_base")]
        input: PathBuf,

        /// Output directory for the indexes
        #[arg(short, long, default_value = "data/index")]
        output: PathBuf,

        /// Embedding model name or path
        #[arg(short, long, default_value = "sentence-transformers/all-MiniLM-L6-v2")]
        model: String,

        /// Embedding backend: bert, hash, or lora
        #[arg(short, long, default_value = "bert")]
        backend: String,

        /// LoRA checkpoint (for --backend lora)
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Chunking strategy: overlapping or sentence
        #[arg(long, default_value = "sentence")]
        chunking: String,

        /// Chunk size in characters
        #[arg(long, default_value = "512")]
        chunk_size: usize,

        /// Chunk overlap in characters
        #[arg(long, default_value = "50")]
        chunk_overlap: usize,

        /// Index type: dense, bm25, or both
        #[arg(long, default_value = "both")]
        index_type: String,

        /// Device: auto, cpu, cuda, or metal
        #[arg(long, default_value = "auto")]
        device: String,
    },

    /// Query the retrieval indexes
    Query {
        /// Query text
        query: String,

        /// Index directory
        #[arg(short, long, default_value = "data/index")]
        index: PathBuf,

        /// Number of results
        #[arg(short = 'k', long, default_value = "4")]
        top_k: usize,

        /// Retriever: dense, bm25, or hybrid
        #[arg(short, long, default_value = "hybrid")]
        retriever: String,

        /// Embedding model name or path
        #[arg(short, long, default_value = "sentence-transformers/all-MiniLM-L6-v2")]
        model: String,

        /// Embedding backend: bert, hash, or lora
        #[arg(short, long, default_value = "bert")]
        backend: String,

        /// LoRA checkpoint (for --backend lora)
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Device: auto, cpu, cuda, or metal
        #[arg(long, default_value = "auto")]
        device: String,
    },

    /// Answer a question with retrieval-augmented generation
    Ask {
        /// The question
        question: String,

        /// Index directory
        #[arg(short, long, default_value = "data/index")]
        index: PathBuf,

        /// Generator model id or local fine-tuned directory
        #[arg(short, long, default_value = "Qwen/Qwen2.5-0.5B")]
        model: String,

        /// Retriever: dense, bm25, or hybrid
        #[arg(short, long, default_value = "hybrid")]
        retriever: String,

        /// Embedding model name or path
        #[arg(long, default_value = "sentence-transformers/all-MiniLM-L6-v2")]
        embedding_model: String,

        /// Embedding backend: bert, hash, or lora
        #[arg(short, long, default_value = "bert")]
        backend: String,

        /// LoRA checkpoint (for --backend lora)
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Number of chunks to retrieve
        #[arg(short = 'k', long, default_value = "4")]
        top_k: usize,

        /// Prompt template: default, clinical, or concise
        #[arg(long, default_value = "default")]
        template: String,

        /// Maximum tokens to generate
        #[arg(long, default_value = "128")]
        max_new_tokens: usize,

        /// Device: auto, cpu, cuda, or metal
        #[arg(long, default_value = "auto")]
        device: String,
    },

    /// Serve the question-answering engine over HTTP
    Serve {
        /// Listen address
        #[arg(long, default_value = "127.0.0.1:8000")]
        addr: String,

        /// Index directory
        #[arg(short, long, default_value = "data/index")]
        index: PathBuf,

        /// Generator model id or local fine-tuned directory
        #[arg(short, long, default_value = "Qwen/Qwen2.5-0.5B")]
        model: String,

        /// Retriever: dense, bm25, or hybrid
        #[arg(short, long, default_value = "hybrid")]
        retriever: String,

        /// Embedding model name or path
        #[arg(long, default_value = "sentence-transformers/all-MiniLM-L6-v2")]
        embedding_model: String,

        /// Embedding backend: bert, hash, or lora
        #[arg(short, long, default_value = "bert")]
        backend: String,

        /// LoRA checkpoint (for --backend lora)
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Number of chunks to retrieve
        #[arg(short = 'k', long, default_value = "4")]
        top_k: usize,

        /// Prompt template: default, clinical, or concise
        #[arg(long, default_value = "default")]
        template: String,

        /// Maximum tokens to generate
        #[arg(long, default_value = "128")]
        max_new_tokens: usize,

        /// Device: auto, cpu, cuda, or metal
        #[arg(long, default_value = "auto")]
        device: String,
    },

    /// Fine-tune the QA model on medical QA pairs or paper text
    Train {
        /// QA dataset file (JSON/JSONL) or processed-papers directory
        #[arg(short, long, default_value = "data/medical_qa.json")]
        data: PathBuf,

        /// Output directory for checkpoints
        #[arg(short, long, default_value = "model/fine_tuned")]
        output: PathBuf,

        /// Config file with training defaults
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Base model (overrides config.yaml)
        #[arg(short, long)]
        model: Option<String>,

        /// Number of epochs (overrides config.yaml)
        #[arg(long)]
        epochs: Option<usize>,

        /// Batch size (overrides config.yaml)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Learning rate (overrides config.yaml)
        #[arg(long)]
        learning_rate: Option<f64>,

        /// LoRA rank
        #[arg(long, default_value = "8")]
        lora_rank: usize,

        /// LoRA alpha
        #[arg(long, default_value = "16")]
        lora_alpha: f32,

        /// Validation split fraction (0 disables)
        #[arg(long, default_value = "0.0")]
        val_split: f64,

        /// Device: auto, cpu, cuda, or metal
        #[arg(long, default_value = "auto")]
        device: String,
    },

    /// Web search helper
    Search {
        /// Search query
        query: String,

        /// Number of results
        #[arg(short = 'n', long, default_value = "5")]
        num_results: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medrag=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Tokenize { text, vocab } => cli::tokenize(&vocab, &text)?,

        Commands::Process { raw, processed } => cli::process(&raw, &processed)?,

        Commands::Analyze { pdf } => cli::analyze(&pdf)?,

        Commands::Index {
            input,
            output,
            model,
            backend,
            checkpoint,
            chunking,
            chunk_size,
            chunk_overlap,
            index_type,
            device,
        } => {
            let device: DevicePreference = device.parse()?;
            let embedder_opts = EmbedderOpts {
                backend,
                model,
                device,
                checkpoint,
                dimension: 384,
            };
            cli::index(
                &input,
                &output,
                &embedder_opts,
                &chunking,
                ChunkConfig {
                    chunk_size,
                    chunk_overlap,
                },
                &index_type,
            )?;
        }

        Commands::Query {
            query,
            index,
            top_k,
            retriever,
            model,
            backend,
            checkpoint,
            device,
        } => {
            let device: DevicePreference = device.parse()?;
            let embedder_opts = EmbedderOpts {
                backend,
                model,
                device,
                checkpoint,
                dimension: 384,
            };
            cli::query(&index, &query, top_k, &retriever, &embedder_opts)?;
        }

        Commands::Ask {
            question,
            index,
            model,
            retriever,
            embedding_model,
            backend,
            checkpoint,
            top_k,
            template,
            max_new_tokens,
            device,
        } => {
            let device: DevicePreference = device.parse()?;
            let embedder_opts = EmbedderOpts {
                backend,
                model: embedding_model,
                device,
                checkpoint,
                dimension: 384,
            };
            let engine_opts = EngineOpts {
                index_dir: index,
                retriever_type: retriever,
                generator_model: model,
                top_k,
                template,
                max_new_tokens,
                device,
            };
            cli::ask(&question, &engine_opts, &embedder_opts)?;
        }

        Commands::Serve {
            addr,
            index,
            model,
            retriever,
            embedding_model,
            backend,
            checkpoint,
            top_k,
            template,
            max_new_tokens,
            device,
        } => {
            let device: DevicePreference = device.parse()?;
            let embedder_opts = EmbedderOpts {
                backend,
                model: embedding_model,
                device,
                checkpoint,
                dimension: 384,
            };
            let engine_opts = EngineOpts {
                index_dir: index,
                retriever_type: retriever,
                generator_model: model,
                top_k,
                template,
                max_new_tokens,
                device,
            };
            cli::serve(&addr, &engine_opts, &embedder_opts).await?;
        }

        Commands::Train {
            data,
            output,
            config,
            model,
            epochs,
            batch_size,
            learning_rate,
            lora_rank,
            lora_alpha,
            val_split,
            device,
        } => {
            let device: DevicePreference = device.parse()?;
            cli::train(&TrainOpts {
                data,
                output,
                config_file: config,
                model,
                epochs,
                batch_size,
                learning_rate,
                lora_rank,
                lora_alpha,
                device,
                val_split,
            })?;
        }

        Commands::Search { query, num_results } => cli::search(&query, num_results)?,
    }

    Ok(())
}
