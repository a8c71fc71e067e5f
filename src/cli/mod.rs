//! CLI command implementations
//!
//! Each subcommand of the `medrag` binary maps to one function here.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::data::{create_chunker, ChunkConfig, CorpusLoader};
use crate::embedding::{create_embedder, Embedder, Embedding, EmbeddingCache, EmbeddingConfig};
use crate::rag::{
    CandleGenerator, EngineConfig, GeneratorConfig, InferenceEngine, InferenceEngineBuilder,
    RagQuery, SamplingParams,
};
use crate::retrieval::{
    Bm25Retriever, DenseRetriever, HnswConfig, HybridRetriever, Retriever,
};
use crate::tools::{analyzer, web_search, PaperProcessor};
use crate::training::{
    DatasetConfig, DevicePreference, LoraConfig, LoraEmbedder, QaLoraModel, TokenizerWrapper,
    Trainer, TrainingConfig, TrainingSet,
};
use crate::vocab::MedicalTokenizer;

const DENSE_DIR: &str = "dense";
const BM25_DIR: &str = "bm25";

/// `medrag tokenize` - exercise the medical vocabulary tokenizer.
pub fn tokenize(vocab_path: &Path, text: &str) -> Result<()> {
    let tokenizer = MedicalTokenizer::from_file(vocab_path)?;
    let tokens = tokenizer.tokenize(text);
    let ids = tokenizer.encode(text);

    println!("Tokens: {:?}", tokens);
    println!("IDs: {:?}", ids);
    Ok(())
}

/// `medrag process` - batch-convert raw PDFs into processed text.
pub fn process(raw: &Path, processed: &Path) -> Result<()> {
    let summary = PaperProcessor::new(raw, processed).process()?;

    println!("Papers processed: {}", summary.processed);
    println!("Papers skipped: {}", summary.skipped);
    println!("Metadata: {:?}", summary.metadata_path);
    Ok(())
}

/// `medrag analyze` - inspect a single PDF.
pub fn analyze(pdf: &Path) -> Result<()> {
    let report = analyzer::analyze_pdf(pdf)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// `medrag search` - web search helper.
pub fn search(query: &str, num_results: usize) -> Result<()> {
    let links = web_search(query, num_results)?;
    for link in links {
        println!("{}", link);
    }
    Ok(())
}

/// Options shared by the retrieval-facing commands.
pub struct EmbedderOpts {
    /// "bert", "hash", or "lora"
    pub backend: String,
    pub model: String,
    pub device: DevicePreference,
    /// LoRA checkpoint for the "lora" backend
    pub checkpoint: Option<PathBuf>,
    pub dimension: usize,
}

pub fn build_embedder(opts: &EmbedderOpts) -> Result<Arc<dyn Embedder>> {
    let config = EmbeddingConfig {
        model_name: opts.model.clone(),
        ..Default::default()
    };

    match opts.backend.as_str() {
        "lora" => {
            let embedder = LoraEmbedder::new(
                &opts.model,
                &LoraConfig::default(),
                opts.checkpoint.as_deref(),
                opts.device,
            )?;
            Ok(Arc::new(embedder))
        }
        other => create_embedder(other, config, opts.dimension, opts.device),
    }
}

/// `medrag index` - build retrieval indexes from a document directory.
pub fn index(
    input: &Path,
    output: &Path,
    embedder_opts: &EmbedderOpts,
    chunk_strategy: &str,
    chunk_config: ChunkConfig,
    index_type: &str,
) -> Result<()> {
    tracing::info!("Building index");
    tracing::info!("  Input: {:?}", input);
    tracing::info!("  Output: {:?}", output);
    tracing::info!("  Index type: {}", index_type);

    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory: {:?}", output))?;

    // Load and chunk the corpus
    let loader = CorpusLoader::new();
    let documents = if input.is_file() {
        vec![loader.load(input)?]
    } else if input.is_dir() {
        loader.load_directory(input)?
    } else {
        anyhow::bail!("Input path does not exist: {:?}", input);
    };
    tracing::info!("Loaded {} documents", documents.len());

    let chunker = create_chunker(chunk_strategy, chunk_config);
    let mut chunks = Vec::new();
    for document in &documents {
        chunks.extend(chunker.chunk(document)?);
    }
    tracing::info!("Created {} chunks", chunks.len());

    if index_type == BM25_DIR || index_type == "both" {
        let bm25 = Bm25Retriever::build(chunks.clone(), &output.join(BM25_DIR))?;
        tracing::info!("BM25 index built: {} chunks", bm25.metadata().num_chunks);
    }

    if index_type == DENSE_DIR || index_type == "both" {
        let embedder = build_embedder(embedder_opts)?;
        let cache = EmbeddingCache::new(
            &output.join("embeddings.db"),
            embedder.model_name().to_string(),
        )?;

        let mut embeddings: Vec<Embedding> = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            embeddings.push(cache.get_or_compute(&chunk.content, |t| embedder.embed(t))?);
        }

        let dense = DenseRetriever::build(
            chunks.clone(),
            embeddings,
            embedder,
            HnswConfig::default(),
        )?;
        dense.save(&output.join(DENSE_DIR))?;
        tracing::info!("Dense index built: {} chunks", dense.metadata().num_chunks);

        let stats = cache.stats()?;
        tracing::info!("Embedding cache entries: {}", stats.model_entries);
    }

    println!("Indexed {} documents ({} chunks) into {:?}", documents.len(), chunks.len(), output);
    Ok(())
}

/// Load the requested retriever from an index directory.
pub fn build_retriever(
    index_dir: &Path,
    retriever_type: &str,
    embedder_opts: &EmbedderOpts,
) -> Result<Arc<dyn Retriever>> {
    match retriever_type {
        "dense" => {
            let embedder = build_embedder(embedder_opts)?;
            Ok(Arc::new(DenseRetriever::load(
                &index_dir.join(DENSE_DIR),
                embedder,
            )?))
        }
        "bm25" => Ok(Arc::new(Bm25Retriever::load(&index_dir.join(BM25_DIR))?)),
        "hybrid" => {
            let embedder = build_embedder(embedder_opts)?;
            let dense: Arc<dyn Retriever> =
                Arc::new(DenseRetriever::load(&index_dir.join(DENSE_DIR), embedder)?);
            let bm25: Arc<dyn Retriever> =
                Arc::new(Bm25Retriever::load(&index_dir.join(BM25_DIR))?);
            Ok(Arc::new(HybridRetriever::new(vec![dense, bm25])))
        }
        other => anyhow::bail!("Unknown retriever type: {}", other),
    }
}

/// `medrag query` - search the indexes directly.
pub fn query(
    index_dir: &Path,
    query_text: &str,
    top_k: usize,
    retriever_type: &str,
    embedder_opts: &EmbedderOpts,
) -> Result<()> {
    let retriever = build_retriever(index_dir, retriever_type, embedder_opts)?;
    let results = retriever.retrieve(query_text, top_k)?;

    println!("Query: {}", query_text);
    println!("Found {} results:\n", results.len());
    for result in &results {
        println!(
            "Rank {}: {} (score: {:.4})",
            result.rank, result.chunk_id, result.score
        );
        println!("  Document: {}", result.chunk.document_id);
        let preview: String = result.chunk.content.chars().take(200).collect();
        println!("  Content: {}{}", preview, if result.chunk.content.chars().count() > 200 { "..." } else { "" });
        println!();
    }
    Ok(())
}

/// Options for constructing the inference engine.
pub struct EngineOpts {
    pub index_dir: PathBuf,
    pub retriever_type: String,
    pub generator_model: String,
    pub top_k: usize,
    pub template: String,
    pub max_new_tokens: usize,
    pub device: DevicePreference,
}

pub fn build_engine(opts: &EngineOpts, embedder_opts: &EmbedderOpts) -> Result<InferenceEngine> {
    let retriever = build_retriever(&opts.index_dir, &opts.retriever_type, embedder_opts)?;

    let generator = CandleGenerator::new(
        GeneratorConfig::new(&opts.generator_model)
            .with_device(opts.device)
            .with_max_new_tokens(opts.max_new_tokens),
    )?;

    InferenceEngineBuilder::new()
        .retriever(retriever)
        .generator(Box::new(generator))
        .config(EngineConfig {
            top_k: opts.top_k,
            template: opts.template.clone(),
            sampling: SamplingParams::default().with_max_new_tokens(opts.max_new_tokens),
            ..Default::default()
        })
        .build()
}

/// `medrag ask` - one-shot inference from the command line.
pub fn ask(question: &str, opts: &EngineOpts, embedder_opts: &EmbedderOpts) -> Result<()> {
    let engine = build_engine(opts, embedder_opts)?;
    let response = engine.answer(&RagQuery::new(question).with_top_k(opts.top_k))?;
    println!("{}", response);
    Ok(())
}

/// `medrag serve` - expose the engine over HTTP.
pub async fn serve(addr: &str, opts: &EngineOpts, embedder_opts: &EmbedderOpts) -> Result<()> {
    let engine = build_engine(opts, embedder_opts)?;
    crate::server::serve(Arc::new(engine), addr).await
}

/// Options for `medrag train`.
pub struct TrainOpts {
    /// QA dataset file, or a processed-papers directory
    pub data: PathBuf,
    pub output: PathBuf,
    pub config_file: PathBuf,
    /// Overrides config.yaml when set
    pub model: Option<String>,
    pub epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub learning_rate: Option<f64>,
    pub lora_rank: usize,
    pub lora_alpha: f32,
    pub device: DevicePreference,
    /// Fraction of data held out for validation; 0 disables
    pub val_split: f64,
}

/// `medrag train` - fine-tune the QA model.
pub fn train(opts: &TrainOpts) -> Result<()> {
    let app_config = AppConfig::load_or_default(&opts.config_file)?;

    let model_id = opts
        .model
        .clone()
        .unwrap_or(app_config.model.base_model.clone());
    let epochs = opts.epochs.unwrap_or(app_config.training.epochs);
    let batch_size = opts.batch_size.unwrap_or(app_config.training.batch_size);
    let learning_rate = opts.learning_rate.unwrap_or(app_config.training.lr);

    let dataset = TrainingSet::load(&opts.data, DatasetConfig::default())?;
    if dataset.is_empty() {
        anyhow::bail!("No training examples found in {:?}", opts.data);
    }

    let (train_examples, val_examples) = if opts.val_split > 0.0 {
        dataset.split(1.0 - opts.val_split)
    } else {
        (dataset.iter().cloned().collect(), Vec::new())
    };
    let unshuffled = DatasetConfig {
        shuffle: false,
        seed: None,
    };
    let train_set = TrainingSet::new(train_examples, DatasetConfig::default());
    let val_set = (!val_examples.is_empty()).then(|| TrainingSet::new(val_examples, unshuffled));

    let training_config = TrainingConfig {
        batch_size,
        num_epochs: epochs,
        learning_rate,
        output_dir: opts.output.clone(),
        ..Default::default()
    };

    let device = crate::training::select_device(opts.device)?;
    let max_seq_length = training_config.max_seq_length;
    let mut trainer = Trainer::new(training_config, device.clone());

    let lora_config = LoraConfig::new(opts.lora_rank, opts.lora_alpha);
    let model = QaLoraModel::from_pretrained(&model_id, &lora_config, trainer.var_map(), &device)?;
    let tokenizer = TokenizerWrapper::from_pretrained(&model_id)?.with_max_length(max_seq_length);

    let result = trainer.train(&model, &tokenizer, &train_set, val_set.as_ref())?;

    println!("Training complete.");
    println!("  Steps: {}", result.metrics.global_step);
    println!("  Final loss: {:.4}", result.metrics.train_loss);
    if let Some(path) = result.checkpoint_path {
        println!("  Checkpoint: {:?}", path);
    }
    Ok(())
}
