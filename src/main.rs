use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use ragfuse::config::Config;
use ragfuse::corpus::{LoadedPayloads, Passage};
use ragfuse::dense::{EmbeddingsFile, EMBEDDINGS_FILE};
use ragfuse::embedding::local::LocalEmbeddingProvider;
use ragfuse::embedding::openai::OpenAIEmbeddingProvider;
use ragfuse::embedding::EmbeddingProvider;
use ragfuse::generation::ollama::OllamaGenerator;
use ragfuse::generation::openai::OpenAIGenerator;
use ragfuse::generation::{ChatTurn, Generator, SamplingParams};
use ragfuse::logging;
use ragfuse::rerank::local::LocalReranker;
use ragfuse::rerank::ollama::OllamaReranker;
use ragfuse::rerank::tei::TeiReranker;
use ragfuse::rerank::{PassthroughReranker, Reranker};
use ragfuse::service::{Collaborators, LexicalSearch, RagService};

#[derive(Parser)]
#[command(name = "ragfuse", version, about = "Hybrid lexical and dense retrieval for grounded answers")]
struct Cli {
    /// Configuration file (environment variables still override it)
    #[arg(long, global = true, env = "RAGFUSE_CONFIG", default_value = "ragfuse.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Two-stage lexical search only; prints one JSON hit per line
    Search {
        query: String,
        #[arg(long)]
        limit_stage1: Option<usize>,
        #[arg(long)]
        limit_stage2: Option<usize>,
    },
    /// Answer a single question with the full retrieval pipeline
    Ask {
        query: String,
        /// Let table passages into the context
        #[arg(long)]
        use_tables: bool,
    },
    /// Interactive session reading questions from stdin, one per line
    Chat {
        #[arg(long)]
        use_tables: bool,
    },
    /// Compute embeddings.json for the text and table stores
    Embed {
        #[arg(long, default_value_t = 32)]
        batch_size: usize,
    },
    /// Print corpus and lexical index statistics
    Stats,
}

/// Create the embedding provider based on configuration.
async fn create_embedding_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.embedding.provider.as_str() {
        "openai" => {
            let api_key = config.embedding.openai_api_key.clone().unwrap_or_default();
            Ok(Arc::new(OpenAIEmbeddingProvider::new(
                config.embedding.openai_base_url.clone(),
                api_key,
                config.embedding.model.clone(),
            )?))
        }
        "local" => Ok(Arc::new(
            LocalEmbeddingProvider::new(&config.embedding.model, &config.embedding.cache_dir).await?,
        )),
        other => anyhow::bail!("Unknown embedding provider '{}'. Valid options: local, openai", other),
    }
}

/// Create the reranker based on configuration.
async fn create_reranker(config: &Config) -> Result<Arc<dyn Reranker>> {
    match config.rerank.provider.as_str() {
        "tei" => Ok(Arc::new(TeiReranker::new(
            config.rerank.tei_base_url.clone(),
            config.rerank.model.clone(),
        ))),
        "ollama" => Ok(Arc::new(OllamaReranker::new(
            config.generation.ollama_base_url.clone(),
            config.rerank.model.clone(),
        ))),
        "none" => Ok(Arc::new(PassthroughReranker)),
        "local" => Ok(Arc::new(
            LocalReranker::new(&config.rerank.model, &config.embedding.cache_dir).await?,
        )),
        other => anyhow::bail!("Unknown rerank provider '{}'. Valid options: local, tei, ollama, none", other),
    }
}

/// Create the answer generator based on configuration.
fn create_generator(config: &Config) -> Result<Arc<dyn Generator>> {
    let generation = &config.generation;
    let params = SamplingParams::from(generation);
    match generation.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIGenerator::new(
            generation.openai_base_url.clone(),
            generation.openai_api_key.clone().unwrap_or_default(),
            generation.openai_model.clone(),
            generation.system_prompt.clone(),
            params,
        )?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(
            generation.ollama_base_url.clone(),
            generation.ollama_model.clone(),
            generation.system_prompt.clone(),
            params,
        ))),
        other => anyhow::bail!("Unknown generation provider '{}'. Valid options: ollama, openai", other),
    }
}

async fn create_service(config: Config) -> Result<RagService> {
    let collaborators = Collaborators {
        embedder: create_embedding_provider(&config).await?,
        reranker: create_reranker(&config).await?,
        generator: create_generator(&config)?,
    };
    Ok(RagService::initialize(config, collaborators).await?)
}

fn build_lexical(config: &Config) -> Result<LexicalSearch> {
    let corpus = LoadedPayloads::load(&config.corpus)?.corpus()?;
    Ok(LexicalSearch::build(corpus, &config.lexical)?)
}

/// Embed one store's passages in batches and write its embeddings.json.
async fn embed_store(
    provider: &dyn EmbeddingProvider,
    dir: &Path,
    passages: &[Passage],
    batch_size: usize,
) -> Result<()> {
    let pb = ProgressBar::new(passages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40}] {pos}/{len} [{elapsed_precise} / {eta_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.set_message(dir.display().to_string());

    let mut vectors = Vec::with_capacity(passages.len());
    for chunk in passages.chunks(batch_size.max(1)) {
        let texts: Vec<String> = chunk.iter().map(|p| p.text.clone()).collect();
        vectors.extend(provider.embed_batch(&texts).await?);
        pb.inc(chunk.len() as u64);
    }
    pb.finish_with_message(format!("{} done", dir.display()));

    let file = EmbeddingsFile {
        model: provider.model_name().to_string(),
        dimension: vectors.first().map(Vec::len).unwrap_or(provider.dimension()),
        vectors,
    };
    file.write(&dir.join(EMBEDDINGS_FILE))?;
    tracing::info!(dir = %dir.display(), count = passages.len(), "Embeddings written");
    Ok(())
}

async fn run_chat(service: &RagService, use_tables: bool) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut history: Vec<ChatTurn> = Vec::new();
    let limit = service.config().service.history_limit;

    while let Some(line) = lines.next_line().await? {
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query == "exit" || query == "quit" {
            break;
        }
        let answer = service.ask(&history, query, use_tables).await;
        println!("{}", serde_json::to_string(&answer)?);

        history.push(ChatTurn::user(query));
        history.push(ChatTurn::assistant(answer.answer));
        if history.len() > limit {
            history.drain(..history.len() - limit);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_from(&cli.config)?;

    // Logging goes to stderr only; stdout carries the JSON results.
    logging::init_logging(&config);

    match cli.command {
        Commands::Search {
            query,
            limit_stage1,
            limit_stage2,
        } => {
            let lexical = build_lexical(&config)?;
            let l1 = limit_stage1.unwrap_or(config.lexical.limit_stage1);
            let l2 = limit_stage2.unwrap_or(config.lexical.limit_stage2);
            for hit in lexical.search(&query, l1, l2) {
                println!("{}", serde_json::to_string(&hit)?);
            }
        }

        Commands::Ask { query, use_tables } => {
            let use_tables = use_tables || config.retrieval.use_tables;
            let service = create_service(config).await?;
            let answer = service.ask(&[], &query, use_tables).await;
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }

        Commands::Chat { use_tables } => {
            let use_tables = use_tables || config.retrieval.use_tables;
            let service = create_service(config).await?;
            tracing::info!(use_tables, "Chat session started");
            run_chat(&service, use_tables).await?;
        }

        Commands::Embed { batch_size } => {
            let payloads = LoadedPayloads::load(&config.corpus)?;
            let provider = create_embedding_provider(&config).await?;
            embed_store(provider.as_ref(), &config.corpus.text_dir, &payloads.text, batch_size).await?;
            if !payloads.tables.is_empty() {
                embed_store(provider.as_ref(), &config.corpus.table_dir, &payloads.tables, batch_size).await?;
            }
        }

        Commands::Stats => {
            let lexical = build_lexical(&config)?;
            let stats = serde_json::json!({
                "corpus": lexical.stats(),
                "text_embeddings": config.corpus.text_dir.join(EMBEDDINGS_FILE).exists(),
                "table_embeddings": config.corpus.table_dir.join(EMBEDDINGS_FILE).exists(),
            });
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
