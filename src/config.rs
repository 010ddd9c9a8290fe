/// Configuration management using figment
///
/// Loads configuration with this precedence (highest wins):
/// 1. Defaults (hardcoded)
/// 2. TOML file: ragfuse.toml (in working directory)
/// 3. Environment variables: prefixed RAGFUSE_, nested with __
///    (e.g., RAGFUSE_LEXICAL__NGRAM_SIZE=4, RAGFUSE_LOG_LEVEL=debug)

use figment::{
    Figment,
    providers::{Env, Format, Toml, Serialized},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::RagError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional file path for log output (in addition to stderr)
    #[serde(default)]
    pub log_file: Option<String>,

    #[serde(default)]
    pub corpus: CorpusConfig,

    #[serde(default)]
    pub lexical: LexicalConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub rerank: RerankConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub service: ServiceConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: default_log_level(),
            log_file: None,
            corpus: CorpusConfig::default(),
            lexical: LexicalConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            rerank: RerankConfig::default(),
            generation: GenerationConfig::default(),
            service: ServiceConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, TOML file, and environment variables
    ///
    /// Environment variables override TOML file values.
    /// Example: RAGFUSE_RETRIEVAL__USE_TABLES=true overrides retrieval.use_tables in ragfuse.toml
    pub fn load() -> Result<Config, RagError> {
        Self::load_from(Path::new("ragfuse.toml"))
    }

    /// Same as `load`, reading the TOML layer from an explicit path.
    pub fn load_from(path: &Path) -> Result<Config, RagError> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("RAGFUSE_").split("__"))
            .extract()
            .map_err(|e| RagError::Config(format!("Failed to load config: {}", e)))?;
        config.lexical.validate()?;
        config.retrieval.validate()?;
        Ok(config)
    }
}

/// Where passage payloads and their embeddings live.
///
/// Each directory holds `payloads.json` and, once embedded, `embeddings.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    #[serde(default = "default_text_dir")]
    pub text_dir: PathBuf,

    /// Optional; a missing table store only narrows retrieval to text passages.
    #[serde(default = "default_table_dir")]
    pub table_dir: PathBuf,
}

fn default_text_dir() -> PathBuf {
    PathBuf::from("data/vector_store_text")
}

fn default_table_dir() -> PathBuf {
    PathBuf::from("data/vector_store_table")
}

impl Default for CorpusConfig {
    fn default() -> Self {
        CorpusConfig {
            text_dir: default_text_dir(),
            table_dir: default_table_dir(),
        }
    }
}

/// Scoring parameters shared by the TF-IDF prefilter, the BM25 ranker and the
/// two-stage fusion.
///
/// Valid ranges (checked by `validate`):
/// - `ngram_size` >= 1
/// - `limit_stage1` >= 1, `limit_stage2` >= 1
/// - `stage1_threshold` >= 0
/// - `k1` > 0, 0 <= `b` <= 1, `delta` >= 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalConfig {
    /// Character n-gram length used by the prefilter (default: 3)
    #[serde(default = "default_ngram_size")]
    pub ngram_size: usize,

    /// Prefilter candidate cap (default: 100)
    #[serde(default = "default_limit_stage1")]
    pub limit_stage1: usize,

    /// BM25 rerank cap, also the size of the lexical result list (default: 5)
    #[serde(default = "default_limit_stage2")]
    pub limit_stage2: usize,

    /// Prefilter scores at or below this are dropped before BM25 (default: 1e-5)
    #[serde(default = "default_stage1_threshold")]
    pub stage1_threshold: f64,

    /// BM25 term frequency saturation (default: 1.5)
    #[serde(default = "default_k1")]
    pub k1: f64,

    /// BM25 length normalization (default: 0.75)
    #[serde(default = "default_b")]
    pub b: f64,

    /// Additive smoothing added once per query term (default: 1.0)
    #[serde(default = "default_delta")]
    pub delta: f64,
}

fn default_ngram_size() -> usize {
    3
}

fn default_limit_stage1() -> usize {
    100
}

fn default_limit_stage2() -> usize {
    5
}

fn default_stage1_threshold() -> f64 {
    1e-5
}

fn default_k1() -> f64 {
    1.5
}

fn default_b() -> f64 {
    0.75
}

fn default_delta() -> f64 {
    1.0
}

impl Default for LexicalConfig {
    fn default() -> Self {
        LexicalConfig {
            ngram_size: default_ngram_size(),
            limit_stage1: default_limit_stage1(),
            limit_stage2: default_limit_stage2(),
            stage1_threshold: default_stage1_threshold(),
            k1: default_k1(),
            b: default_b(),
            delta: default_delta(),
        }
    }
}

impl LexicalConfig {
    pub fn validate(&self) -> Result<(), RagError> {
        if self.ngram_size == 0 {
            return Err(RagError::Config("lexical.ngram_size must be at least 1".to_string()));
        }
        if self.limit_stage1 == 0 || self.limit_stage2 == 0 {
            return Err(RagError::Config(
                "lexical.limit_stage1 and lexical.limit_stage2 must be at least 1".to_string(),
            ));
        }
        if !(self.stage1_threshold >= 0.0) {
            return Err(RagError::Config(format!(
                "lexical.stage1_threshold must be non-negative, got {}",
                self.stage1_threshold
            )));
        }
        if !(self.k1 > 0.0 && self.k1.is_finite()) {
            return Err(RagError::Config(format!("lexical.k1 must be positive, got {}", self.k1)));
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(RagError::Config(format!("lexical.b must be within [0, 1], got {}", self.b)));
        }
        if !(self.delta >= 0.0 && self.delta.is_finite()) {
            return Err(RagError::Config(format!(
                "lexical.delta must be non-negative, got {}",
                self.delta
            )));
        }
        Ok(())
    }
}

/// Dense retrieval and cross-source fusion knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates pulled from each vector store before reranking (default: 25)
    #[serde(default = "default_top_dense")]
    pub top_dense: usize,

    /// Passages kept after reranking (default: 2)
    #[serde(default = "default_top_final")]
    pub top_final: usize,

    /// Include table passages in dense and lexical picks (default: false)
    #[serde(default)]
    pub use_tables: bool,

    /// How many lexical-only passages may join the reranked set (default: 1)
    #[serde(default = "default_max_lexical_additions")]
    pub max_lexical_additions: usize,
}

fn default_top_dense() -> usize {
    25
}

fn default_top_final() -> usize {
    2
}

fn default_max_lexical_additions() -> usize {
    1
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        RetrievalConfig {
            top_dense: default_top_dense(),
            top_final: default_top_final(),
            use_tables: false,
            max_lexical_additions: default_max_lexical_additions(),
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), RagError> {
        if self.top_dense == 0 || self.top_final == 0 {
            return Err(RagError::Config(
                "retrieval.top_dense and retrieval.top_final must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "local" (fastembed, default) or "openai"
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Model name; for the local provider one of the fastembed model codes
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Directory for downloaded model weights
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    #[serde(default)]
    pub openai_api_key: Option<String>,

    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
}

fn default_embedding_provider() -> String {
    "local".to_string()
}

fn default_embedding_model() -> String {
    "intfloat/multilingual-e5-large".to_string()
}

fn default_cache_dir() -> String {
    ".fastembed_cache".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            cache_dir: default_cache_dir(),
            openai_api_key: None,
            openai_base_url: default_openai_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    /// "local" (fastembed cross-encoder, default), "tei" (HTTP service), "ollama"
    /// (listwise ranking by the chat model at generation.ollama_base_url) or "none"
    #[serde(default = "default_rerank_provider")]
    pub provider: String,

    #[serde(default = "default_rerank_model")]
    pub model: String,

    /// Base URL of a text-embeddings-inference server exposing /rerank
    #[serde(default = "default_tei_base_url")]
    pub tei_base_url: String,
}

fn default_rerank_provider() -> String {
    "local".to_string()
}

fn default_rerank_model() -> String {
    "BAAI/bge-reranker-v2-m3".to_string()
}

fn default_tei_base_url() -> String {
    "http://localhost:8080".to_string()
}

impl Default for RerankConfig {
    fn default() -> Self {
        RerankConfig {
            provider: default_rerank_provider(),
            model: default_rerank_model(),
            tei_base_url: default_tei_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// "ollama" (default) or "openai"
    #[serde(default = "default_generation_provider")]
    pub provider: String,

    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,

    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,

    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    #[serde(default)]
    pub openai_api_key: Option<String>,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_generation_provider() -> String {
    "ollama".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "qwen3:0.6b".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_new_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.2
}

fn default_top_p() -> f32 {
    0.9
}

fn default_system_prompt() -> String {
    "You are a technical consultant answering questions from production staff.\n\
     Using only the provided context, give a precise, detailed answer to the user's question.\n\
     All information needed for the answer is contained in the context.\n\
     If the context holds no relevant information, say: 'I could not find information for your query.'"
        .to_string()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            provider: default_generation_provider(),
            ollama_base_url: default_ollama_base_url(),
            ollama_model: default_ollama_model(),
            openai_base_url: default_openai_base_url(),
            openai_api_key: None,
            openai_model: default_openai_model(),
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            system_prompt: default_system_prompt(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Deadline applied to every embed, dense search, rerank and generate call
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Number of most recent chat turns forwarded to the generator
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default = "default_no_information_answer")]
    pub no_information_answer: String,

    #[serde(default = "default_failure_answer")]
    pub failure_answer: String,
}

fn default_call_timeout_secs() -> u64 {
    120
}

fn default_history_limit() -> usize {
    20
}

fn default_no_information_answer() -> String {
    "I could not find information for your query.".to_string()
}

fn default_failure_answer() -> String {
    "A critical error occurred while processing the request.".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            call_timeout_secs: default_call_timeout_secs(),
            history_limit: default_history_limit(),
            no_information_answer: default_no_information_answer(),
            failure_answer: default_failure_answer(),
        }
    }
}
