use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub search: SearchConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub daily: DailyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Running tasks older than this are reclaimed by the worker
    /// (at-least-once redelivery after a crash).
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}
fn default_visibility_timeout_secs() -> i64 {
    600
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_provider")]
    pub provider: String,
    #[serde(default = "default_search_max_results")]
    pub max_results: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            max_results: default_search_max_results(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_search_provider() -> String {
    "tavily".to_string()
}
fn default_search_max_results() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    pub model: String,
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_embedding_provider() -> String {
    "gemini".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_provider() -> String {
    "gemini".to_string()
}
fn default_temperature() -> f64 {
    0.2
}
fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RankingConfig {
    /// Candidate products retrieved per insight.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Catalog names (substring, case-insensitive) treated as
    /// consumption-model offerings for financial weighting.
    #[serde(default)]
    pub consumption_products: Vec<String>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            consumption_products: Vec::new(),
        }
    }
}

impl RankingConfig {
    /// Whether a catalog product name matches a configured
    /// consumption-model offering.
    pub fn is_consumption_product(&self, product_name: &str) -> bool {
        let name = product_name.to_lowercase();
        self.consumption_products
            .iter()
            .any(|p| name.contains(&p.to_lowercase()))
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct DailyConfig {
    #[serde(default = "default_daily_limit")]
    pub limit: usize,
}

impl Default for DailyConfig {
    fn default() -> Self {
        Self {
            limit: default_daily_limit(),
        }
    }
}

fn default_daily_limit() -> usize {
    5
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.model.is_empty() {
        anyhow::bail!("embedding.model must not be empty");
    }
    if config.llm.model.is_empty() {
        anyhow::bail!("llm.model must not be empty");
    }
    if config.ranking.top_k == 0 {
        anyhow::bail!("ranking.top_k must be >= 1");
    }
    if config.search.max_results == 0 {
        anyhow::bail!("search.max_results must be >= 1");
    }

    match config.search.provider.as_str() {
        "tavily" => {}
        other => anyhow::bail!("Unknown search provider: '{}'. Must be tavily.", other),
    }
    match config.embedding.provider.as_str() {
        "gemini" => {}
        other => anyhow::bail!("Unknown embedding provider: '{}'. Must be gemini.", other),
    }
    match config.llm.provider.as_str() {
        "gemini" => {}
        other => anyhow::bail!("Unknown llm provider: '{}'. Must be gemini.", other),
    }

    Ok(config)
}
