//! Concrete provider implementations over HTTP.
//!
//! All providers share the same retry strategy:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

pub mod embedding;
pub mod generative;
pub mod search;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};

use prospector_core::embedding::EmbeddingProvider;
use prospector_core::provider::{GenerativeProvider, SearchProvider};

use crate::config::Config;

/// POST a JSON body and return the parsed JSON response, with retry/backoff.
pub(crate) async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    body: &serde_json::Value,
    max_retries: u32,
    what: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client.post(url).json(body).send().await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!("{} error {}: {}", what, status, body_text));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("{} error {}: {}", what, status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} failed after retries", what)))
}

/// Read an API key from the environment.
pub(crate) fn require_env(var: &str) -> Result<String> {
    std::env::var(var).map_err(|_| anyhow::anyhow!("{} environment variable not set", var))
}

/// Create the configured search provider.
pub fn create_search_provider(config: &Config) -> Result<Arc<dyn SearchProvider>> {
    match config.search.provider.as_str() {
        "tavily" => Ok(Arc::new(search::TavilyProvider::new(&config.search)?)),
        other => bail!("Unknown search provider: {}", other),
    }
}

/// Create the configured embedding provider.
pub fn create_embedding_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.embedding.provider.as_str() {
        "gemini" => Ok(Arc::new(embedding::GeminiEmbeddingProvider::new(
            &config.embedding,
        )?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Create the configured generative provider.
pub fn create_generative_provider(config: &Config) -> Result<Arc<dyn GenerativeProvider>> {
    match config.llm.provider.as_str() {
        "gemini" => Ok(Arc::new(generative::GeminiGenerativeProvider::new(
            &config.llm,
        )?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
