//! Gemini embedding provider.
//!
//! Calls the `embedContent` / `batchEmbedContents` endpoints of the
//! Generative Language API. Requires the `GEMINI_API_KEY` environment
//! variable. Batches are chunked to the configured batch size.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::time::Duration;

use prospector_core::embedding::EmbeddingProvider;

use crate::config::EmbeddingConfig;

use super::{post_json_with_retry, require_env};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
}

impl GeminiEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = require_env("GEMINI_API_KEY")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            dims: config.dims,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
        })
    }

    fn parse_values(value: &serde_json::Value) -> Result<Vec<f32>> {
        let values = value
            .get("values")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow!("Invalid embedding response: missing values array"))?;
        Ok(values
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect())
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/{}:embedContent?key={}", API_BASE, self.model, self.api_key);
        let body = serde_json::json!({
            "content": { "parts": [{ "text": text }] },
        });

        let json = post_json_with_retry(
            &self.client,
            &url,
            &body,
            self.max_retries,
            "Gemini embedding API",
        )
        .await?;

        let embedding = json
            .get("embedding")
            .ok_or_else(|| anyhow!("Invalid embedding response: missing embedding"))?;
        Self::parse_values(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!(
            "{}/{}:batchEmbedContents?key={}",
            API_BASE, self.model, self.api_key
        );

        let mut embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size.max(1)) {
            let requests: Vec<serde_json::Value> = chunk
                .iter()
                .map(|text| {
                    serde_json::json!({
                        "model": format!("models/{}", self.model),
                        "content": { "parts": [{ "text": text }] },
                    })
                })
                .collect();

            let body = serde_json::json!({ "requests": requests });

            let json = post_json_with_retry(
                &self.client,
                &url,
                &body,
                self.max_retries,
                "Gemini embedding API",
            )
            .await?;

            let batch = json
                .get("embeddings")
                .and_then(|e| e.as_array())
                .ok_or_else(|| anyhow!("Invalid embedding response: missing embeddings array"))?;

            for item in batch {
                embeddings.push(Self::parse_values(item)?);
            }
        }

        Ok(embeddings)
    }
}
