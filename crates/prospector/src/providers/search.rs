//! Tavily web search provider.
//!
//! Calls `POST https://api.tavily.com/search` with basic search depth and
//! raw content included. Requires the `TAVILY_API_KEY` environment variable.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use prospector_core::provider::{SearchHit, SearchProvider};

use crate::config::SearchConfig;

use super::{post_json_with_retry, require_env};

const TAVILY_URL: &str = "https://api.tavily.com/search";

pub struct TavilyProvider {
    client: reqwest::Client,
    api_key: String,
    max_retries: u32,
}

impl TavilyProvider {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let api_key = require_env("TAVILY_API_KEY")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl SearchProvider for TavilyProvider {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let body = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "search_depth": "basic",
            "max_results": max_results,
            "include_raw_content": true,
        });

        let json =
            post_json_with_retry(&self.client, TAVILY_URL, &body, self.max_retries, "Tavily API")
                .await?;

        let results = json
            .get("results")
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(results
            .iter()
            .map(|item| {
                // Prefer raw content; fall back to the summary snippet
                let content = item
                    .get("raw_content")
                    .and_then(|c| c.as_str())
                    .filter(|c| !c.is_empty())
                    .or_else(|| item.get("content").and_then(|c| c.as_str()))
                    .unwrap_or_default()
                    .to_string();

                SearchHit {
                    title: item
                        .get("title")
                        .and_then(|t| t.as_str())
                        .map(|t| t.to_string()),
                    url: item
                        .get("url")
                        .and_then(|u| u.as_str())
                        .map(|u| u.to_string()),
                    content,
                }
            })
            .collect())
    }
}
