//! Gemini generative provider.
//!
//! Calls the `generateContent` endpoint of the Generative Language API.
//! Structured calls (insights, ranking) request JSON output and parse it
//! into typed drafts; the strategy call returns raw text because the
//! strategy stage parses it leniently (the model may wrap the JSON in a
//! Markdown code fence).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use prospector_core::provider::{
    GenerativeProvider, InsightDraft, RankedProduct, StrategyDraft,
};

use crate::config::LlmConfig;

use super::{post_json_with_retry, require_env};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiGenerativeProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f64,
    max_retries: u32,
}

/// Envelope for the structured insight response.
#[derive(Deserialize)]
struct InsightEnvelope {
    insights: Vec<InsightDraft>,
}

/// Envelope for the structured ranking response.
#[derive(Deserialize)]
struct RankingEnvelope {
    ranked_products: Vec<RankedProduct>,
}

impl GeminiGenerativeProvider {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = require_env("GEMINI_API_KEY")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    async fn generate(&self, prompt: &str, json_mode: bool) -> Result<String> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            API_BASE, self.model, self.api_key
        );

        let mut generation_config = serde_json::json!({
            "temperature": self.temperature,
        });
        if json_mode {
            generation_config["responseMimeType"] = serde_json::json!("application/json");
        }

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": generation_config,
        });

        let json =
            post_json_with_retry(&self.client, &url, &body, self.max_retries, "Gemini API")
                .await?;

        json.get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.pointer("/content/parts/0/text"))
            .and_then(|t| t.as_str())
            .map(|t| t.to_string())
            .ok_or_else(|| anyhow!("Invalid Gemini response: missing candidate text"))
    }
}

#[async_trait]
impl GenerativeProvider for GeminiGenerativeProvider {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        self.generate(prompt, false).await
    }

    async fn generate_insights(&self, prompt: &str) -> Result<Vec<InsightDraft>> {
        let text = self.generate(prompt, true).await?;
        let envelope: InsightEnvelope =
            serde_json::from_str(&text).context("Malformed insight response")?;
        Ok(envelope.insights)
    }

    async fn rank_products(&self, prompt: &str) -> Result<Vec<RankedProduct>> {
        let text = self.generate(prompt, true).await?;
        let envelope: RankingEnvelope =
            serde_json::from_str(&text).context("Malformed ranking response")?;
        Ok(envelope.ranked_products)
    }

    async fn generate_strategy(&self, prompt: &str) -> Result<String> {
        self.generate(prompt, false).await
    }
}

/// Parse a strategy draft from raw model output, tolerating a Markdown code
/// fence around the JSON body.
pub fn parse_strategy_draft(raw: &str) -> Option<StrategyDraft> {
    serde_json::from_str(strip_code_fence(raw)).ok()
}

/// Strip a leading/trailing Markdown code fence (```json ... ```), if present.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening fence line
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => return trimmed,
    };
    rest.trim_end()
        .strip_suffix("```")
        .map(|inner| inner.trim())
        .unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence_json() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fence(raw), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_code_fence_bare() {
        let raw = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fence(raw), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_code_fence_absent() {
        let raw = "  {\"a\": 1}  ";
        assert_eq!(strip_code_fence(raw), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_strategy_draft_fenced() {
        let raw = "```json\n{\"account_strategic_overview\": \"expand the platform footprint\", \"priority_initiatives\": [\"modernize storage\"]}\n```";
        let draft = parse_strategy_draft(raw).unwrap();
        assert_eq!(
            draft.account_strategic_overview.as_deref(),
            Some("expand the platform footprint")
        );
        assert_eq!(draft.priority_initiatives.len(), 1);
        assert!(draft.email_version.is_none());
    }

    #[test]
    fn test_parse_strategy_draft_malformed() {
        assert!(parse_strategy_draft("not json at all").is_none());
    }
}
