//! External collaborator contracts: web search, vector index, and
//! generative text/structured output.
//!
//! Concrete implementations (HTTP providers, the SQLite vector index) live
//! in the application crate; stages depend only on these traits, which keeps
//! the pipeline testable with scripted mocks.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

/// One result returned by the web search collaborator.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub title: Option<String>,
    pub url: Option<String>,
    pub content: String,
}

/// Web search collaborator.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}

/// A similarity match returned from the vector index.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub score: f64,
    pub metadata: Value,
}

/// Vector similarity index partitioned into namespaces.
///
/// Each analysis gets its own namespace (`analysis_{id}`); the product
/// catalog lives in the `products` namespace.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace a vector entry.
    async fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        metadata: Value,
        namespace: &str,
    ) -> Result<()>;

    /// Return the `top_k` nearest entries in a namespace, best first.
    async fn query(&self, vector: &[f32], namespace: &str, top_k: usize)
        -> Result<Vec<VectorMatch>>;

    /// Drop every entry in a namespace.
    async fn delete_namespace(&self, namespace: &str) -> Result<()>;
}

/// A structured insight produced by the generative collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct InsightDraft {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub severity: String,
    #[serde(default)]
    pub tech_intensity: i64,
    #[serde(default)]
    pub operational_complexity: i64,
    #[serde(default)]
    pub financial_pressure: i64,
}

/// One ranked candidate returned by the generative re-ranking call.
#[derive(Debug, Clone, Deserialize)]
pub struct RankedProduct {
    pub product_id: i64,
    pub strategic_score: i64,
    #[serde(default)]
    pub reasoning: String,
}

/// Parsed strategy artifact. Every field is optional so a partial response
/// still deserializes; the strategy stage fills gaps from the raw text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrategyDraft {
    #[serde(default)]
    pub account_strategic_overview: Option<String>,
    #[serde(default)]
    pub priority_initiatives: Vec<Value>,
    #[serde(default)]
    pub financial_positioning: Option<String>,
    #[serde(default)]
    pub technical_enablement_summary: Option<String>,
    #[serde(default)]
    pub objection_handling: Vec<Value>,
    #[serde(default)]
    pub executive_conversation_version: Option<String>,
    #[serde(default)]
    pub email_version: Option<String>,
}

/// Generative text/structured-output collaborator.
///
/// The structured calls (`generate_insights`, `rank_products`) fail on
/// malformed output — the calling stage decides whether that is fatal.
/// `generate_strategy` returns the raw text because the strategy stage
/// parses it leniently (code-fence stripping, fallback artifact).
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Free-form text generation.
    async fn generate_text(&self, prompt: &str) -> Result<String>;

    /// Generate structured insights for the insight stage.
    async fn generate_insights(&self, prompt: &str) -> Result<Vec<InsightDraft>>;

    /// Re-rank recommendation candidates for the recommendation stage.
    async fn rank_products(&self, prompt: &str) -> Result<Vec<RankedProduct>>;

    /// Generate the strategy narrative. Returns raw text; the response may
    /// be wrapped in a Markdown code fence.
    async fn generate_strategy(&self, prompt: &str) -> Result<String>;
}
