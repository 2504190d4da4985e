//! Storage abstraction for the analysis pipeline.
//!
//! The [`Store`] trait defines every repository operation the stages and
//! entry points need, returning fully materialized aggregates — no stage
//! triggers hidden fetches through lazy relationships. Implementations must
//! be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Analysis, AnalysisStatus, Company, Insight, NewInsight, NewRecommendation,
    NewResearchDocument, Product, Recommendation, ResearchDocument, SalesStrategy,
    StrategyContent,
};

/// Abstract storage backend for the pipeline.
///
/// Multi-row replacement operations ([`replace_recommendations`](Store::replace_recommendations))
/// and the strategy upsert are atomic in every implementation: either the
/// whole batch commits or none of it does.
#[async_trait]
pub trait Store: Send + Sync {
    // ── companies ──────────────────────────────────────────────────────

    /// Find a company by name (case-insensitive) or create it.
    async fn find_or_create_company(&self, name: &str, domain: Option<&str>) -> Result<Company>;

    async fn get_company(&self, id: i64) -> Result<Option<Company>>;

    // ── analyses ───────────────────────────────────────────────────────

    async fn create_analysis(
        &self,
        user_id: i64,
        company_id: i64,
        propensity_score: i64,
        deal_stage: Option<&str>,
    ) -> Result<Analysis>;

    async fn get_analysis(&self, id: i64) -> Result<Option<Analysis>>;

    /// Find an analysis for this (user, company) that is not yet completed.
    /// Backs the creation-time conflict guard.
    async fn find_active_analysis(&self, user_id: i64, company_id: i64)
        -> Result<Option<Analysis>>;

    async fn update_analysis_status(&self, id: i64, status: AnalysisStatus) -> Result<()>;

    /// Record a stage failure: status, failing stage name, and cause.
    /// Always runs as its own transaction, separate from the failed stage's
    /// rolled-back writes.
    async fn mark_analysis_failed(&self, id: i64, stage: &str, message: &str) -> Result<()>;

    async fn set_strategic_score(&self, id: i64, score: i64) -> Result<()>;

    async fn list_completed_analyses(&self, user_id: i64) -> Result<Vec<Analysis>>;

    /// Delete an analysis and all child rows (documents, insights, sources,
    /// recommendations, strategy).
    async fn delete_analysis(&self, id: i64) -> Result<()>;

    // ── research documents ─────────────────────────────────────────────

    async fn insert_research_document(&self, doc: NewResearchDocument) -> Result<i64>;

    async fn set_document_embedding_id(&self, document_id: i64, embedding_id: &str) -> Result<()>;

    async fn get_research_document(&self, id: i64) -> Result<Option<ResearchDocument>>;

    // ── insights ───────────────────────────────────────────────────────

    async fn insert_insight(&self, insight: NewInsight) -> Result<i64>;

    async fn insert_insight_source(
        &self,
        insight_id: i64,
        research_document_id: i64,
        snippet: &str,
    ) -> Result<()>;

    async fn get_insight(&self, id: i64) -> Result<Option<Insight>>;

    async fn list_insights(&self, analysis_id: i64) -> Result<Vec<Insight>>;

    // ── recommendations ────────────────────────────────────────────────

    /// Replace all recommendations for an insight (delete-then-insert,
    /// atomically). An empty slice clears the insight's recommendations.
    async fn replace_recommendations(
        &self,
        insight_id: i64,
        recommendations: &[NewRecommendation],
    ) -> Result<()>;

    /// All recommendations under an analysis (via its insights), ordered by
    /// insight then priority rank.
    async fn list_recommendations(&self, analysis_id: i64) -> Result<Vec<Recommendation>>;

    /// Recommendations under an analysis with `is_accepted = true`.
    async fn list_accepted_recommendations(&self, analysis_id: i64)
        -> Result<Vec<Recommendation>>;

    /// Set the tri-state acceptance flag. Returns false when the
    /// recommendation does not exist.
    async fn set_recommendation_acceptance(
        &self,
        recommendation_id: i64,
        accepted: Option<bool>,
    ) -> Result<bool>;

    /// Highest confidence score across an analysis's recommendations.
    async fn max_recommendation_confidence(&self, analysis_id: i64) -> Result<Option<f64>>;

    // ── strategies ─────────────────────────────────────────────────────

    /// Insert or update the analysis's single strategy row.
    async fn upsert_strategy(&self, analysis_id: i64, content: &StrategyContent) -> Result<()>;

    async fn get_strategy(&self, analysis_id: i64) -> Result<Option<SalesStrategy>>;

    // ── products ───────────────────────────────────────────────────────

    /// Insert a product or update an existing one by name.
    async fn upsert_product(
        &self,
        name: &str,
        category: &str,
        description: &str,
        value_proposition: &str,
    ) -> Result<Product>;

    async fn get_product(&self, id: i64) -> Result<Option<Product>>;

    async fn list_products(&self) -> Result<Vec<Product>>;

    async fn set_product_content_hash(&self, id: i64, hash: &str) -> Result<()>;
}
