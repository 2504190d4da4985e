//! Core data models for the analysis pipeline.
//!
//! These types represent the companies, analyses, research documents,
//! insights, recommendations, strategies, and catalog products that flow
//! through the pipeline stages. Timestamps are Unix seconds.

use serde::{Deserialize, Serialize};

/// Lifecycle of one analysis run, driven by the pipeline orchestrator.
///
/// Transitions move strictly forward; `Failed` is reachable from any
/// non-terminal state. `Completed` is accepted only after the strategy
/// stage succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Researching,
    InsightProcessing,
    Recommending,
    AnalysisCompleted,
    StrategyGenerating,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Researching => "researching",
            AnalysisStatus::InsightProcessing => "insight_processing",
            AnalysisStatus::Recommending => "recommending",
            AnalysisStatus::AnalysisCompleted => "analysis_completed",
            AnalysisStatus::StrategyGenerating => "strategy_generating",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AnalysisStatus::Pending),
            "researching" => Some(AnalysisStatus::Researching),
            "insight_processing" => Some(AnalysisStatus::InsightProcessing),
            "recommending" => Some(AnalysisStatus::Recommending),
            "analysis_completed" => Some(AnalysisStatus::AnalysisCompleted),
            "strategy_generating" => Some(AnalysisStatus::StrategyGenerating),
            "completed" => Some(AnalysisStatus::Completed),
            "failed" => Some(AnalysisStatus::Failed),
            _ => None,
        }
    }

    /// Fixed progress percentage surfaced to callers for each status.
    pub fn progress_percentage(&self) -> u8 {
        match self {
            AnalysisStatus::Pending => 5,
            AnalysisStatus::Researching => 25,
            AnalysisStatus::InsightProcessing => 50,
            AnalysisStatus::Recommending => 70,
            AnalysisStatus::AnalysisCompleted => 85,
            AnalysisStatus::StrategyGenerating => 95,
            AnalysisStatus::Completed => 100,
            AnalysisStatus::Failed => 100,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStatus::Completed | AnalysisStatus::Failed)
    }
}

/// A target company. One row per distinct company name; the domain is the
/// normalized host of the website URL supplied at analysis creation.
#[derive(Debug, Clone)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub domain: Option<String>,
}

/// One end-to-end pipeline run for a (user, company) pair.
///
/// `strategic_score` is set by the insight stage; `error_stage` and
/// `error_message` only on failure. `deal_stage` is a free-form lifecycle
/// flag; the value `"consolidation"` activates financial weighting in
/// recommendation ranking.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub id: i64,
    pub user_id: i64,
    pub company_id: i64,
    pub status: AnalysisStatus,
    pub strategic_score: Option<i64>,
    pub propensity_score: i64,
    pub deal_stage: Option<String>,
    pub error_stage: Option<String>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Analysis {
    /// Whether the analysis is flagged in a consolidation deal stage
    /// (case-insensitive).
    pub fn in_consolidation(&self) -> bool {
        self.deal_stage
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("consolidation"))
            .unwrap_or(false)
    }
}

/// A web research result persisted by the research stage. Immutable after
/// creation; `embedding_id` references the vector-index entry.
#[derive(Debug, Clone)]
pub struct ResearchDocument {
    pub id: i64,
    pub analysis_id: i64,
    pub title: Option<String>,
    pub source_url: Option<String>,
    pub raw_content: String,
    pub embedding_id: Option<String>,
    pub created_at: i64,
}

/// Fields for inserting a new research document.
#[derive(Debug, Clone)]
pub struct NewResearchDocument {
    pub analysis_id: i64,
    pub title: Option<String>,
    pub source_url: Option<String>,
    pub raw_content: String,
}

/// A discrete strategic finding extracted from research context.
///
/// Severity is stored exactly as the generative provider returned it; every
/// severity lookup in the scoring library is case-insensitive. The three 0-5
/// sub-scores are consumed transiently for the analysis's strategic score and
/// are not persisted per insight.
#[derive(Debug, Clone)]
pub struct Insight {
    pub id: i64,
    pub analysis_id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub severity: String,
}

/// Fields for inserting a new insight.
#[derive(Debug, Clone)]
pub struct NewInsight {
    pub analysis_id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub severity: String,
}

/// Provenance link between an insight and a research document.
#[derive(Debug, Clone)]
pub struct InsightSource {
    pub id: i64,
    pub insight_id: i64,
    pub research_document_id: i64,
    pub snippet: String,
}

/// A scored pairing of an insight with a catalog product.
///
/// Recommendations for an insight are fully replaced each time the
/// recommendation stage runs. `is_accepted` is tri-state and mutated only by
/// the caller, never by the pipeline.
#[derive(Debug, Clone)]
pub struct Recommendation {
    pub id: i64,
    pub insight_id: i64,
    pub product_id: i64,
    pub match_percentage: i64,
    pub strategic_fit: f64,
    pub confidence_score: f64,
    pub priority_rank: i64,
    pub llm_rank_position: Option<i64>,
    pub reasoning: String,
    pub is_accepted: Option<bool>,
}

/// Fields for inserting a new recommendation (rank already assigned).
#[derive(Debug, Clone)]
pub struct NewRecommendation {
    pub insight_id: i64,
    pub product_id: i64,
    pub match_percentage: i64,
    pub strategic_fit: f64,
    pub confidence_score: f64,
    pub priority_rank: i64,
    pub llm_rank_position: Option<i64>,
    pub reasoning: String,
}

/// The synthesized strategy artifact. At most one per analysis; upserted in
/// place by the strategy stage. List sections are stored as JSON text.
#[derive(Debug, Clone)]
pub struct SalesStrategy {
    pub id: i64,
    pub analysis_id: i64,
    pub status: String,
    pub overview: Option<String>,
    pub priority_initiatives: String,
    pub financial_positioning: Option<String>,
    pub technical_summary: Option<String>,
    pub objection_handling: String,
    pub executive_version: Option<String>,
    pub email_version: Option<String>,
    pub generated_by_llm: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Prepared strategy content for the upsert (lists already serialized).
#[derive(Debug, Clone)]
pub struct StrategyContent {
    pub overview: Option<String>,
    pub priority_initiatives: String,
    pub financial_positioning: Option<String>,
    pub technical_summary: Option<String>,
    pub objection_handling: String,
    pub executive_version: Option<String>,
    pub email_version: Option<String>,
    pub generated_by_llm: bool,
}

/// A catalog product. The indexed representation is rebuilt from name,
/// category, description, and value proposition; `content_hash` lets the
/// indexer skip products whose text has not changed.
#[derive(Debug, Clone)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub description: String,
    pub value_proposition: String,
    pub content_hash: Option<String>,
}
