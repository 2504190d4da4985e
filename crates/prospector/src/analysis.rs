//! Analysis entry points: creation (with the one-active-analysis conflict
//! guard), progress reporting, recommendation acceptance, strategy
//! triggering, and deletion.
//!
//! These are the operations the pipeline never performs on its own — they
//! belong to the caller (CLI today, any other surface tomorrow).

use std::sync::Arc;

use tracing::info;

use prospector_core::error::{PipelineError, PipelineResult};
use prospector_core::models::{Analysis, AnalysisStatus};
use prospector_core::provider::VectorIndex;
use prospector_core::queue::{StageTask, TaskQueue};
use prospector_core::store::Store;

use crate::pipeline::Pipeline;

/// Inputs for creating a new analysis.
#[derive(Debug, Clone)]
pub struct CreateAnalysisRequest {
    pub user_id: i64,
    pub company_name: String,
    pub website_url: Option<String>,
    pub propensity_score: i64,
    pub deal_stage: Option<String>,
}

/// Create an analysis and enqueue the research stage.
///
/// Rejects with a conflict when the user already has a not-yet-completed
/// analysis for the same company.
pub async fn create_analysis(
    store: &Arc<dyn Store>,
    queue: &Arc<dyn TaskQueue>,
    request: CreateAnalysisRequest,
) -> PipelineResult<Analysis> {
    if !(0..=100).contains(&request.propensity_score) {
        return Err(PipelineError::Precondition(
            "propensity score must be between 0 and 100".into(),
        ));
    }

    let domain = request
        .website_url
        .as_deref()
        .and_then(normalize_domain);

    let company = store
        .find_or_create_company(&request.company_name, domain.as_deref())
        .await?;

    if let Some(active) = store
        .find_active_analysis(request.user_id, company.id)
        .await?
    {
        return Err(PipelineError::Conflict(format!(
            "an analysis for this company is already in progress (analysis {}, status {})",
            active.id,
            active.status.as_str()
        )));
    }

    let analysis = store
        .create_analysis(
            request.user_id,
            company.id,
            request.propensity_score,
            request.deal_stage.as_deref(),
        )
        .await?;

    queue.enqueue(StageTask::research(analysis.id)).await?;

    info!(
        analysis_id = analysis.id,
        company = %company.name,
        "analysis created and research enqueued"
    );

    Ok(analysis)
}

/// Current status plus the derived progress percentage.
pub async fn progress(
    store: &Arc<dyn Store>,
    analysis_id: i64,
) -> PipelineResult<(Analysis, u8)> {
    let analysis = store
        .get_analysis(analysis_id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("analysis {}", analysis_id)))?;
    let progress = analysis.status.progress_percentage();
    Ok((analysis, progress))
}

/// Validate and trigger strategy generation for an analysis.
///
/// This is the only re-entry path after `analysis_completed`; it requires at
/// least one accepted recommendation and rejects when generation is already
/// in flight.
pub async fn request_strategy(
    store: &Arc<dyn Store>,
    queue: &Arc<dyn TaskQueue>,
    analysis_id: i64,
) -> PipelineResult<()> {
    let analysis = store
        .get_analysis(analysis_id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("analysis {}", analysis_id)))?;

    if analysis.status == AnalysisStatus::StrategyGenerating {
        return Err(PipelineError::Conflict(
            "strategy generation already in progress".into(),
        ));
    }

    let accepted = store.list_accepted_recommendations(analysis_id).await?;
    if accepted.is_empty() {
        return Err(PipelineError::Precondition(
            "no accepted recommendations found".into(),
        ));
    }

    store
        .update_analysis_status(analysis_id, AnalysisStatus::StrategyGenerating)
        .await?;
    queue.enqueue(StageTask::strategy(analysis_id)).await?;

    Ok(())
}

/// Set the tri-state acceptance flag on a recommendation.
pub async fn set_acceptance(
    store: &Arc<dyn Store>,
    recommendation_id: i64,
    accepted: Option<bool>,
) -> PipelineResult<()> {
    let found = store
        .set_recommendation_acceptance(recommendation_id, accepted)
        .await?;
    if !found {
        return Err(PipelineError::NotFound(format!(
            "recommendation {}",
            recommendation_id
        )));
    }
    Ok(())
}

/// Delete an analysis, its child rows, and its vector namespace.
pub async fn delete_analysis(
    store: &Arc<dyn Store>,
    vectors: &Arc<dyn VectorIndex>,
    analysis_id: i64,
) -> PipelineResult<()> {
    store
        .get_analysis(analysis_id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("analysis {}", analysis_id)))?;

    store.delete_analysis(analysis_id).await?;
    vectors
        .delete_namespace(&Pipeline::analysis_namespace(analysis_id))
        .await?;
    Ok(())
}

/// Normalize a website URL to its bare host: lowercased, leading `www.`
/// stripped. Accepts bare hosts without a scheme.
pub fn normalize_domain(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed = url::Url::parse(trimmed)
        .or_else(|_| url::Url::parse(&format!("https://{}", trimmed)))
        .ok()?;

    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}
