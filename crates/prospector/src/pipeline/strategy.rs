//! Strategy stage: synthesizes the structured sales narrative from accepted
//! recommendations and upserts it.
//!
//! Preconditions are checked before any write: the analysis must exist and
//! at least one recommendation under it must be accepted. Malformed model
//! output degrades to a partial artifact (raw text in the overview and
//! executive fields) — it never fails the stage. The upsert is keyed by
//! analysis id, so redelivery is safe.

use std::cmp::Reverse;

use anyhow::Context;
use serde_json::json;
use tracing::{info, warn};

use prospector_core::error::{PipelineError, PipelineResult};
use prospector_core::models::{AnalysisStatus, StrategyContent};
use prospector_core::provider::StrategyDraft;
use prospector_core::scoring;

use crate::providers::generative::parse_strategy_draft;

use super::Pipeline;

pub(crate) async fn run(p: &Pipeline, analysis_id: i64) -> PipelineResult<()> {
    let analysis = p
        .store
        .get_analysis(analysis_id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("analysis {}", analysis_id)))?;

    let accepted = p.store.list_accepted_recommendations(analysis_id).await?;
    if accepted.is_empty() {
        return Err(PipelineError::Precondition(
            "no accepted recommendations for analysis".into(),
        ));
    }

    let mut accepted_products = Vec::new();
    for rec in &accepted {
        let Some(product) = p.store.get_product(rec.product_id).await? else {
            continue;
        };
        accepted_products.push(json!({
            "product_id": product.id,
            "name": product.name,
            "category": product.category,
            "match_percentage": rec.match_percentage,
            "confidence_score": rec.confidence_score,
        }));
    }

    let mut insights = p.store.list_insights(analysis_id).await?;
    insights.sort_by_key(|i| Reverse(scoring::strategy_severity_rank(&i.severity)));

    let payload = json!({
        "analysis_summary": {
            "strategic_score": analysis.strategic_score,
            "propensity_score": analysis.propensity_score,
        },
        "insights": insights.iter().map(|i| json!({
            "title": i.title,
            "severity": i.severity,
            "description": i.description,
        })).collect::<Vec<_>>(),
        "accepted_products": accepted_products,
    });

    let raw = p
        .generative
        .generate_strategy(&build_strategy_prompt(&payload))
        .await?;

    let draft = match parse_strategy_draft(&raw) {
        Some(draft) => draft,
        None => {
            warn!(analysis_id, "strategy response was not valid JSON; storing raw text");
            fallback_draft(&raw)
        }
    };

    let content = StrategyContent {
        overview: draft.account_strategic_overview,
        priority_initiatives: serde_json::to_string(&draft.priority_initiatives)
            .context("serializing priority initiatives")?,
        financial_positioning: draft.financial_positioning,
        technical_summary: draft.technical_enablement_summary,
        objection_handling: serde_json::to_string(&draft.objection_handling)
            .context("serializing objection handling")?,
        executive_version: draft.executive_conversation_version,
        email_version: draft.email_version,
        generated_by_llm: true,
    };

    p.store.upsert_strategy(analysis_id, &content).await?;
    p.store
        .update_analysis_status(analysis_id, AnalysisStatus::Completed)
        .await?;

    info!(analysis_id, "strategy stage complete");
    Ok(())
}

/// Best-effort artifact when the model response is not parseable JSON: the
/// raw text lands in the overview and executive fields, list sections stay
/// empty.
fn fallback_draft(raw: &str) -> StrategyDraft {
    StrategyDraft {
        account_strategic_overview: Some(raw.to_string()),
        executive_conversation_version: Some(raw.to_string()),
        ..Default::default()
    }
}

fn build_strategy_prompt(payload: &serde_json::Value) -> String {
    format!(
        "You are a senior B2B sales strategist. Using the account context below, write a \
         complete sales strategy.\n\
         \n\
         Respond with ONLY a JSON object containing exactly these keys:\n\
         - \"account_strategic_overview\": string\n\
         - \"priority_initiatives\": array of strings\n\
         - \"financial_positioning\": string\n\
         - \"technical_enablement_summary\": string\n\
         - \"objection_handling\": array of strings\n\
         - \"executive_conversation_version\": string (a narrative for an executive conversation)\n\
         - \"email_version\": string (a short outreach email)\n\
         \n\
         Reference the accepted products by name. Do not include any text outside the JSON \
         object.\n\
         \n\
         Account context:\n\
         {payload}"
    )
}
