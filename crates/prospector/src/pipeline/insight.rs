//! Insight stage: retrieves indexed research context, extracts structured
//! insights via the generative collaborator, and computes the analysis's
//! strategic score.
//!
//! Every created insight is linked to every retrieved document — the full
//! cross product, deliberate provenance redundancy rather than a 1:1 match.
//! Redelivery appends duplicate insights; preserved gap, as with research.

use tracing::{info, warn};

use prospector_core::error::{PipelineError, PipelineResult};
use prospector_core::models::{AnalysisStatus, NewInsight, ResearchDocument};
use prospector_core::queue::StageTask;
use prospector_core::scoring::{self, InsightScores};

use super::Pipeline;

/// Representative query embedded to retrieve the analysis's research context.
const REPRESENTATIVE_QUERY: &str = "Strategic company analysis overview";
const CONTEXT_TOP_K: usize = 8;
const CONTEXT_CHARS_PER_DOCUMENT: usize = 4000;
const SOURCE_SNIPPET_CHARS: usize = 500;
const MAX_INSIGHTS: usize = 5;

pub(crate) async fn run(p: &Pipeline, analysis_id: i64) -> PipelineResult<()> {
    let _analysis = p
        .store
        .get_analysis(analysis_id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("analysis {}", analysis_id)))?;

    let namespace = Pipeline::analysis_namespace(analysis_id);
    let query_vector = p.embeddings.embed(REPRESENTATIVE_QUERY).await?;
    let matches = p.vectors.query(&query_vector, &namespace, CONTEXT_TOP_K).await?;

    let mut documents: Vec<ResearchDocument> = Vec::new();
    for m in &matches {
        let Some(document_id) = m.metadata.get("document_id").and_then(|v| v.as_i64()) else {
            continue;
        };
        if let Some(doc) = p.store.get_research_document(document_id).await? {
            documents.push(doc);
        }
    }

    let context = documents
        .iter()
        .map(|d| {
            d.raw_content
                .chars()
                .take(CONTEXT_CHARS_PER_DOCUMENT)
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let drafts = p
        .generative
        .generate_insights(&build_insight_prompt(&context))
        .await?;

    let mut created_ids: Vec<i64> = Vec::new();
    let mut sub_scores: Vec<InsightScores> = Vec::new();

    for draft in &drafts {
        let insight_id = p
            .store
            .insert_insight(NewInsight {
                analysis_id,
                title: draft.title.clone(),
                description: draft.description.clone(),
                category: draft.category.clone(),
                severity: draft.severity.clone(),
            })
            .await?;
        created_ids.push(insight_id);
        sub_scores.push(InsightScores {
            tech_intensity: draft.tech_intensity,
            operational_complexity: draft.operational_complexity,
            financial_pressure: draft.financial_pressure,
        });
    }

    // Provenance: every insight links to every retrieved document
    for insight_id in &created_ids {
        for doc in &documents {
            let snippet: String = doc.raw_content.chars().take(SOURCE_SNIPPET_CHARS).collect();
            p.store
                .insert_insight_source(*insight_id, doc.id, &snippet)
                .await?;
        }
    }

    let strategic_score = scoring::strategic_score(&sub_scores);
    p.store.set_strategic_score(analysis_id, strategic_score).await?;

    info!(
        analysis_id,
        insights = created_ids.len(),
        strategic_score,
        "insight stage complete"
    );

    p.store
        .update_analysis_status(analysis_id, AnalysisStatus::Recommending)
        .await?;

    if created_ids.is_empty() {
        // Nothing to recommend against; the fan-in has no tasks to wait for
        warn!(analysis_id, "no insights generated; skipping recommendation fan-out");
        p.store
            .update_analysis_status(analysis_id, AnalysisStatus::AnalysisCompleted)
            .await?;
        return Ok(());
    }

    for insight_id in created_ids {
        p.queue
            .enqueue(StageTask::recommendation(analysis_id, insight_id))
            .await?;
    }

    Ok(())
}

fn build_insight_prompt(context: &str) -> String {
    format!(
        "You are a strategic B2B sales analyst.\n\
         \n\
         Based on the following company research context, generate at most {MAX_INSIGHTS} \
         strategic insights.\n\
         \n\
         Each insight must include:\n\
         - title\n\
         - description\n\
         - category\n\
         - severity (low, medium, high)\n\
         - tech_intensity (0-5)\n\
         - operational_complexity (0-5)\n\
         - financial_pressure (0-5)\n\
         \n\
         Respond with a JSON object of the form {{\"insights\": [...]}}.\n\
         \n\
         Research context:\n\
         {context}"
    )
}
