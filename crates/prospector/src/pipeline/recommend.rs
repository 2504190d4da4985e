//! Recommendation stage: the hybrid ranking engine.
//!
//! Per insight: retrieve candidate products by vector similarity, re-rank
//! them via the generative collaborator (degrading to semantic-only
//! ordering if that call fails), score each candidate with the scoring
//! library, and persist the ranked set. Recommendations are fully replaced
//! on every run, so regeneration and queue redelivery are idempotent.

use tracing::{info, warn};

use prospector_core::error::{PipelineError, PipelineResult};
use prospector_core::models::{AnalysisStatus, Insight, NewRecommendation, Product};
use prospector_core::queue::{StageKind, StageTask};
use prospector_core::scoring::{self, RankingOutcome};

use crate::catalog::PRODUCT_NAMESPACE;

use super::Pipeline;

struct Candidate {
    product: Product,
    semantic_score: f64,
}

pub(crate) async fn run(p: &Pipeline, task: &StageTask) -> PipelineResult<()> {
    let insight_id = task
        .insight_id
        .ok_or_else(|| PipelineError::Precondition("recommendation task missing insight id".into()))?;

    let insight = p
        .store
        .get_insight(insight_id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("insight {}", insight_id)))?;

    let analysis = p
        .store
        .get_analysis(task.analysis_id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("analysis {}", task.analysis_id)))?;

    let query_text = format!("{}. {}", insight.title, insight.description);
    let query_vector = p.embeddings.embed(&query_text).await?;
    let matches = p
        .vectors
        .query(&query_vector, PRODUCT_NAMESPACE, p.ranking.top_k)
        .await?;

    let mut candidates: Vec<Candidate> = Vec::new();
    for m in &matches {
        let Some(product_id) = m.metadata.get("product_id").and_then(|v| v.as_i64()) else {
            continue;
        };
        match p.store.get_product(product_id).await? {
            Some(product) => candidates.push(Candidate {
                product,
                semantic_score: m.score,
            }),
            // Catalog integrity: stale vector entries are skipped, never fatal
            None => warn!(insight_id, product_id, "skipping match for missing catalog product"),
        }
    }

    if candidates.is_empty() {
        p.store.replace_recommendations(insight_id, &[]).await?;
        info!(insight_id, "no surviving candidates; insight left without recommendations");
        finish_fan_in(p, task).await?;
        return Ok(());
    }

    let outcome = match p
        .generative
        .rank_products(&build_ranking_prompt(&insight, &candidates))
        .await
    {
        Ok(ranked) => RankingOutcome::Ranked(ranked),
        Err(err) => {
            warn!(insight_id, error = %err, "ranking call failed; falling back to semantic ordering");
            RankingOutcome::Fallback {
                reason: err.to_string(),
            }
        }
    };

    let severity_weight = scoring::severity_weight(&insight.severity);
    let strategic_component = scoring::strategic_component(analysis.strategic_score);
    let in_consolidation = analysis.in_consolidation();

    struct Scored {
        product_id: i64,
        semantic_score: f64,
        fit: f64,
        llm_rank_position: Option<i64>,
        reasoning: Option<String>,
    }

    let mut scored: Vec<Scored> = candidates
        .iter()
        .map(|candidate| {
            let resolved = outcome.resolve(candidate.product.id, candidate.semantic_score);
            let financial_weight = scoring::financial_weight(
                p.ranking.is_consumption_product(&candidate.product.name),
                in_consolidation,
            );
            let fit = scoring::strategic_fit(
                candidate.semantic_score,
                resolved.llm_score,
                severity_weight,
                strategic_component,
                financial_weight,
            );
            Scored {
                product_id: candidate.product.id,
                semantic_score: candidate.semantic_score,
                fit,
                llm_rank_position: resolved.llm_rank_position,
                reasoning: resolved.reasoning,
            }
        })
        .collect();

    // Stable sort: ties keep candidate retrieval order
    scored.sort_by(|a, b| b.fit.partial_cmp(&a.fit).unwrap_or(std::cmp::Ordering::Equal));

    let recommendations: Vec<NewRecommendation> = scored
        .iter()
        .enumerate()
        .map(|(index, s)| NewRecommendation {
            insight_id,
            product_id: s.product_id,
            match_percentage: (s.fit * 100.0).floor() as i64,
            strategic_fit: s.fit,
            confidence_score: s.fit,
            priority_rank: index as i64 + 1,
            llm_rank_position: s.llm_rank_position,
            reasoning: s.reasoning.clone().unwrap_or_else(|| {
                format!(
                    "Semantic similarity match ({:.2}) between insight and product value proposition.",
                    s.semantic_score
                )
            }),
        })
        .collect();

    p.store
        .replace_recommendations(insight_id, &recommendations)
        .await?;

    info!(
        insight_id,
        recommendations = recommendations.len(),
        "recommendation stage complete"
    );

    finish_fan_in(p, task).await?;
    Ok(())
}

/// The last finishing recommendation task for an analysis advances it to
/// `analysis_completed`.
async fn finish_fan_in(p: &Pipeline, task: &StageTask) -> PipelineResult<()> {
    let remaining = p
        .queue
        .pending_count(
            StageKind::Recommendation,
            task.analysis_id,
            Some(&task.idempotency_key()),
        )
        .await?;

    if remaining == 0 {
        p.store
            .update_analysis_status(task.analysis_id, AnalysisStatus::AnalysisCompleted)
            .await?;
    }
    Ok(())
}

fn build_ranking_prompt(insight: &Insight, candidates: &[Candidate]) -> String {
    let mut prompt = format!(
        "You are ranking solution products against a strategic customer insight.\n\
         \n\
         Insight: {}\n\
         Description: {}\n\
         Severity: {}\n\
         \n\
         Candidate products:\n",
        insight.title, insight.description, insight.severity
    );

    for candidate in candidates {
        prompt.push_str(&format!(
            "- product_id: {} | name: {} | category: {} | description: {} | value proposition: {} | semantic score: {:.4}\n",
            candidate.product.id,
            candidate.product.name,
            candidate.product.category,
            candidate.product.description,
            candidate.product.value_proposition,
            candidate.semantic_score
        ));
    }

    prompt.push_str(
        "\nRank every candidate from best to worst strategic fit. Respond with a JSON \
         object of the form {\"ranked_products\": [{\"product_id\": ..., \
         \"strategic_score\": <0-100>, \"reasoning\": \"...\"}]}.",
    );

    prompt
}
