//! Research stage: templated web search, document persistence, embedding,
//! and vector indexing.
//!
//! Any single provider error aborts the entire stage — research work is
//! treated as a unit, unlike catalog indexing which isolates per-item
//! failures. Redelivery of a research task appends duplicate documents;
//! that gap is preserved (tasks carry idempotency keys so dedup can be
//! added later).

use serde_json::json;
use tracing::info;

use prospector_core::error::{PipelineError, PipelineResult};
use prospector_core::models::{AnalysisStatus, NewResearchDocument};
use prospector_core::queue::StageTask;

use super::Pipeline;

/// Strategic query templates appended to the company's base query.
const QUERY_TEMPLATES: [&str; 3] = [
    "financial performance",
    "technology stack infrastructure",
    "business strategy challenges news",
];

/// Only the first part of each document is embedded, to bound quota usage.
const EMBED_CONTENT_CHARS: usize = 1500;

pub(crate) async fn run(p: &Pipeline, analysis_id: i64) -> PipelineResult<()> {
    let analysis = p
        .store
        .get_analysis(analysis_id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("analysis {}", analysis_id)))?;

    // A vanished company is a stage failure, not a validation reject: the
    // analysis must end up marked failed
    let company = p
        .store
        .get_company(analysis.company_id)
        .await?
        .ok_or_else(|| {
            PipelineError::Other(anyhow::anyhow!("company {} not found", analysis.company_id))
        })?;

    p.store
        .update_analysis_status(analysis_id, AnalysisStatus::Researching)
        .await?;

    // Scope queries to the company site when we know its domain
    let base_query = match &company.domain {
        Some(domain) => format!("site:{}", domain),
        None => company.name.clone(),
    };

    let namespace = Pipeline::analysis_namespace(analysis_id);
    let mut documents_created = 0usize;

    for template in QUERY_TEMPLATES {
        let query = format!("{} {}", base_query, template);
        let hits = p.search.search(&query, p.search_max_results).await?;

        for hit in hits {
            let document_id = p
                .store
                .insert_research_document(NewResearchDocument {
                    analysis_id,
                    title: hit.title.clone(),
                    source_url: hit.url.clone(),
                    raw_content: hit.content.clone(),
                })
                .await?;
            documents_created += 1;

            let excerpt: String = hit.content.chars().take(EMBED_CONTENT_CHARS).collect();
            if excerpt.trim().is_empty() {
                continue;
            }

            let vector = p.embeddings.embed(&excerpt).await?;
            let embedding_id = document_id.to_string();
            p.vectors
                .upsert(
                    &embedding_id,
                    &vector,
                    json!({
                        "document_id": document_id,
                        "analysis_id": analysis_id,
                        "source_url": hit.url,
                    }),
                    &namespace,
                )
                .await?;
            p.store
                .set_document_embedding_id(document_id, &embedding_id)
                .await?;
        }
    }

    info!(
        analysis_id,
        documents = documents_created,
        "research stage complete"
    );

    p.store
        .update_analysis_status(analysis_id, AnalysisStatus::InsightProcessing)
        .await?;
    p.queue.enqueue(StageTask::insight(analysis_id)).await?;

    Ok(())
}
