//! Pipeline orchestration.
//!
//! The [`Pipeline`] owns the collaborators every stage needs and routes
//! dispatched tasks to the right stage. Each stage, on success, commits its
//! own writes, advances the analysis status, and enqueues the next stage's
//! task; completion is never awaited inline. On an uncaught stage error the
//! orchestrator records the failure (status, stage name, cause) in a fresh
//! store call and enqueues nothing further.

mod insight;
mod recommend;
mod research;
mod strategy;

use std::sync::Arc;

use tracing::{error, info};

use prospector_core::embedding::EmbeddingProvider;
use prospector_core::error::PipelineResult;
use prospector_core::provider::{GenerativeProvider, SearchProvider, VectorIndex};
use prospector_core::queue::{StageKind, StageTask, TaskQueue};
use prospector_core::store::Store;

use crate::config::RankingConfig;

pub struct Pipeline {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) queue: Arc<dyn TaskQueue>,
    pub(crate) search: Arc<dyn SearchProvider>,
    pub(crate) embeddings: Arc<dyn EmbeddingProvider>,
    pub(crate) vectors: Arc<dyn VectorIndex>,
    pub(crate) generative: Arc<dyn GenerativeProvider>,
    pub(crate) ranking: RankingConfig,
    pub(crate) search_max_results: usize,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        queue: Arc<dyn TaskQueue>,
        search: Arc<dyn SearchProvider>,
        embeddings: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorIndex>,
        generative: Arc<dyn GenerativeProvider>,
        ranking: RankingConfig,
        search_max_results: usize,
    ) -> Self {
        Self {
            store,
            queue,
            search,
            embeddings,
            vectors,
            generative,
            ranking,
            search_max_results,
        }
    }

    /// Execute one dispatched stage task.
    ///
    /// On error the owning analysis (if it still exists) is marked failed
    /// with the stage name and cause; the error is also returned so the
    /// worker can record it on the task.
    pub async fn dispatch(&self, task: &StageTask) -> PipelineResult<()> {
        info!(
            analysis_id = task.analysis_id,
            stage = task.kind.as_str(),
            "dispatching stage"
        );

        let result = match task.kind {
            StageKind::Research => research::run(self, task.analysis_id).await,
            StageKind::Insight => insight::run(self, task.analysis_id).await,
            StageKind::Recommendation => recommend::run(self, task).await,
            StageKind::Strategy => strategy::run(self, task.analysis_id).await,
        };

        // Validation errors reject without mutation; everything else marks
        // the analysis failed with the stage name and cause
        if let Err(err) = &result {
            if !err.is_validation() {
                self.record_failure(task, &err.to_string()).await;
            }
        }

        result
    }

    /// Mark the analysis failed in its own transaction, separate from the
    /// failed stage's writes. Skipped when the analysis no longer exists.
    async fn record_failure(&self, task: &StageTask, message: &str) {
        match self.store.get_analysis(task.analysis_id).await {
            Ok(Some(_)) => {
                if let Err(mark_err) = self
                    .store
                    .mark_analysis_failed(task.analysis_id, task.kind.as_str(), message)
                    .await
                {
                    error!(
                        analysis_id = task.analysis_id,
                        error = %mark_err,
                        "failed to record stage failure"
                    );
                }
            }
            Ok(None) => {}
            Err(err) => {
                error!(
                    analysis_id = task.analysis_id,
                    error = %err,
                    "failed to load analysis while recording stage failure"
                );
            }
        }
    }

    /// Namespace holding an analysis's research vectors.
    pub(crate) fn analysis_namespace(analysis_id: i64) -> String {
        format!("analysis_{}", analysis_id)
    }
}
