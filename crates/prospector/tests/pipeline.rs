//! End-to-end pipeline tests over the in-memory store with scripted
//! providers: the full research → insight → recommendation → strategy run,
//! stage failure handling, the ranking fallback, regeneration idempotence,
//! and strategy upsert behavior.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use prospector::analysis::{self, CreateAnalysisRequest};
use prospector::catalog;
use prospector::config::RankingConfig;
use prospector::pipeline::Pipeline;

use prospector_core::embedding::{cosine_similarity, EmbeddingProvider};
use prospector_core::error::{PipelineError, PipelineResult};
use prospector_core::models::AnalysisStatus;
use prospector_core::provider::{
    GenerativeProvider, InsightDraft, RankedProduct, SearchHit, SearchProvider, VectorIndex,
    VectorMatch,
};
use prospector_core::queue::{StageKind, StageTask, TaskQueue};
use prospector_core::store::memory::InMemoryStore;
use prospector_core::store::Store;

// ─── scripted collaborators ─────────────────────────────────────────────

/// Returns one fixed hit per query.
struct StaticSearch;

#[async_trait]
impl SearchProvider for StaticSearch {
    async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<SearchHit>> {
        Ok(vec![SearchHit {
            title: Some(format!("Result for {}", query)),
            url: Some(format!("https://news.example/{}", query.len())),
            content: format!(
                "Coverage of {}. The company is expanding its platform and \
                 modernizing infrastructure under cost pressure.",
                query
            ),
        }])
    }
}

/// Always fails, to exercise the whole-stage abort policy.
struct FailingSearch;

#[async_trait]
impl SearchProvider for FailingSearch {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<SearchHit>> {
        Err(anyhow!("search provider unavailable"))
    }
}

/// Deterministic embedder: same text, same vector.
struct MockEmbedder;

fn embed_text(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 8];
    for (i, b) in text.bytes().enumerate() {
        v[i % 8] += (b as f32) / 255.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    fn model_name(&self) -> &str {
        "mock-embedder"
    }

    fn dims(&self) -> usize {
        8
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(embed_text(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| embed_text(t)).collect())
    }
}

/// Brute-force in-memory vector index.
struct MemoryVectorIndex {
    entries: Mutex<HashMap<(String, String), (Vec<f32>, Value)>>,
}

impl MemoryVectorIndex {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        metadata: Value,
        namespace: &str,
    ) -> Result<()> {
        self.entries.lock().unwrap().insert(
            (namespace.to_string(), id.to_string()),
            (vector.to_vec(), metadata),
        );
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        namespace: &str,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>> {
        let entries = self.entries.lock().unwrap();
        let mut matches: Vec<VectorMatch> = entries
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|((_, id), (stored, metadata))| VectorMatch {
                id: id.clone(),
                score: cosine_similarity(vector, stored) as f64,
                metadata: metadata.clone(),
            })
            .collect();
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .retain(|(ns, _), _| ns != namespace);
        Ok(())
    }
}

enum RankMode {
    Ranked(Vec<RankedProduct>),
    Fail,
}

/// Scripted generative provider; ranking and strategy behavior can be
/// swapped mid-test.
struct MockGenerative {
    insights: Vec<InsightDraft>,
    ranking: Mutex<RankMode>,
    strategy_response: Mutex<String>,
}

impl MockGenerative {
    fn new(insights: Vec<InsightDraft>) -> Self {
        Self {
            insights,
            ranking: Mutex::new(RankMode::Fail),
            strategy_response: Mutex::new("{}".to_string()),
        }
    }

    fn set_ranking(&self, products: Vec<RankedProduct>) {
        *self.ranking.lock().unwrap() = RankMode::Ranked(products);
    }

    fn set_ranking_failure(&self) {
        *self.ranking.lock().unwrap() = RankMode::Fail;
    }

    fn set_strategy_response(&self, response: &str) {
        *self.strategy_response.lock().unwrap() = response.to_string();
    }
}

#[async_trait]
impl GenerativeProvider for MockGenerative {
    async fn generate_text(&self, _prompt: &str) -> Result<String> {
        Ok("ok".to_string())
    }

    async fn generate_insights(&self, _prompt: &str) -> Result<Vec<InsightDraft>> {
        Ok(self.insights.clone())
    }

    async fn rank_products(&self, _prompt: &str) -> Result<Vec<RankedProduct>> {
        match &*self.ranking.lock().unwrap() {
            RankMode::Ranked(products) => Ok(products.clone()),
            RankMode::Fail => Err(anyhow!("ranking model unavailable")),
        }
    }

    async fn generate_strategy(&self, _prompt: &str) -> Result<String> {
        Ok(self.strategy_response.lock().unwrap().clone())
    }
}

/// FIFO queue the tests pump by hand.
struct MemoryQueue {
    tasks: Mutex<VecDeque<StageTask>>,
}

impl MemoryQueue {
    fn new() -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
        }
    }

    fn pop(&self) -> Option<StageTask> {
        self.tasks.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn enqueue(&self, task: StageTask) -> Result<()> {
        self.tasks.lock().unwrap().push_back(task);
        Ok(())
    }

    async fn pending_count(
        &self,
        kind: StageKind,
        analysis_id: i64,
        exclude_key: Option<&str>,
    ) -> Result<usize> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| {
                t.kind == kind
                    && t.analysis_id == analysis_id
                    && Some(t.idempotency_key().as_str()) != exclude_key
            })
            .count())
    }
}

// ─── harness ────────────────────────────────────────────────────────────

fn default_insights() -> Vec<InsightDraft> {
    vec![
        InsightDraft {
            title: "Platform modernization underway".into(),
            description: "Legacy infrastructure is being replaced".into(),
            category: "Technology".into(),
            severity: "High".into(),
            tech_intensity: 3,
            operational_complexity: 2,
            financial_pressure: 1,
        },
        InsightDraft {
            title: "Cost pressure on operations".into(),
            description: "Budgets are tightening across business units".into(),
            category: "Finance".into(),
            severity: "medium".into(),
            tech_intensity: 3,
            operational_complexity: 2,
            financial_pressure: 1,
        },
    ]
}

struct Harness {
    store: Arc<InMemoryStore>,
    store_dyn: Arc<dyn Store>,
    queue: Arc<MemoryQueue>,
    queue_dyn: Arc<dyn TaskQueue>,
    vectors: Arc<dyn VectorIndex>,
    generative: Arc<MockGenerative>,
    pipeline: Pipeline,
}

async fn harness_with_search(search: Arc<dyn SearchProvider>) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let store_dyn: Arc<dyn Store> = store.clone();
    let queue = Arc::new(MemoryQueue::new());
    let queue_dyn: Arc<dyn TaskQueue> = queue.clone();
    let vectors: Arc<dyn VectorIndex> = Arc::new(MemoryVectorIndex::new());
    let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbedder);
    let generative = Arc::new(MockGenerative::new(default_insights()));
    let generative_dyn: Arc<dyn GenerativeProvider> = generative.clone();

    let pipeline = Pipeline::new(
        store_dyn.clone(),
        queue_dyn.clone(),
        search,
        embeddings.clone(),
        vectors.clone(),
        generative_dyn,
        RankingConfig {
            top_k: 3,
            consumption_products: vec!["FlexConsumption".to_string()],
        },
        3,
    );

    // Seed and index a small catalog
    for (name, category, description, value) in [
        (
            "FlexConsumption Platform",
            "Cloud",
            "Usage-billed infrastructure platform",
            "Turns CapEx into predictable OpEx",
        ),
        (
            "Atlas Storage Array",
            "Storage",
            "High-density block storage",
            "Consolidates storage footprint",
        ),
    ] {
        store_dyn
            .upsert_product(name, category, description, value)
            .await
            .unwrap();
    }
    catalog::index_products(&store_dyn, &embeddings, &vectors)
        .await
        .unwrap();

    Harness {
        store,
        store_dyn,
        queue,
        queue_dyn,
        vectors,
        generative,
        pipeline,
    }
}

async fn harness() -> Harness {
    harness_with_search(Arc::new(StaticSearch)).await
}

async fn pump(h: &Harness) -> Vec<PipelineResult<()>> {
    let mut results = Vec::new();
    while let Some(task) = h.queue.pop() {
        results.push(h.pipeline.dispatch(&task).await);
    }
    results
}

async fn create(h: &Harness, company: &str) -> i64 {
    analysis::create_analysis(
        &h.store_dyn,
        &h.queue_dyn,
        CreateAnalysisRequest {
            user_id: 1,
            company_name: company.to_string(),
            website_url: Some(format!("https://www.{}.example", company.to_lowercase())),
            propensity_score: 40,
            deal_stage: None,
        },
    )
    .await
    .unwrap()
    .id
}

// ─── tests ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_pipeline_reaches_analysis_completed() {
    let h = harness().await;
    let analysis_id = create(&h, "Acme").await;

    let results = pump(&h).await;
    assert!(results.iter().all(|r| r.is_ok()), "{:?}", results);

    let analysis = h.store_dyn.get_analysis(analysis_id).await.unwrap().unwrap();
    assert_eq!(analysis.status, AnalysisStatus::AnalysisCompleted);

    // Two insights of (3,2,1) each: round(12 * 100 / 75) = 16
    assert_eq!(analysis.strategic_score, Some(16));

    // One document per templated query
    assert_eq!(h.store.research_documents().len(), 3);

    // Provenance is the full cross product: 2 insights x 3 documents
    assert_eq!(h.store.insight_sources().len(), 6);

    // Recommendations exist for both insights, ranked 1..N with floor match
    let recommendations = h.store_dyn.list_recommendations(analysis_id).await.unwrap();
    assert!(!recommendations.is_empty());
    let insights = h.store_dyn.list_insights(analysis_id).await.unwrap();
    for insight in &insights {
        let mut for_insight: Vec<_> = recommendations
            .iter()
            .filter(|r| r.insight_id == insight.id)
            .collect();
        for_insight.sort_by_key(|r| r.priority_rank);
        for (index, rec) in for_insight.iter().enumerate() {
            assert_eq!(rec.priority_rank, index as i64 + 1);
            assert!((0.0..=1.0).contains(&rec.strategic_fit));
            assert_eq!(rec.match_percentage, (rec.strategic_fit * 100.0).floor() as i64);
            assert_eq!(rec.confidence_score, rec.strategic_fit);
        }
        // Descending by fit
        for pair in for_insight.windows(2) {
            assert!(pair[0].strategic_fit >= pair[1].strategic_fit);
        }
    }
}

#[tokio::test]
async fn test_second_active_analysis_rejected() {
    let h = harness().await;
    create(&h, "Acme").await;

    let err = analysis::create_analysis(
        &h.store_dyn,
        &h.queue_dyn,
        CreateAnalysisRequest {
            user_id: 1,
            company_name: "Acme".to_string(),
            website_url: None,
            propensity_score: 0,
            deal_stage: None,
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PipelineError::Conflict(_)));
}

#[tokio::test]
async fn test_research_provider_failure_marks_analysis_failed() {
    let h = harness_with_search(Arc::new(FailingSearch)).await;
    let analysis_id = create(&h, "Acme").await;

    let results = pump(&h).await;
    assert!(results.iter().any(|r| r.is_err()));

    let analysis = h.store_dyn.get_analysis(analysis_id).await.unwrap().unwrap();
    assert_eq!(analysis.status, AnalysisStatus::Failed);
    assert_eq!(analysis.error_stage.as_deref(), Some("research"));
    assert!(analysis
        .error_message
        .as_deref()
        .unwrap()
        .contains("search provider unavailable"));

    // The stage aborted as a unit: nothing enqueued past research
    assert!(h.queue.pop().is_none());
}

#[tokio::test]
async fn test_ranking_fallback_orders_by_semantic_score() {
    let h = harness().await;
    h.generative.set_ranking_failure();
    let analysis_id = create(&h, "Acme").await;

    let results = pump(&h).await;
    assert!(results.iter().all(|r| r.is_ok()), "{:?}", results);

    let recommendations = h.store_dyn.list_recommendations(analysis_id).await.unwrap();
    assert!(!recommendations.is_empty());
    for rec in &recommendations {
        assert_eq!(rec.llm_rank_position, None);
        assert!(rec.reasoning.contains("Semantic similarity match"));
    }

    let analysis = h.store_dyn.get_analysis(analysis_id).await.unwrap().unwrap();
    assert_eq!(analysis.status, AnalysisStatus::AnalysisCompleted);
}

#[tokio::test]
async fn test_llm_ranking_preserves_rank_positions() {
    let h = harness().await;
    let products = h.store_dyn.list_products().await.unwrap();
    h.generative.set_ranking(vec![
        RankedProduct {
            product_id: products[1].id,
            strategic_score: 95,
            reasoning: "directly addresses the consolidation pressure".into(),
        },
        RankedProduct {
            product_id: products[0].id,
            strategic_score: 55,
            reasoning: "useful but secondary".into(),
        },
    ]);

    let analysis_id = create(&h, "Acme").await;
    let results = pump(&h).await;
    assert!(results.iter().all(|r| r.is_ok()), "{:?}", results);

    let recommendations = h.store_dyn.list_recommendations(analysis_id).await.unwrap();
    for rec in &recommendations {
        if rec.product_id == products[1].id {
            assert_eq!(rec.llm_rank_position, Some(1));
            assert!(rec.reasoning.contains("consolidation pressure"));
        } else if rec.product_id == products[0].id {
            assert_eq!(rec.llm_rank_position, Some(2));
        }
    }
}

#[tokio::test]
async fn test_recommendation_regeneration_is_idempotent() {
    let h = harness().await;
    let analysis_id = create(&h, "Acme").await;
    pump(&h).await;

    let first = h.store_dyn.list_recommendations(analysis_id).await.unwrap();
    assert!(!first.is_empty());

    // Redeliver every recommendation task with no underlying data change
    let insights = h.store_dyn.list_insights(analysis_id).await.unwrap();
    for insight in &insights {
        let task = StageTask::recommendation(analysis_id, insight.id);
        h.pipeline.dispatch(&task).await.unwrap();
    }

    let second = h.store_dyn.list_recommendations(analysis_id).await.unwrap();
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.insight_id, b.insight_id);
        assert_eq!(a.product_id, b.product_id);
        assert_eq!(a.priority_rank, b.priority_rank);
        assert_eq!(a.match_percentage, b.match_percentage);
        assert_eq!(a.strategic_fit, b.strategic_fit);
    }
}

#[tokio::test]
async fn test_strategy_requires_accepted_recommendations() {
    let h = harness().await;
    let analysis_id = create(&h, "Acme").await;
    pump(&h).await;

    let err = analysis::request_strategy(&h.store_dyn, &h.queue_dyn, analysis_id)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Precondition(_)));

    // No writes happened
    assert_eq!(h.store.strategy_row_count(analysis_id), 0);
    let analysis = h.store_dyn.get_analysis(analysis_id).await.unwrap().unwrap();
    assert_eq!(analysis.status, AnalysisStatus::AnalysisCompleted);
}

#[tokio::test]
async fn test_strategy_stage_validation_does_not_mark_failed() {
    let h = harness().await;
    let analysis_id = create(&h, "Acme").await;
    pump(&h).await;

    // A redelivered strategy task after acceptances were withdrawn rejects
    // without mutating the analysis
    let err = h
        .pipeline
        .dispatch(&StageTask::strategy(analysis_id))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Precondition(_)));

    assert_eq!(h.store.strategy_row_count(analysis_id), 0);
    let analysis = h.store_dyn.get_analysis(analysis_id).await.unwrap().unwrap();
    assert_eq!(analysis.status, AnalysisStatus::AnalysisCompleted);
    assert!(analysis.error_stage.is_none());
}

#[tokio::test]
async fn test_strategy_parses_fenced_json_and_upserts_once() {
    let h = harness().await;
    h.generative.set_strategy_response(
        "```json\n{\"account_strategic_overview\": \"Lead with platform consolidation\", \
         \"priority_initiatives\": [\"storage refresh\"], \
         \"financial_positioning\": \"OpEx shift\", \
         \"technical_enablement_summary\": \"phased rollout\", \
         \"objection_handling\": [\"migration risk\"], \
         \"executive_conversation_version\": \"Executive narrative\", \
         \"email_version\": \"Short email\"}\n```",
    );

    let analysis_id = create(&h, "Acme").await;
    pump(&h).await;

    let recommendations = h.store_dyn.list_recommendations(analysis_id).await.unwrap();
    analysis::set_acceptance(&h.store_dyn, recommendations[0].id, Some(true))
        .await
        .unwrap();

    analysis::request_strategy(&h.store_dyn, &h.queue_dyn, analysis_id)
        .await
        .unwrap();
    let results = pump(&h).await;
    assert!(results.iter().all(|r| r.is_ok()), "{:?}", results);

    let analysis = h.store_dyn.get_analysis(analysis_id).await.unwrap().unwrap();
    assert_eq!(analysis.status, AnalysisStatus::Completed);

    let strategy = h.store_dyn.get_strategy(analysis_id).await.unwrap().unwrap();
    assert_eq!(
        strategy.overview.as_deref(),
        Some("Lead with platform consolidation")
    );
    assert_eq!(strategy.email_version.as_deref(), Some("Short email"));
    assert!(strategy.priority_initiatives.contains("storage refresh"));

    // Regeneration updates in place, never duplicates
    analysis::request_strategy(&h.store_dyn, &h.queue_dyn, analysis_id)
        .await
        .unwrap();
    pump(&h).await;
    assert_eq!(h.store.strategy_row_count(analysis_id), 1);
}

#[tokio::test]
async fn test_malformed_strategy_degrades_to_fallback_artifact() {
    let h = harness().await;
    h.generative
        .set_strategy_response("The model ignored the JSON contract entirely.");

    let analysis_id = create(&h, "Acme").await;
    pump(&h).await;

    let recommendations = h.store_dyn.list_recommendations(analysis_id).await.unwrap();
    analysis::set_acceptance(&h.store_dyn, recommendations[0].id, Some(true))
        .await
        .unwrap();

    analysis::request_strategy(&h.store_dyn, &h.queue_dyn, analysis_id)
        .await
        .unwrap();
    let results = pump(&h).await;
    assert!(results.iter().all(|r| r.is_ok()), "{:?}", results);

    let analysis = h.store_dyn.get_analysis(analysis_id).await.unwrap().unwrap();
    assert_eq!(analysis.status, AnalysisStatus::Completed);

    let strategy = h.store_dyn.get_strategy(analysis_id).await.unwrap().unwrap();
    assert_eq!(
        strategy.overview.as_deref(),
        Some("The model ignored the JSON contract entirely.")
    );
    assert_eq!(
        strategy.executive_version.as_deref(),
        Some("The model ignored the JSON contract entirely.")
    );
    assert_eq!(strategy.priority_initiatives, "[]");
    assert_eq!(strategy.objection_handling, "[]");
}

#[tokio::test]
async fn test_delete_analysis_clears_children_and_vectors() {
    let h = harness().await;
    let analysis_id = create(&h, "Acme").await;
    pump(&h).await;

    analysis::delete_analysis(&h.store_dyn, &h.vectors, analysis_id)
        .await
        .unwrap();

    assert!(h.store_dyn.get_analysis(analysis_id).await.unwrap().is_none());
    assert!(h.store.research_documents().is_empty());
    assert!(h.store.insight_sources().is_empty());

    // The analysis namespace is gone; the product namespace survives
    let probe = embed_text("probe");
    let analysis_matches = h
        .vectors
        .query(&probe, &format!("analysis_{}", analysis_id), 10)
        .await
        .unwrap();
    assert!(analysis_matches.is_empty());
    let product_matches = h
        .vectors
        .query(&probe, catalog::PRODUCT_NAMESPACE, 10)
        .await
        .unwrap();
    assert!(!product_matches.is_empty());
}
