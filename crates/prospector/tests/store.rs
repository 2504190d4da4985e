//! SQLite store integration tests: idempotent migrations, the
//! delete-then-insert recommendation replacement, the single-row strategy
//! upsert, and task-queue bookkeeping.

use std::str::FromStr;
use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use prospector::migrate;
use prospector::queue::SqliteTaskQueue;
use prospector::sqlite_store::SqliteStore;

use prospector_core::models::{AnalysisStatus, NewInsight, NewRecommendation, StrategyContent};
use prospector_core::queue::{StageKind, StageTask, TaskQueue};
use prospector_core::store::Store;

async fn open_store() -> (tempfile::TempDir, SqlitePool, Arc<SqliteStore>) {
    let dir = tempfile::TempDir::new().unwrap();
    let options = SqliteConnectOptions::from_str(&format!(
        "sqlite:{}/prospector.sqlite",
        dir.path().display()
    ))
    .unwrap()
    .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await
        .unwrap();

    migrate::run_migrations(&pool).await.unwrap();
    let store = Arc::new(SqliteStore::new(pool.clone()));
    (dir, pool, store)
}

async fn seed_insight(store: &SqliteStore) -> (i64, i64) {
    let company = store.find_or_create_company("Acme", None).await.unwrap();
    let analysis = store.create_analysis(1, company.id, 30, None).await.unwrap();
    let insight_id = store
        .insert_insight(NewInsight {
            analysis_id: analysis.id,
            title: "finding".into(),
            description: "details".into(),
            category: "Operations".into(),
            severity: "high".into(),
        })
        .await
        .unwrap();
    (analysis.id, insight_id)
}

fn recommendation(insight_id: i64, product_id: i64, rank: i64, fit: f64) -> NewRecommendation {
    NewRecommendation {
        insight_id,
        product_id,
        match_percentage: (fit * 100.0).floor() as i64,
        strategic_fit: fit,
        confidence_score: fit,
        priority_rank: rank,
        llm_rank_position: None,
        reasoning: String::new(),
    }
}

#[tokio::test]
async fn test_migrations_idempotent() {
    let (_dir, pool, _store) = open_store().await;
    migrate::run_migrations(&pool).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    pool.close().await;
}

#[tokio::test]
async fn test_conflict_guard_sees_incomplete_analysis() {
    let (_dir, pool, store) = open_store().await;
    let company = store.find_or_create_company("Acme", Some("acme.example")).await.unwrap();
    let analysis = store.create_analysis(1, company.id, 0, None).await.unwrap();

    assert!(store.find_active_analysis(1, company.id).await.unwrap().is_some());

    // Failed analyses still block; only completed ones clear the guard
    store
        .mark_analysis_failed(analysis.id, "research", "boom")
        .await
        .unwrap();
    assert!(store.find_active_analysis(1, company.id).await.unwrap().is_some());

    store
        .update_analysis_status(analysis.id, AnalysisStatus::Completed)
        .await
        .unwrap();
    assert!(store.find_active_analysis(1, company.id).await.unwrap().is_none());
    pool.close().await;
}

#[tokio::test]
async fn test_replace_recommendations_deletes_then_inserts() {
    let (_dir, pool, store) = open_store().await;
    let (analysis_id, insight_id) = seed_insight(&store).await;
    let product = store
        .upsert_product("Atlas Storage Array", "Storage", "", "")
        .await
        .unwrap();

    store
        .replace_recommendations(
            insight_id,
            &[
                recommendation(insight_id, product.id, 1, 0.9),
                recommendation(insight_id, product.id, 2, 0.7),
            ],
        )
        .await
        .unwrap();
    assert_eq!(store.list_recommendations(analysis_id).await.unwrap().len(), 2);

    // Second run fully replaces the first
    store
        .replace_recommendations(insight_id, &[recommendation(insight_id, product.id, 1, 0.8)])
        .await
        .unwrap();
    let recs = store.list_recommendations(analysis_id).await.unwrap();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].priority_rank, 1);
    assert!((recs[0].strategic_fit - 0.8).abs() < 1e-9);

    // An empty slice clears the insight's recommendations
    store.replace_recommendations(insight_id, &[]).await.unwrap();
    assert!(store.list_recommendations(analysis_id).await.unwrap().is_empty());
    pool.close().await;
}

#[tokio::test]
async fn test_acceptance_roundtrip_and_max_confidence() {
    let (_dir, pool, store) = open_store().await;
    let (analysis_id, insight_id) = seed_insight(&store).await;
    let product = store.upsert_product("Atlas", "Storage", "", "").await.unwrap();

    store
        .replace_recommendations(
            insight_id,
            &[
                recommendation(insight_id, product.id, 1, 0.85),
                recommendation(insight_id, product.id, 2, 0.55),
            ],
        )
        .await
        .unwrap();

    let recs = store.list_recommendations(analysis_id).await.unwrap();
    assert!(recs.iter().all(|r| r.is_accepted.is_none()));

    assert!(store
        .set_recommendation_acceptance(recs[0].id, Some(true))
        .await
        .unwrap());
    assert!(store
        .set_recommendation_acceptance(recs[1].id, Some(false))
        .await
        .unwrap());
    assert!(!store
        .set_recommendation_acceptance(99999, Some(true))
        .await
        .unwrap());

    let accepted = store.list_accepted_recommendations(analysis_id).await.unwrap();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].id, recs[0].id);

    let max = store.max_recommendation_confidence(analysis_id).await.unwrap();
    assert!((max.unwrap() - 0.85).abs() < 1e-9);
    pool.close().await;
}

#[tokio::test]
async fn test_strategy_upsert_never_duplicates() {
    let (_dir, pool, store) = open_store().await;
    let (analysis_id, _insight_id) = seed_insight(&store).await;

    let content = StrategyContent {
        overview: Some("first".into()),
        priority_initiatives: "[]".into(),
        financial_positioning: None,
        technical_summary: None,
        objection_handling: "[]".into(),
        executive_version: None,
        email_version: None,
        generated_by_llm: true,
    };
    store.upsert_strategy(analysis_id, &content).await.unwrap();

    let updated = StrategyContent {
        overview: Some("second".into()),
        ..content
    };
    store.upsert_strategy(analysis_id, &updated).await.unwrap();

    let strategy = store.get_strategy(analysis_id).await.unwrap().unwrap();
    assert_eq!(strategy.overview.as_deref(), Some("second"));

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sales_strategies WHERE analysis_id = ?")
            .bind(analysis_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 1);
    pool.close().await;
}

#[tokio::test]
async fn test_queue_enqueue_and_pending_count() {
    let (_dir, pool, store) = open_store().await;
    let (analysis_id, insight_id) = seed_insight(&store).await;
    let queue = SqliteTaskQueue::new(pool.clone());

    let task_a = StageTask::recommendation(analysis_id, insight_id);
    let task_b = StageTask::recommendation(analysis_id, insight_id + 1);
    queue.enqueue(task_a.clone()).await.unwrap();
    queue.enqueue(task_b.clone()).await.unwrap();
    queue.enqueue(StageTask::strategy(analysis_id)).await.unwrap();

    assert_eq!(
        queue
            .pending_count(StageKind::Recommendation, analysis_id, None)
            .await
            .unwrap(),
        2
    );
    assert_eq!(
        queue
            .pending_count(
                StageKind::Recommendation,
                analysis_id,
                Some(&task_a.idempotency_key())
            )
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        queue
            .pending_count(StageKind::Strategy, analysis_id, None)
            .await
            .unwrap(),
        1
    );
    pool.close().await;
}

#[tokio::test]
async fn test_delete_analysis_cascades() {
    let (_dir, pool, store) = open_store().await;
    let (analysis_id, insight_id) = seed_insight(&store).await;
    let product = store.upsert_product("Atlas", "Storage", "", "").await.unwrap();

    store
        .replace_recommendations(insight_id, &[recommendation(insight_id, product.id, 1, 0.5)])
        .await
        .unwrap();
    store
        .insert_insight_source(insight_id, 1, "snippet")
        .await
        .unwrap();

    store.delete_analysis(analysis_id).await.unwrap();

    assert!(store.get_analysis(analysis_id).await.unwrap().is_none());
    assert!(store.list_insights(analysis_id).await.unwrap().is_empty());
    assert!(store.list_recommendations(analysis_id).await.unwrap().is_empty());

    // Catalog products are untouched by analysis deletion
    assert_eq!(store.list_products().await.unwrap().len(), 1);
    pool.close().await;
}
