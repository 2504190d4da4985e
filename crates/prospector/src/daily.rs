//! Daily prioritization: cross-analysis ranking for the "top N accounts"
//! view.
//!
//! Independent of the pipeline, but reuses the scoring library's severity
//! conventions. The score formula mixes 0-100 terms with ~1.0-1.25 and 0-1
//! terms by design; see [`prospector_core::scoring::daily_score`].

use anyhow::Result;

use prospector_core::scoring::{self, round4};
use prospector_core::store::Store;

/// One ranked entry in the daily top-N view.
#[derive(Debug, Clone)]
pub struct DailyPriority {
    pub analysis_id: i64,
    pub company_id: i64,
    pub daily_score: f64,
}

/// Rank a user's completed analyses and return the top N.
///
/// Ties preserve input order (stable sort over analyses as listed by the
/// store).
pub async fn generate_daily_top(
    store: &dyn Store,
    user_id: i64,
    limit: usize,
) -> Result<Vec<DailyPriority>> {
    let analyses = store.list_completed_analyses(user_id).await?;

    let mut ranked = Vec::with_capacity(analyses.len());

    for analysis in &analyses {
        let insights = store.list_insights(analysis.id).await?;
        let highest_severity_weight = insights
            .iter()
            .map(|i| scoring::daily_severity_weight(&i.severity))
            .fold(None, |best: Option<f64>, w| {
                Some(best.map_or(w, |b| b.max(w)))
            })
            .unwrap_or(1.0);

        let max_confidence = store
            .max_recommendation_confidence(analysis.id)
            .await?
            .unwrap_or(0.0);

        let score = scoring::daily_score(
            analysis.strategic_score.unwrap_or(0) as f64,
            analysis.propensity_score as f64,
            highest_severity_weight,
            max_confidence,
        );

        ranked.push(DailyPriority {
            analysis_id: analysis.id,
            company_id: analysis.company_id,
            daily_score: round4(score),
        });
    }

    ranked.sort_by(|a, b| {
        b.daily_score
            .partial_cmp(&a.daily_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(limit);

    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_core::models::{AnalysisStatus, NewInsight, NewRecommendation};
    use prospector_core::store::memory::InMemoryStore;

    async fn completed_analysis(
        store: &InMemoryStore,
        user_id: i64,
        strategic: i64,
        propensity: i64,
        severity: Option<&str>,
        confidence: Option<f64>,
    ) -> i64 {
        let company = store
            .find_or_create_company(&format!("company-{}-{}", strategic, propensity), None)
            .await
            .unwrap();
        let analysis = store
            .create_analysis(user_id, company.id, propensity, None)
            .await
            .unwrap();
        store
            .set_strategic_score(analysis.id, strategic)
            .await
            .unwrap();
        store
            .update_analysis_status(analysis.id, AnalysisStatus::Completed)
            .await
            .unwrap();

        if let Some(severity) = severity {
            let insight_id = store
                .insert_insight(NewInsight {
                    analysis_id: analysis.id,
                    title: "finding".into(),
                    description: "details".into(),
                    category: "Operations".into(),
                    severity: severity.into(),
                })
                .await
                .unwrap();

            if let Some(confidence) = confidence {
                store
                    .replace_recommendations(
                        insight_id,
                        &[NewRecommendation {
                            insight_id,
                            product_id: 1,
                            match_percentage: (confidence * 100.0) as i64,
                            strategic_fit: confidence,
                            confidence_score: confidence,
                            priority_rank: 1,
                            llm_rank_position: None,
                            reasoning: String::new(),
                        }],
                    )
                    .await
                    .unwrap();
            }
        }

        analysis.id
    }

    #[tokio::test]
    async fn test_daily_top_sorted_descending() {
        let store = InMemoryStore::new();
        let low = completed_analysis(&store, 1, 10, 10, None, None).await;
        let high = completed_analysis(&store, 1, 90, 80, Some("high"), Some(0.9)).await;

        let top = generate_daily_top(&store, 1, 5).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].analysis_id, high);
        assert_eq!(top[1].analysis_id, low);
        assert!(top[0].daily_score > top[1].daily_score);
    }

    #[tokio::test]
    async fn test_daily_top_mixed_case_severity() {
        let store = InMemoryStore::new();
        // Identical scores except severity; "HIGH" must resolve to 1.25
        let upper = completed_analysis(&store, 1, 50, 50, Some("HIGH"), None).await;
        let lower = completed_analysis(&store, 1, 50, 50, Some("unknown"), None).await;

        let top = generate_daily_top(&store, 1, 5).await.unwrap();
        assert_eq!(top[0].analysis_id, upper);
        assert_eq!(top[1].analysis_id, lower);
        // 0.25 * (1.25 - 1.0) difference
        assert!((top[0].daily_score - top[1].daily_score - 0.0625).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_daily_top_ties_preserve_input_order() {
        let store = InMemoryStore::new();
        let first = completed_analysis(&store, 1, 40, 40, Some("medium"), None).await;
        let second = completed_analysis(&store, 1, 40, 40, Some("Medium"), None).await;

        let top = generate_daily_top(&store, 1, 5).await.unwrap();
        assert_eq!(top[0].analysis_id, first);
        assert_eq!(top[1].analysis_id, second);
    }

    #[tokio::test]
    async fn test_daily_top_respects_limit() {
        let store = InMemoryStore::new();
        for i in 0..4 {
            completed_analysis(&store, 1, 10 * i, 5, None, None).await;
        }
        let top = generate_daily_top(&store, 1, 2).await.unwrap();
        assert_eq!(top.len(), 2);
    }

    #[tokio::test]
    async fn test_daily_score_defaults_without_children() {
        let store = InMemoryStore::new();
        let id = completed_analysis(&store, 1, 60, 20, None, None).await;
        let top = generate_daily_top(&store, 1, 5).await.unwrap();
        // 0.35*60 + 0.25*20 + 0.25*1.0 + 0.15*0 = 26.25
        assert_eq!(top[0].analysis_id, id);
        assert!((top[0].daily_score - 26.25).abs() < 1e-9);
    }
}
