//! Scoring library: the weighted formulas behind insight aggregation,
//! recommendation ranking, and daily prioritization.
//!
//! Every function here is pure — no I/O, no configuration. The calling stage
//! is responsible for gathering inputs (semantic scores, severity labels,
//! analysis-level scores) and persisting the results.
//!
//! # Strategic fit
//!
//! ```text
//! fit = min(1.0, round4(semantic*0.40 + llm*0.25 + severity*0.20 + strategic*0.15) * financial)
//! ```
//!
//! All severity lookups are case-insensitive and default safely for
//! unrecognized labels.

use crate::provider::RankedProduct;

/// Transient per-insight sub-scores (each 0-5) used to compute the
/// analysis-level strategic score.
#[derive(Debug, Clone, Copy)]
pub struct InsightScores {
    pub tech_intensity: i64,
    pub operational_complexity: i64,
    pub financial_pressure: i64,
}

/// Theoretical maximum of summed sub-scores: 5 insights x 3 dimensions x 5.
const STRATEGIC_SCORE_CEILING: f64 = 75.0;

/// Aggregate an analysis's strategic score from its insights' sub-scores.
///
/// Sums each dimension over *all* insights (not averaged), scales against the
/// theoretical maximum, and caps at 100. Monotonically non-decreasing in each
/// sub-score sum.
pub fn strategic_score(insights: &[InsightScores]) -> i64 {
    let total: i64 = insights
        .iter()
        .map(|s| s.tech_intensity + s.operational_complexity + s.financial_pressure)
        .sum();
    let scaled = (total as f64 * 100.0 / STRATEGIC_SCORE_CEILING).round() as i64;
    scaled.min(100)
}

/// Severity multiplier used in recommendation ranking.
pub fn severity_weight(severity: &str) -> f64 {
    match severity.to_ascii_lowercase().as_str() {
        "low" => 0.4,
        "medium" => 0.7,
        "high" => 1.0,
        _ => 0.5,
    }
}

/// Severity rank used to order insights in the strategy context payload.
pub fn strategy_severity_rank(severity: &str) -> i64 {
    match severity.to_ascii_lowercase().as_str() {
        "high" => 3,
        "medium" => 2,
        "low" => 1,
        _ => 1,
    }
}

/// Severity multiplier used in daily prioritization.
pub fn daily_severity_weight(severity: &str) -> f64 {
    match severity.to_ascii_lowercase().as_str() {
        "high" => 1.25,
        "medium" => 1.1,
        "low" => 1.0,
        _ => 1.0,
    }
}

/// Financial alignment multiplier.
///
/// A consumption-model product under a consolidation deal stage is boosted;
/// any other product under the same flag is dampened; without the flag the
/// weight is neutral.
pub fn financial_weight(consumption_product: bool, in_consolidation: bool) -> f64 {
    if in_consolidation {
        if consumption_product {
            1.1
        } else {
            0.9
        }
    } else {
        1.0
    }
}

/// Half-up rounding to four decimal places.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Hybrid strategic-fit score for a single recommendation candidate.
///
/// All component scores are on a 0-1 scale. Rounding happens before the
/// financial multiplier; the result is clamped to `[0.0, 1.0]`.
pub fn strategic_fit(
    semantic_score: f64,
    llm_score: f64,
    severity_weight: f64,
    strategic_component: f64,
    financial_weight: f64,
) -> f64 {
    let base = round4(
        semantic_score * 0.4
            + llm_score * 0.25
            + severity_weight * 0.2
            + strategic_component * 0.15,
    );
    (base * financial_weight).clamp(0.0, 1.0)
}

/// Strategic component of the fit score: the analysis's strategic score on a
/// 0-1 scale, defaulting to 0.5 when the score is unset.
pub fn strategic_component(strategic_score: Option<i64>) -> f64 {
    strategic_score.unwrap_or(50) as f64 / 100.0
}

/// Cross-analysis daily prioritization score.
///
/// The two score terms are on a 0-100 scale while the severity weight
/// (~1.0-1.25) and confidence (0-1) terms are not; the scales are
/// intentionally left unnormalized to reproduce the upstream formula.
pub fn daily_score(
    strategic_score: f64,
    propensity_score: f64,
    highest_severity_weight: f64,
    max_recommendation_confidence: f64,
) -> f64 {
    0.35 * strategic_score
        + 0.25 * propensity_score
        + 0.25 * highest_severity_weight
        + 0.15 * max_recommendation_confidence
}

/// Result of the generative re-ranking call over recommendation candidates.
///
/// A failed call degrades to [`RankingOutcome::Fallback`] — candidates are
/// scored on raw semantic similarity alone (`llm_score := semantic_score`) —
/// and never aborts the recommendation stage. A successful call carries the
/// provider's ordering; each candidate's `llm_score` becomes its 0-100
/// strategic score scaled to 0-1.
#[derive(Debug, Clone)]
pub enum RankingOutcome {
    Ranked(Vec<RankedProduct>),
    Fallback { reason: String },
}

impl RankingOutcome {
    /// Resolve the llm-score, rank position, and reasoning for one candidate.
    ///
    /// Candidates missing from a successful ranking response fall back to
    /// their semantic score, with no rank position.
    pub fn resolve(&self, product_id: i64, semantic_score: f64) -> ResolvedRanking {
        match self {
            RankingOutcome::Ranked(products) => {
                match products.iter().position(|p| p.product_id == product_id) {
                    Some(idx) => ResolvedRanking {
                        llm_score: products[idx].strategic_score as f64 / 100.0,
                        llm_rank_position: Some(idx as i64 + 1),
                        reasoning: Some(products[idx].reasoning.clone()),
                    },
                    None => ResolvedRanking {
                        llm_score: semantic_score,
                        llm_rank_position: None,
                        reasoning: None,
                    },
                }
            }
            RankingOutcome::Fallback { .. } => ResolvedRanking {
                llm_score: semantic_score,
                llm_rank_position: None,
                reasoning: None,
            },
        }
    }
}

/// Per-candidate outcome of [`RankingOutcome::resolve`].
#[derive(Debug, Clone)]
pub struct ResolvedRanking {
    pub llm_score: f64,
    pub llm_rank_position: Option<i64>,
    pub reasoning: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(tech: i64, ops: i64, fin: i64) -> InsightScores {
        InsightScores {
            tech_intensity: tech,
            operational_complexity: ops,
            financial_pressure: fin,
        }
    }

    #[test]
    fn test_strategic_score_single_max_insight() {
        // One insight at 5/5/5 -> round(15 * 100 / 75) = 20
        assert_eq!(strategic_score(&[scores(5, 5, 5)]), 20);
    }

    #[test]
    fn test_strategic_score_two_insights() {
        // Sums (6, 4, 2) -> round(12 * 100 / 75) = 16
        assert_eq!(strategic_score(&[scores(3, 2, 1), scores(3, 2, 1)]), 16);
    }

    #[test]
    fn test_strategic_score_empty() {
        assert_eq!(strategic_score(&[]), 0);
    }

    #[test]
    fn test_strategic_score_capped_at_100() {
        // Six insights of 5/5/5 exceed the theoretical ceiling
        let all_max: Vec<InsightScores> = (0..6).map(|_| scores(5, 5, 5)).collect();
        assert_eq!(strategic_score(&all_max), 100);
    }

    #[test]
    fn test_strategic_score_monotonic() {
        let mut previous = 0;
        for total in 0i64..=15 {
            let value = strategic_score(&[scores(total.min(5), (total - 5).clamp(0, 5), (total - 10).clamp(0, 5))]);
            assert!(value >= previous, "score decreased at total={}", total);
            assert!((0..=100).contains(&value));
            previous = value;
        }
    }

    #[test]
    fn test_severity_weight_case_insensitive() {
        assert_eq!(severity_weight("low"), 0.4);
        assert_eq!(severity_weight("Medium"), 0.7);
        assert_eq!(severity_weight("HIGH"), 1.0);
        assert_eq!(severity_weight("critical"), 0.5);
        assert_eq!(severity_weight(""), 0.5);
    }

    #[test]
    fn test_daily_severity_weight_case_insensitive() {
        assert_eq!(daily_severity_weight("HIGH"), 1.25);
        assert_eq!(daily_severity_weight("medium"), 1.1);
        assert_eq!(daily_severity_weight("Low"), 1.0);
        assert_eq!(daily_severity_weight("unknown"), 1.0);
    }

    #[test]
    fn test_strategy_severity_rank() {
        assert_eq!(strategy_severity_rank("High"), 3);
        assert_eq!(strategy_severity_rank("medium"), 2);
        assert_eq!(strategy_severity_rank("low"), 1);
        assert_eq!(strategy_severity_rank("other"), 1);
    }

    #[test]
    fn test_financial_weight_scenarios() {
        assert_eq!(financial_weight(true, true), 1.1);
        assert_eq!(financial_weight(false, true), 0.9);
        assert_eq!(financial_weight(true, false), 1.0);
        assert_eq!(financial_weight(false, false), 1.0);
    }

    #[test]
    fn test_strategic_fit_clamped() {
        // Maximal inputs with the consolidation boost would exceed 1.0
        let fit = strategic_fit(1.0, 1.0, 1.0, 1.0, 1.1);
        assert_eq!(fit, 1.0);

        let fit = strategic_fit(0.0, 0.0, 0.0, 0.0, 0.9);
        assert_eq!(fit, 0.0);
    }

    #[test]
    fn test_strategic_fit_rounds_before_financial_weight() {
        // base = 0.5*0.4 + 0.5*0.25 + 0.7*0.2 + 0.5*0.15 = 0.54 exactly
        let fit = strategic_fit(0.5, 0.5, 0.7, 0.5, 0.9);
        assert!((fit - 0.486).abs() < 1e-9);
    }

    #[test]
    fn test_strategic_fit_in_unit_interval() {
        for &sem in &[0.0, 0.3, 0.99, 1.0] {
            for &llm in &[0.0, 0.5, 1.0] {
                for &fin in &[0.9, 1.0, 1.1] {
                    let fit = strategic_fit(sem, llm, 1.0, 1.0, fin);
                    assert!((0.0..=1.0).contains(&fit), "fit {} out of range", fit);
                }
            }
        }
    }

    #[test]
    fn test_strategic_component_default() {
        assert_eq!(strategic_component(None), 0.5);
        assert_eq!(strategic_component(Some(80)), 0.8);
        assert_eq!(strategic_component(Some(0)), 0.0);
    }

    #[test]
    fn test_daily_score_formula() {
        // 0.35*80 + 0.25*60 + 0.25*1.25 + 0.15*0.9 = 43.4475
        let score = daily_score(80.0, 60.0, 1.25, 0.9);
        assert!((score - 43.4475).abs() < 1e-9);
    }

    #[test]
    fn test_ranking_resolve_ranked() {
        let outcome = RankingOutcome::Ranked(vec![
            RankedProduct {
                product_id: 7,
                strategic_score: 90,
                reasoning: "strong operational match".to_string(),
            },
            RankedProduct {
                product_id: 3,
                strategic_score: 60,
                reasoning: "partial fit".to_string(),
            },
        ]);

        let first = outcome.resolve(7, 0.2);
        assert!((first.llm_score - 0.9).abs() < 1e-9);
        assert_eq!(first.llm_rank_position, Some(1));

        let second = outcome.resolve(3, 0.2);
        assert!((second.llm_score - 0.6).abs() < 1e-9);
        assert_eq!(second.llm_rank_position, Some(2));

        // A candidate the provider ignored keeps its semantic score
        let missing = outcome.resolve(99, 0.42);
        assert!((missing.llm_score - 0.42).abs() < 1e-9);
        assert_eq!(missing.llm_rank_position, None);
    }

    #[test]
    fn test_ranking_resolve_fallback() {
        let outcome = RankingOutcome::Fallback {
            reason: "provider timeout".to_string(),
        };
        let resolved = outcome.resolve(1, 0.73);
        assert!((resolved.llm_score - 0.73).abs() < 1e-9);
        assert_eq!(resolved.llm_rank_position, None);
    }

    #[test]
    fn test_round4() {
        assert_eq!(round4(0.123456), 0.1235);
        assert_eq!(round4(0.12344), 0.1234);
        assert_eq!(round4(1.0), 1.0);
    }
}
