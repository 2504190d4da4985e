//! Typed stage messages and the task-queue contract.
//!
//! Stages never await each other inline: completion is signaled only by
//! enqueueing the next stage's task. Delivery is at-least-once with no
//! ordering guarantee across analyses. Every task carries an idempotency
//! key (analysis id + stage name, plus insight id for recommendation tasks)
//! so consumers can add dedup later without changing the message shape.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which pipeline stage a task drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Research,
    Insight,
    Recommendation,
    Strategy,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Research => "research",
            StageKind::Insight => "insight",
            StageKind::Recommendation => "recommendation",
            StageKind::Strategy => "strategy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "research" => Some(StageKind::Research),
            "insight" => Some(StageKind::Insight),
            "recommendation" => Some(StageKind::Recommendation),
            "strategy" => Some(StageKind::Strategy),
            _ => None,
        }
    }
}

/// One unit of pipeline work: a stage applied to an analysis (and, for
/// recommendation tasks, one insight).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTask {
    pub kind: StageKind,
    pub analysis_id: i64,
    pub insight_id: Option<i64>,
}

impl StageTask {
    pub fn research(analysis_id: i64) -> Self {
        Self {
            kind: StageKind::Research,
            analysis_id,
            insight_id: None,
        }
    }

    pub fn insight(analysis_id: i64) -> Self {
        Self {
            kind: StageKind::Insight,
            analysis_id,
            insight_id: None,
        }
    }

    pub fn recommendation(analysis_id: i64, insight_id: i64) -> Self {
        Self {
            kind: StageKind::Recommendation,
            analysis_id,
            insight_id: Some(insight_id),
        }
    }

    pub fn strategy(analysis_id: i64) -> Self {
        Self {
            kind: StageKind::Strategy,
            analysis_id,
            insight_id: None,
        }
    }

    /// Stable key identifying this unit of work across redeliveries.
    pub fn idempotency_key(&self) -> String {
        match self.insight_id {
            Some(insight_id) => {
                format!("{}:{}:{}", self.analysis_id, self.kind.as_str(), insight_id)
            }
            None => format!("{}:{}", self.analysis_id, self.kind.as_str()),
        }
    }
}

/// Asynchronous task queue with at-least-once delivery.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a stage task. Returns once the task is durably recorded;
    /// execution happens later on a worker.
    async fn enqueue(&self, task: StageTask) -> Result<()>;

    /// Count queued or in-flight tasks of a kind for an analysis, excluding
    /// the task with the given idempotency key. Used by the recommendation
    /// fan-in to detect the last finishing task.
    async fn pending_count(
        &self,
        kind: StageKind,
        analysis_id: i64,
        exclude_key: Option<&str>,
    ) -> Result<usize>;
}
