//! SQLite-backed task queue and the polling worker.
//!
//! Delivery is at-least-once: `enqueue` durably records a pending row, the
//! worker claims the oldest due task, and running tasks whose claim outlives
//! the visibility timeout are reclaimed (redelivered) after a crash. There
//! is no ordering guarantee across analyses.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{error, info, warn};
use uuid::Uuid;

use prospector_core::queue::{StageKind, StageTask, TaskQueue};

use crate::config::QueueConfig;
use crate::pipeline::Pipeline;

pub struct SqliteTaskQueue {
    pool: SqlitePool,
}

impl SqliteTaskQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskQueue for SqliteTaskQueue {
    async fn enqueue(&self, task: StageTask) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO tasks (kind, analysis_id, insight_id, idempotency_key, status, enqueued_at, updated_at)
            VALUES (?, ?, ?, ?, 'pending', ?, ?)
            "#,
        )
        .bind(task.kind.as_str())
        .bind(task.analysis_id)
        .bind(task.insight_id)
        .bind(task.idempotency_key())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pending_count(
        &self,
        kind: StageKind,
        analysis_id: i64,
        exclude_key: Option<&str>,
    ) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM tasks
            WHERE kind = ? AND analysis_id = ?
              AND status IN ('pending', 'running')
              AND idempotency_key != COALESCE(?, '')
            "#,
        )
        .bind(kind.as_str())
        .bind(analysis_id)
        .bind(exclude_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as usize)
    }
}

/// One task claimed by the worker.
struct ClaimedTask {
    id: i64,
    task: StageTask,
}

/// Polls the task table and drives pipeline stages.
///
/// Each claimed task runs to completion before the next poll; concurrency
/// comes from running multiple worker processes against the same database.
pub struct Worker {
    pool: SqlitePool,
    pipeline: Arc<Pipeline>,
    worker_id: String,
    poll_interval: Duration,
    visibility_timeout_secs: i64,
}

impl Worker {
    pub fn new(pool: SqlitePool, pipeline: Arc<Pipeline>, config: &QueueConfig) -> Self {
        Self {
            pool,
            pipeline,
            worker_id: Uuid::new_v4().to_string(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            visibility_timeout_secs: config.visibility_timeout_secs,
        }
    }

    /// Run the worker loop indefinitely.
    pub async fn run(&self) -> Result<()> {
        info!(worker_id = %self.worker_id, "worker started");
        loop {
            match self.claim_next().await {
                Ok(Some(claimed)) => self.process(claimed).await,
                Ok(None) => tokio::time::sleep(self.poll_interval).await,
                Err(err) => {
                    error!(error = %err, "failed to claim task");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Process tasks until the queue is empty. Returns the number of tasks
    /// processed.
    pub async fn run_until_drained(&self) -> Result<u64> {
        let mut processed = 0u64;
        while let Some(claimed) = self.claim_next().await? {
            self.process(claimed).await;
            processed += 1;
        }
        Ok(processed)
    }

    /// Claim the oldest due task: pending, or running past the visibility
    /// timeout (crash redelivery).
    async fn claim_next(&self) -> Result<Option<ClaimedTask>> {
        let now = chrono::Utc::now().timestamp();
        let stale_before = now - self.visibility_timeout_secs;

        let row = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'running', attempts = attempts + 1, claimed_by = ?, updated_at = ?
            WHERE id = (
                SELECT id FROM tasks
                WHERE status = 'pending' OR (status = 'running' AND updated_at < ?)
                ORDER BY id ASC
                LIMIT 1
            )
            RETURNING id, kind, analysis_id, insight_id
            "#,
        )
        .bind(&self.worker_id)
        .bind(now)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let kind: String = row.get("kind");
        let kind =
            StageKind::parse(&kind).ok_or_else(|| anyhow!("unknown task kind: {}", kind))?;

        Ok(Some(ClaimedTask {
            id: row.get("id"),
            task: StageTask {
                kind,
                analysis_id: row.get("analysis_id"),
                insight_id: row.get("insight_id"),
            },
        }))
    }

    async fn process(&self, claimed: ClaimedTask) {
        let key = claimed.task.idempotency_key();
        info!(task_id = claimed.id, task = %key, "processing task");

        match self.pipeline.dispatch(&claimed.task).await {
            Ok(()) => {
                if let Err(err) = self.finish(claimed.id, "done", None).await {
                    error!(task_id = claimed.id, error = %err, "failed to mark task done");
                }
            }
            Err(err) => {
                warn!(task_id = claimed.id, task = %key, error = %err, "task failed");
                if let Err(mark_err) = self.finish(claimed.id, "failed", Some(&err.to_string())).await
                {
                    error!(task_id = claimed.id, error = %mark_err, "failed to mark task failed");
                }
            }
        }
    }

    async fn finish(&self, task_id: i64, status: &str, error_text: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE tasks SET status = ?, error = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(error_text)
            .bind(chrono::Utc::now().timestamp())
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
