//! SQLite-backed [`VectorIndex`] implementation.
//!
//! Vectors are stored as little-endian f32 blobs in a single namespaced
//! table. Queries load the namespace and compute cosine similarity in Rust,
//! sorting descending and truncating to top-k — the catalog and per-analysis
//! namespaces are small enough that brute force beats an ANN index here.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use prospector_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use prospector_core::provider::{VectorIndex, VectorMatch};

pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        metadata: serde_json::Value,
        namespace: &str,
    ) -> Result<()> {
        let blob = vec_to_blob(vector);
        sqlx::query(
            r#"
            INSERT INTO vectors (namespace, id, embedding, metadata_json)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(namespace, id) DO UPDATE SET
                embedding = excluded.embedding,
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(namespace)
        .bind(id)
        .bind(&blob)
        .bind(metadata.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        namespace: &str,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>> {
        let rows = sqlx::query("SELECT id, embedding, metadata_json FROM vectors WHERE namespace = ?")
            .bind(namespace)
            .fetch_all(&self.pool)
            .await?;

        let mut matches: Vec<VectorMatch> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = blob_to_vec(&blob);
                let metadata_json: String = row.get("metadata_json");
                VectorMatch {
                    id: row.get("id"),
                    score: cosine_similarity(vector, &stored) as f64,
                    metadata: serde_json::from_str(&metadata_json)
                        .unwrap_or(serde_json::json!({})),
                }
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);

        Ok(matches)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        sqlx::query("DELETE FROM vectors WHERE namespace = ?")
            .bind(namespace)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
