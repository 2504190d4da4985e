//! SQLite-backed [`Store`] implementation.
//!
//! Maps each repository operation to one or more SQL statements. Batch
//! replacement (recommendations) runs inside a transaction so regeneration
//! is atomic; the strategy upsert is backed by the `UNIQUE(analysis_id)`
//! constraint.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use prospector_core::models::{
    Analysis, AnalysisStatus, Company, Insight, NewInsight, NewRecommendation,
    NewResearchDocument, Product, Recommendation, ResearchDocument, SalesStrategy,
    StrategyContent,
};
use prospector_core::store::Store;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_analysis(row: &sqlx::sqlite::SqliteRow) -> Result<Analysis> {
    let status: String = row.get("status");
    Ok(Analysis {
        id: row.get("id"),
        user_id: row.get("user_id"),
        company_id: row.get("company_id"),
        status: AnalysisStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown analysis status: {}", status))?,
        strategic_score: row.get("strategic_score"),
        propensity_score: row.get("propensity_score"),
        deal_stage: row.get("deal_stage"),
        error_stage: row.get("error_stage"),
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_recommendation(row: &sqlx::sqlite::SqliteRow) -> Recommendation {
    let accepted: Option<i64> = row.get("is_accepted");
    Recommendation {
        id: row.get("id"),
        insight_id: row.get("insight_id"),
        product_id: row.get("product_id"),
        match_percentage: row.get("match_percentage"),
        strategic_fit: row.get("strategic_fit"),
        confidence_score: row.get("confidence_score"),
        priority_rank: row.get("priority_rank"),
        llm_rank_position: row.get("llm_rank_position"),
        reasoning: row.get("reasoning"),
        is_accepted: accepted.map(|v| v != 0),
    }
}

fn row_to_product(row: &sqlx::sqlite::SqliteRow) -> Product {
    Product {
        id: row.get("id"),
        name: row.get("name"),
        category: row.get("category"),
        description: row.get("description"),
        value_proposition: row.get("value_proposition"),
        content_hash: row.get("content_hash"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn find_or_create_company(&self, name: &str, domain: Option<&str>) -> Result<Company> {
        let existing = sqlx::query("SELECT id, name, domain FROM companies WHERE name = ? COLLATE NOCASE")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = existing {
            return Ok(Company {
                id: row.get("id"),
                name: row.get("name"),
                domain: row.get("domain"),
            });
        }

        let result = sqlx::query("INSERT INTO companies (name, domain) VALUES (?, ?)")
            .bind(name)
            .bind(domain)
            .execute(&self.pool)
            .await?;

        Ok(Company {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            domain: domain.map(|d| d.to_string()),
        })
    }

    async fn get_company(&self, id: i64) -> Result<Option<Company>> {
        let row = sqlx::query("SELECT id, name, domain FROM companies WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| Company {
            id: r.get("id"),
            name: r.get("name"),
            domain: r.get("domain"),
        }))
    }

    async fn create_analysis(
        &self,
        user_id: i64,
        company_id: i64,
        propensity_score: i64,
        deal_stage: Option<&str>,
    ) -> Result<Analysis> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO analyses (user_id, company_id, status, propensity_score, deal_stage, created_at, updated_at)
            VALUES (?, ?, 'pending', ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(company_id)
        .bind(propensity_score)
        .bind(deal_stage)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Analysis {
            id: result.last_insert_rowid(),
            user_id,
            company_id,
            status: AnalysisStatus::Pending,
            strategic_score: None,
            propensity_score,
            deal_stage: deal_stage.map(|s| s.to_string()),
            error_stage: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_analysis(&self, id: i64) -> Result<Option<Analysis>> {
        let row = sqlx::query("SELECT * FROM analyses WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_analysis(&r)).transpose()
    }

    async fn find_active_analysis(
        &self,
        user_id: i64,
        company_id: i64,
    ) -> Result<Option<Analysis>> {
        let row = sqlx::query(
            "SELECT * FROM analyses WHERE user_id = ? AND company_id = ? AND status != 'completed' LIMIT 1",
        )
        .bind(user_id)
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_analysis(&r)).transpose()
    }

    async fn update_analysis_status(&self, id: i64, status: AnalysisStatus) -> Result<()> {
        sqlx::query("UPDATE analyses SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(chrono::Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_analysis_failed(&self, id: i64, stage: &str, message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE analyses SET status = 'failed', error_stage = ?, error_message = ?, updated_at = ? WHERE id = ?",
        )
        .bind(stage)
        .bind(message)
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_strategic_score(&self, id: i64, score: i64) -> Result<()> {
        sqlx::query("UPDATE analyses SET strategic_score = ?, updated_at = ? WHERE id = ?")
            .bind(score)
            .bind(chrono::Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_completed_analyses(&self, user_id: i64) -> Result<Vec<Analysis>> {
        let rows = sqlx::query(
            "SELECT * FROM analyses WHERE user_id = ? AND status = 'completed' ORDER BY id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_analysis).collect()
    }

    async fn delete_analysis(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM insight_sources WHERE insight_id IN (SELECT id FROM insights WHERE analysis_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM recommendations WHERE insight_id IN (SELECT id FROM insights WHERE analysis_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM insights WHERE analysis_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM research_documents WHERE analysis_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sales_strategies WHERE analysis_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM analyses WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn insert_research_document(&self, doc: NewResearchDocument) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO research_documents (analysis_id, title, source_url, raw_content, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(doc.analysis_id)
        .bind(&doc.title)
        .bind(&doc.source_url)
        .bind(&doc.raw_content)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn set_document_embedding_id(&self, document_id: i64, embedding_id: &str) -> Result<()> {
        sqlx::query("UPDATE research_documents SET embedding_id = ? WHERE id = ?")
            .bind(embedding_id)
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_research_document(&self, id: i64) -> Result<Option<ResearchDocument>> {
        let row = sqlx::query("SELECT * FROM research_documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| ResearchDocument {
            id: r.get("id"),
            analysis_id: r.get("analysis_id"),
            title: r.get("title"),
            source_url: r.get("source_url"),
            raw_content: r.get("raw_content"),
            embedding_id: r.get("embedding_id"),
            created_at: r.get("created_at"),
        }))
    }

    async fn insert_insight(&self, insight: NewInsight) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO insights (analysis_id, title, description, category, severity) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(insight.analysis_id)
        .bind(&insight.title)
        .bind(&insight.description)
        .bind(&insight.category)
        .bind(&insight.severity)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn insert_insight_source(
        &self,
        insight_id: i64,
        research_document_id: i64,
        snippet: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO insight_sources (insight_id, research_document_id, snippet) VALUES (?, ?, ?)",
        )
        .bind(insight_id)
        .bind(research_document_id)
        .bind(snippet)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_insight(&self, id: i64) -> Result<Option<Insight>> {
        let row = sqlx::query("SELECT * FROM insights WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| Insight {
            id: r.get("id"),
            analysis_id: r.get("analysis_id"),
            title: r.get("title"),
            description: r.get("description"),
            category: r.get("category"),
            severity: r.get("severity"),
        }))
    }

    async fn list_insights(&self, analysis_id: i64) -> Result<Vec<Insight>> {
        let rows = sqlx::query("SELECT * FROM insights WHERE analysis_id = ? ORDER BY id ASC")
            .bind(analysis_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|r| Insight {
                id: r.get("id"),
                analysis_id: r.get("analysis_id"),
                title: r.get("title"),
                description: r.get("description"),
                category: r.get("category"),
                severity: r.get("severity"),
            })
            .collect())
    }

    async fn replace_recommendations(
        &self,
        insight_id: i64,
        recommendations: &[NewRecommendation],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM recommendations WHERE insight_id = ?")
            .bind(insight_id)
            .execute(&mut *tx)
            .await?;

        for rec in recommendations {
            sqlx::query(
                r#"
                INSERT INTO recommendations
                    (insight_id, product_id, match_percentage, strategic_fit, confidence_score,
                     priority_rank, llm_rank_position, reasoning)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(rec.insight_id)
            .bind(rec.product_id)
            .bind(rec.match_percentage)
            .bind(rec.strategic_fit)
            .bind(rec.confidence_score)
            .bind(rec.priority_rank)
            .bind(rec.llm_rank_position)
            .bind(&rec.reasoning)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_recommendations(&self, analysis_id: i64) -> Result<Vec<Recommendation>> {
        let rows = sqlx::query(
            r#"
            SELECT r.* FROM recommendations r
            JOIN insights i ON r.insight_id = i.id
            WHERE i.analysis_id = ?
            ORDER BY r.insight_id ASC, r.priority_rank ASC
            "#,
        )
        .bind(analysis_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_recommendation).collect())
    }

    async fn list_accepted_recommendations(
        &self,
        analysis_id: i64,
    ) -> Result<Vec<Recommendation>> {
        let rows = sqlx::query(
            r#"
            SELECT r.* FROM recommendations r
            JOIN insights i ON r.insight_id = i.id
            WHERE i.analysis_id = ? AND r.is_accepted = 1
            ORDER BY r.insight_id ASC, r.priority_rank ASC
            "#,
        )
        .bind(analysis_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_recommendation).collect())
    }

    async fn set_recommendation_acceptance(
        &self,
        recommendation_id: i64,
        accepted: Option<bool>,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE recommendations SET is_accepted = ? WHERE id = ?")
            .bind(accepted.map(|b| b as i64))
            .bind(recommendation_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn max_recommendation_confidence(&self, analysis_id: i64) -> Result<Option<f64>> {
        let value: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT MAX(r.confidence_score) FROM recommendations r
            JOIN insights i ON r.insight_id = i.id
            WHERE i.analysis_id = ?
            "#,
        )
        .bind(analysis_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(value)
    }

    async fn upsert_strategy(&self, analysis_id: i64, content: &StrategyContent) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO sales_strategies
                (analysis_id, status, overview, priority_initiatives, financial_positioning,
                 technical_summary, objection_handling, executive_version, email_version,
                 generated_by_llm, created_at, updated_at)
            VALUES (?, 'generated', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(analysis_id) DO UPDATE SET
                status = 'generated',
                overview = excluded.overview,
                priority_initiatives = excluded.priority_initiatives,
                financial_positioning = excluded.financial_positioning,
                technical_summary = excluded.technical_summary,
                objection_handling = excluded.objection_handling,
                executive_version = excluded.executive_version,
                email_version = excluded.email_version,
                generated_by_llm = excluded.generated_by_llm,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(analysis_id)
        .bind(&content.overview)
        .bind(&content.priority_initiatives)
        .bind(&content.financial_positioning)
        .bind(&content.technical_summary)
        .bind(&content.objection_handling)
        .bind(&content.executive_version)
        .bind(&content.email_version)
        .bind(content.generated_by_llm)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_strategy(&self, analysis_id: i64) -> Result<Option<SalesStrategy>> {
        let row = sqlx::query("SELECT * FROM sales_strategies WHERE analysis_id = ?")
            .bind(analysis_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| {
            let generated: i64 = r.get("generated_by_llm");
            SalesStrategy {
                id: r.get("id"),
                analysis_id: r.get("analysis_id"),
                status: r.get("status"),
                overview: r.get("overview"),
                priority_initiatives: r.get("priority_initiatives"),
                financial_positioning: r.get("financial_positioning"),
                technical_summary: r.get("technical_summary"),
                objection_handling: r.get("objection_handling"),
                executive_version: r.get("executive_version"),
                email_version: r.get("email_version"),
                generated_by_llm: generated != 0,
                created_at: r.get("created_at"),
                updated_at: r.get("updated_at"),
            }
        }))
    }

    async fn upsert_product(
        &self,
        name: &str,
        category: &str,
        description: &str,
        value_proposition: &str,
    ) -> Result<Product> {
        sqlx::query(
            r#"
            INSERT INTO products (name, category, description, value_proposition)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                category = excluded.category,
                description = excluded.description,
                value_proposition = excluded.value_proposition
            "#,
        )
        .bind(name)
        .bind(category)
        .bind(description)
        .bind(value_proposition)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM products WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;

        Ok(row_to_product(&row))
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT * FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_product(&r)))
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query("SELECT * FROM products ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_product).collect())
    }

    async fn set_product_content_hash(&self, id: i64, hash: &str) -> Result<()> {
        sqlx::query("UPDATE products SET content_hash = ? WHERE id = ?")
            .bind(hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
