use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema. Idempotent — safe to run on every `prospect init`.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS companies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            domain TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analyses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            company_id INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            strategic_score INTEGER,
            propensity_score INTEGER NOT NULL DEFAULT 0,
            deal_stage TEXT,
            error_stage TEXT,
            error_message TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (company_id) REFERENCES companies(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS research_documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            analysis_id INTEGER NOT NULL,
            title TEXT,
            source_url TEXT,
            raw_content TEXT NOT NULL,
            embedding_id TEXT,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (analysis_id) REFERENCES analyses(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS insights (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            analysis_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT '',
            severity TEXT NOT NULL DEFAULT 'medium',
            FOREIGN KEY (analysis_id) REFERENCES analyses(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS insight_sources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            insight_id INTEGER NOT NULL,
            research_document_id INTEGER NOT NULL,
            snippet TEXT NOT NULL DEFAULT '',
            FOREIGN KEY (insight_id) REFERENCES insights(id),
            FOREIGN KEY (research_document_id) REFERENCES research_documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            category TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            value_proposition TEXT NOT NULL DEFAULT '',
            content_hash TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recommendations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            insight_id INTEGER NOT NULL,
            product_id INTEGER NOT NULL,
            match_percentage INTEGER NOT NULL,
            strategic_fit REAL NOT NULL,
            confidence_score REAL NOT NULL,
            priority_rank INTEGER NOT NULL,
            llm_rank_position INTEGER,
            reasoning TEXT NOT NULL DEFAULT '',
            is_accepted INTEGER,
            FOREIGN KEY (insight_id) REFERENCES insights(id),
            FOREIGN KEY (product_id) REFERENCES products(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sales_strategies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            analysis_id INTEGER NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'generated',
            overview TEXT,
            priority_initiatives TEXT NOT NULL DEFAULT '[]',
            financial_positioning TEXT,
            technical_summary TEXT,
            objection_handling TEXT NOT NULL DEFAULT '[]',
            executive_version TEXT,
            email_version TEXT,
            generated_by_llm INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (analysis_id) REFERENCES analyses(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vectors (
            namespace TEXT NOT NULL,
            id TEXT NOT NULL,
            embedding BLOB NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            PRIMARY KEY (namespace, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            analysis_id INTEGER NOT NULL,
            insight_id INTEGER,
            idempotency_key TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            claimed_by TEXT,
            error TEXT,
            enqueued_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_analyses_user_company ON analyses(user_id, company_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_analysis ON research_documents(analysis_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_insights_analysis ON insights(analysis_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_recommendations_insight ON recommendations(insight_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status, id)")
        .execute(pool)
        .await?;

    Ok(())
}
