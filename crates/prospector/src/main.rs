//! # Prospector CLI (`prospect`)
//!
//! The `prospect` binary drives the analysis pipeline: database setup,
//! analysis creation, the queue worker, progress inspection, recommendation
//! acceptance, strategy generation, daily prioritization, and product
//! catalog management.
//!
//! ## Usage
//!
//! ```bash
//! prospect --config ./config/prospector.toml <command>
//! ```
//!
//! ## Typical flow
//!
//! ```bash
//! prospect init                                  # create database
//! prospect catalog sync ./config/catalog.toml    # load products
//! prospect catalog index                         # embed + index products
//! prospect analyze --user 1 "Acme Corp" --url https://acme.example
//! prospect worker                                # run pipeline stages
//! prospect status 1                              # progress percentage
//! prospect show 1                                # insights + recommendations
//! prospect accept 12                             # accept a recommendation
//! prospect strategy 1                            # generate the strategy
//! prospect daily --user 1                        # top accounts today
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use prospector::analysis::{self, CreateAnalysisRequest};
use prospector::catalog;
use prospector::config::{self, Config};
use prospector::daily;
use prospector::pipeline::Pipeline;
use prospector::providers;
use prospector::queue::{SqliteTaskQueue, Worker};
use prospector::sqlite_store::SqliteStore;
use prospector::vector_index::SqliteVectorIndex;
use prospector::{db, migrate};

use prospector_core::provider::VectorIndex;
use prospector_core::queue::TaskQueue;
use prospector_core::store::Store;

/// Prospector — an AI-assisted strategic account analysis pipeline.
#[derive(Parser)]
#[command(
    name = "prospect",
    about = "Prospector — turn a company identifier into a persisted strategic sales narrative",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/prospector.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Create an analysis for a company and enqueue the research stage.
    ///
    /// Rejects with a conflict when an analysis for the same user and
    /// company is still in progress.
    Analyze {
        /// Company name.
        company: String,

        /// Owning user id.
        #[arg(long)]
        user: i64,

        /// Company website URL; its normalized domain scopes the research
        /// queries.
        #[arg(long)]
        url: Option<String>,

        /// Initial propensity-to-buy score (0-100).
        #[arg(long, default_value_t = 0)]
        propensity: i64,

        /// Deal lifecycle flag; "consolidation" activates financial
        /// weighting in recommendation ranking.
        #[arg(long)]
        deal_stage: Option<String>,
    },

    /// Run the queue worker, executing pipeline stages as tasks arrive.
    Worker {
        /// Process queued tasks and exit instead of polling forever.
        #[arg(long)]
        drain: bool,
    },

    /// Show an analysis's status and progress percentage.
    Status {
        /// Analysis id.
        id: i64,
    },

    /// Show an analysis in full: scores, insights, recommendations, and
    /// strategy.
    Show {
        /// Analysis id.
        id: i64,
    },

    /// Accept (or reject) a recommendation.
    Accept {
        /// Recommendation id.
        id: i64,

        /// Mark the recommendation rejected instead of accepted.
        #[arg(long)]
        reject: bool,
    },

    /// Validate preconditions and enqueue strategy generation.
    Strategy {
        /// Analysis id.
        id: i64,
    },

    /// Delete an analysis, its child records, and its research vectors.
    Delete {
        /// Analysis id.
        id: i64,
    },

    /// Rank a user's completed analyses for today's top accounts.
    Daily {
        /// User id.
        #[arg(long)]
        user: i64,

        /// Maximum entries to return (defaults to the configured limit).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Manage the product catalog.
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// Load or update products from a TOML file.
    Sync {
        /// Path to the catalog TOML file.
        path: PathBuf,
    },

    /// Embed and index products whose content changed.
    Index,
}

struct App {
    store: Arc<dyn Store>,
    queue: Arc<dyn TaskQueue>,
    vectors: Arc<dyn VectorIndex>,
    pool: sqlx::SqlitePool,
}

async fn open(config: &Config) -> anyhow::Result<App> {
    let pool = db::connect(config).await?;
    Ok(App {
        store: Arc::new(SqliteStore::new(pool.clone())),
        queue: Arc::new(SqliteTaskQueue::new(pool.clone())),
        vectors: Arc::new(SqliteVectorIndex::new(pool.clone())),
        pool,
    })
}

fn build_pipeline(config: &Config, app: &App) -> anyhow::Result<Arc<Pipeline>> {
    Ok(Arc::new(Pipeline::new(
        app.store.clone(),
        app.queue.clone(),
        providers::create_search_provider(config)?,
        providers::create_embedding_provider(config)?,
        app.vectors.clone(),
        providers::create_generative_provider(config)?,
        config.ranking.clone(),
        config.search.max_results,
    )))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Analyze {
            company,
            user,
            url,
            propensity,
            deal_stage,
        } => {
            let app = open(&cfg).await?;
            let created = analysis::create_analysis(
                &app.store,
                &app.queue,
                CreateAnalysisRequest {
                    user_id: user,
                    company_name: company,
                    website_url: url,
                    propensity_score: propensity,
                    deal_stage,
                },
            )
            .await?;
            println!("analysis {} created (status: {})", created.id, created.status.as_str());
            app.pool.close().await;
        }
        Commands::Worker { drain } => {
            let app = open(&cfg).await?;
            let pipeline = build_pipeline(&cfg, &app)?;
            let worker = Worker::new(app.pool.clone(), pipeline, &cfg.queue);
            if drain {
                let processed = worker.run_until_drained().await?;
                println!("processed {} tasks", processed);
                app.pool.close().await;
            } else {
                worker.run().await?;
            }
        }
        Commands::Status { id } => {
            let app = open(&cfg).await?;
            let (found, progress) = analysis::progress(&app.store, id).await?;
            println!("analysis {}", found.id);
            println!("  status: {}", found.status.as_str());
            println!("  progress: {}%", progress);
            if let Some(score) = found.strategic_score {
                println!("  strategic score: {}", score);
            }
            println!("  propensity score: {}", found.propensity_score);
            if let Some(stage) = &found.error_stage {
                println!("  error stage: {}", stage);
            }
            if let Some(message) = &found.error_message {
                println!("  error: {}", message);
            }
            app.pool.close().await;
        }
        Commands::Show { id } => {
            let app = open(&cfg).await?;
            let (found, progress) = analysis::progress(&app.store, id).await?;
            println!(
                "analysis {} — status {} ({}%)",
                found.id,
                found.status.as_str(),
                progress
            );
            println!(
                "  strategic score: {}   propensity score: {}",
                found
                    .strategic_score
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                found.propensity_score
            );

            let insights = app.store.list_insights(id).await?;
            println!("  insights: {}", insights.len());
            for insight in &insights {
                println!(
                    "    [{}] ({}) {}",
                    insight.id, insight.severity, insight.title
                );
            }

            let recommendations = app.store.list_recommendations(id).await?;
            println!("  recommendations: {}", recommendations.len());
            for rec in &recommendations {
                let accepted = match rec.is_accepted {
                    Some(true) => "accepted",
                    Some(false) => "rejected",
                    None => "pending",
                };
                println!(
                    "    [{}] insight {} -> product {} | match {}% | rank {} | {}",
                    rec.id,
                    rec.insight_id,
                    rec.product_id,
                    rec.match_percentage,
                    rec.priority_rank,
                    accepted
                );
            }

            if let Some(strategy) = app.store.get_strategy(id).await? {
                println!("  strategy: {} (updated {})", strategy.status, strategy.updated_at);
                if let Some(overview) = &strategy.overview {
                    println!("    overview: {}", overview);
                }
            } else {
                println!("  strategy: none");
            }
            app.pool.close().await;
        }
        Commands::Accept { id, reject } => {
            let app = open(&cfg).await?;
            analysis::set_acceptance(&app.store, id, Some(!reject)).await?;
            println!(
                "recommendation {} {}",
                id,
                if reject { "rejected" } else { "accepted" }
            );
            app.pool.close().await;
        }
        Commands::Strategy { id } => {
            let app = open(&cfg).await?;
            analysis::request_strategy(&app.store, &app.queue, id).await?;
            println!("strategy generation enqueued for analysis {}", id);
            app.pool.close().await;
        }
        Commands::Delete { id } => {
            let app = open(&cfg).await?;
            analysis::delete_analysis(&app.store, &app.vectors, id).await?;
            println!("analysis {} deleted", id);
            app.pool.close().await;
        }
        Commands::Daily { user, limit } => {
            let app = open(&cfg).await?;
            let limit = limit.unwrap_or(cfg.daily.limit);
            let ranked = daily::generate_daily_top(app.store.as_ref(), user, limit).await?;
            if ranked.is_empty() {
                println!("No completed analyses.");
            }
            for (index, entry) in ranked.iter().enumerate() {
                println!(
                    "{}. analysis {} (company {}) — {:.4}",
                    index + 1,
                    entry.analysis_id,
                    entry.company_id,
                    entry.daily_score
                );
            }
            app.pool.close().await;
        }
        Commands::Catalog { action } => match action {
            CatalogAction::Sync { path } => {
                let app = open(&cfg).await?;
                let count = catalog::sync_catalog(&app.store, &path).await?;
                println!("synced {} products", count);
                app.pool.close().await;
            }
            CatalogAction::Index => {
                let app = open(&cfg).await?;
                let embeddings = providers::create_embedding_provider(&cfg)?;
                let summary = catalog::index_products(&app.store, &embeddings, &app.vectors).await?;
                println!(
                    "catalog index: {} total, {} indexed, {} skipped, {} failed",
                    summary.total, summary.indexed, summary.skipped, summary.failed
                );
                app.pool.close().await;
            }
        },
    }

    Ok(())
}
