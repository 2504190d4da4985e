//! # Prospector
//!
//! An AI-assisted strategic account analysis pipeline. One analysis run
//! turns a company identifier into a persisted sales narrative through four
//! asynchronously dispatched stages:
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌───────────────┐   ┌──────────┐
//! │ Research │──▶│ Insight │──▶│ Recommendation │──▶│ Strategy │
//! │ web+embed│   │ extract │   │ hybrid ranking │   │ synthesis│
//! └──────────┘   └─────────┘   └───────────────┘   └──────────┘
//!       ▲              stages chained via the task queue
//!       │
//!  prospect analyze
//! ```
//!
//! Stages commit their own writes, advance the analysis status, and enqueue
//! the next stage; a failure marks the analysis failed with the stage name
//! and cause. Recommendation ranking blends semantic similarity, generative
//! re-ranking (with a semantic-only fallback), severity, and financial
//! alignment into a single strategic-fit score.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite repository |
//! | [`vector_index`] | Namespaced vector similarity index |
//! | [`providers`] | HTTP search/embedding/generative providers |
//! | [`queue`] | Task queue and worker loop |
//! | [`pipeline`] | Orchestrator and the four stages |
//! | [`analysis`] | Caller-facing entry points |
//! | [`daily`] | Daily prioritization |
//! | [`catalog`] | Product catalog sync and indexing |

pub mod analysis;
pub mod catalog;
pub mod config;
pub mod daily;
pub mod db;
pub mod migrate;
pub mod pipeline;
pub mod providers;
pub mod queue;
pub mod sqlite_store;
pub mod vector_index;
