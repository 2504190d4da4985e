//! # Prospector Core
//!
//! Shared logic for Prospector: data models, the scoring library, provider
//! traits, store abstraction, and task-queue contract.
//!
//! This crate contains no tokio, sqlx, network, or filesystem dependencies.
//! The application crate (`prospector`) supplies concrete implementations:
//! SQLite storage, HTTP providers, and the queue worker.

pub mod embedding;
pub mod error;
pub mod models;
pub mod provider;
pub mod queue;
pub mod scoring;
pub mod store;
