//! Postgres → Elasticsearch sync pipeline built on the transactional
//! outbox pattern.
//!
//! Producers mutate a business row and append a change event to the
//! `outbox_events` table in the same transaction. A background sync worker
//! claims unprocessed events under `FOR UPDATE SKIP LOCKED`, projects each
//! one into an index document and submits it through a long-lived bulk
//! dispatcher. Failed deliveries land in `dead_letter_events`, where a
//! retry worker and the admin surface can re-drive them.
//!
//! # Modules
//!
//! - `config`: environment configuration
//! - `db`: connection pool, embedded migrations, repositories, seed data
//! - `search`: Elasticsearch client, index bootstrap, projectors, bulk dispatcher
//! - `workers`: sync worker and dead-letter retry worker
//! - `services`: transactional producers (entity write + outbox append)
//! - `handlers`: admin HTTP surface
//! - `metrics`: process-wide Prometheus counters
//! - `error`: error types and HTTP mapping

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod search;
pub mod services;
pub mod workers;

pub use config::Config;
pub use error::{AppError, SyncError};
