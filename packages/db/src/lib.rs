//! SurrealDB integration for the job queue system.
//!
//! This crate provides the durable job store that every worker claims
//! from, plus the reporting tables used for statistics.
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
mod error;
mod retry;
mod schema;
pub mod repositories;

pub use connection::{Database, DbConfig, connect};
pub use error::DbError;
pub use repositories::{Enqueued, JobStore, StatsRepository};
pub use retry::ContentionPolicy;
pub use schema::init_schema;

/// Connect and initialize the schema.
///
/// Returns a handle that can be cloned into every store and worker.
pub async fn init(config: &DbConfig) -> Result<Database, DbError> {
    let db = connect(config).await?;
    init_schema(&db).await?;
    Ok(db)
}
