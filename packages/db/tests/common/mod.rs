#![allow(dead_code)]

use db::{Database, DbConfig, DbError, JobStore, StatsRepository};
use queue_core::Requester;

/// Fresh in-memory datastore per test; no shared state between tests.
pub async fn setup_db() -> Result<Database, DbError> {
    db::init(&DbConfig::memory()).await
}

pub async fn setup_store() -> Result<JobStore, DbError> {
    Ok(JobStore::new(setup_db().await?))
}

pub async fn setup_stats() -> Result<StatsRepository, DbError> {
    Ok(StatsRepository::new(setup_db().await?))
}

pub fn requester(n: i64) -> Requester {
    Requester::new(100 + n, 200 + n).replying_to(n)
}

pub fn url(n: i64) -> String {
    format!("https://www.instagram.com/reel/{n}")
}
