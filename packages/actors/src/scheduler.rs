//! Producer-side façade over the job store.

use chrono::Utc;
use db::{DbError, Enqueued, JobStore};
use queue_core::{JobEvent, QueueCounts, Requester};
use tokio::sync::broadcast;

/// Enqueue and status reporting for the messaging side.
///
/// Adds no policy of its own: ordering and atomicity come from the store.
#[derive(Debug, Clone)]
pub struct Scheduler {
    store: JobStore,
    events: Option<broadcast::Sender<JobEvent>>,
}

impl Scheduler {
    pub fn new(store: JobStore) -> Self {
        Self {
            store,
            events: None,
        }
    }

    /// Announce enqueued jobs on a pool's event channel.
    pub fn with_events(mut self, events: broadcast::Sender<JobEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn enqueue(&self, requester: Requester, payload: &str) -> Result<Enqueued, DbError> {
        let enqueued = self.store.enqueue(requester, payload).await?;

        if let Some(events) = &self.events {
            let _ = events.send(JobEvent::JobEnqueued {
                job_id: enqueued.job_id,
                requester,
                position: enqueued.position,
                timestamp: Utc::now(),
            });
        }
        Ok(enqueued)
    }

    pub async fn queued_count(&self) -> Result<u64, DbError> {
        Ok(self.store.counts().await?.queued)
    }

    pub async fn running_count(&self) -> Result<u64, DbError> {
        Ok(self.store.counts().await?.running)
    }

    /// Both counts from a single read.
    pub async fn counts(&self) -> Result<QueueCounts, DbError> {
        self.store.counts().await
    }
}
