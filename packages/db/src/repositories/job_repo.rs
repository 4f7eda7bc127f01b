//! The durable job store: atomic enqueue, claim and finish.

use chrono::{DateTime, Utc};
use queue_core::{Job, JobId, JobOutcome, JobStatus, QueueCounts, Requester};
use serde::Deserialize;

use super::take_last;
use crate::{ContentionPolicy, Database, DbError};

/// Columns read back for every job query.
const JOB_FIELDS: &str =
    "seq, user_id, chat_id, reply_to, url, status, created_at, started_at, finished_at, bytes_sent, error";

/// Result of a successful enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    pub job_id: JobId,
    /// 1-based rank among queued jobs at insertion time. Not updated later.
    pub position: u64,
}

/// Internal record type for SurrealDB reads.
#[derive(Debug, Deserialize)]
struct JobRecord {
    seq: i64,
    user_id: i64,
    chat_id: i64,
    reply_to: Option<i64>,
    url: String,
    status: JobStatus,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    bytes_sent: Option<i64>,
    error: Option<String>,
}

impl From<JobRecord> for Job {
    fn from(r: JobRecord) -> Self {
        Job {
            id: JobId(r.seq),
            requester: Requester {
                user_id: r.user_id,
                chat_id: r.chat_id,
                reply_to: r.reply_to,
            },
            payload: r.url,
            status: r.status,
            created_at: r.created_at,
            started_at: r.started_at,
            finished_at: r.finished_at,
            bytes_sent: r.bytes_sent.map(|b| b.max(0) as u64),
            error: r.error,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EnqueueRecord {
    seq: i64,
    position: i64,
}

#[derive(Debug, Deserialize)]
struct StatusCount {
    status: JobStatus,
    count: i64,
}

/// Store for job state transitions.
///
/// Owns every status change a job goes through. Each mutation runs in a
/// single transaction, so concurrent callers (including other clones of
/// this store) never observe a half-applied change and never claim the
/// same job twice.
#[derive(Debug, Clone)]
pub struct JobStore {
    db: Database,
    policy: ContentionPolicy,
}

impl JobStore {
    /// Create a store over an initialized database.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            policy: ContentionPolicy::default(),
        }
    }

    /// Override how transaction conflicts are retried.
    pub fn with_contention_policy(mut self, policy: ContentionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Insert a new queued job and report its position in the queue.
    ///
    /// The position comes from the queued counter on `sequence:job`, which
    /// every enqueue and claim writes, so concurrent enqueues see distinct
    /// positions.
    pub async fn enqueue(
        &self,
        requester: Requester,
        payload: &str,
    ) -> Result<Enqueued, DbError> {
        let enqueued = self
            .policy
            .run("enqueue", move || self.try_enqueue(requester, payload))
            .await?;

        tracing::debug!(
            job_id = %enqueued.job_id,
            position = enqueued.position,
            "Job enqueued"
        );
        Ok(enqueued)
    }

    async fn try_enqueue(&self, requester: Requester, payload: &str) -> Result<Enqueued, DbError> {
        let response = self
            .db
            .query(
                r#"
                BEGIN TRANSACTION;
                LET $counter = (UPSERT sequence:job SET last = (last OR 0) + 1, queued = (queued OR 0) + 1 RETURN AFTER)[0];
                LET $seq = $counter.last;
                CREATE type::thing('job', $seq) CONTENT {
                    seq: $seq,
                    user_id: $user_id,
                    chat_id: $chat_id,
                    reply_to: $reply_to,
                    url: $url,
                    status: 'queued',
                    created_at: time::now()
                } RETURN NONE;
                RETURN { seq: $seq, position: $counter.queued };
                COMMIT TRANSACTION;
                "#,
            )
            .bind(("user_id", requester.user_id))
            .bind(("chat_id", requester.chat_id))
            .bind(("reply_to", requester.reply_to))
            .bind(("url", payload.to_string()))
            .await?;

        let record: Option<EnqueueRecord> = take_last(response)?;
        let record = record.ok_or_else(|| DbError::Query("Failed to enqueue job".into()))?;

        Ok(Enqueued {
            job_id: JobId(record.seq),
            position: record.position.max(1) as u64,
        })
    }

    /// Claim the queued job with the smallest id, moving it to running.
    ///
    /// Returns `None` when nothing is queued. Conflicts with concurrent
    /// claimers are retried per the contention policy, never surfaced.
    pub async fn claim_next(&self) -> Result<Option<Job>, DbError> {
        self.policy
            .run("claim_next", move || self.try_claim_next())
            .await
    }

    async fn try_claim_next(&self) -> Result<Option<Job>, DbError> {
        let query = format!(
            r#"
            BEGIN TRANSACTION;
            LET $next = (SELECT seq FROM job WHERE status = 'queued' ORDER BY seq ASC LIMIT 1)[0].seq;
            LET $claimed = (UPDATE job SET status = 'running', started_at = time::now()
                WHERE seq = $next AND status = 'queued'
                RETURN {JOB_FIELDS});
            UPDATE sequence:job SET queued = math::max([(queued OR 0) - 1, 0])
                WHERE array::len($claimed) > 0
                RETURN NONE;
            RETURN $claimed;
            COMMIT TRANSACTION;
            "#
        );

        let response = self.db.query(query).await?;
        let records: Vec<JobRecord> = take_last(response)?;

        Ok(records.into_iter().next().map(Job::from))
    }

    /// Move a running job to done or error.
    ///
    /// Failures always record zero bytes; successes record no error text.
    pub async fn finish(&self, job_id: JobId, outcome: &JobOutcome) -> Result<Job, DbError> {
        let job = self
            .policy
            .run("finish", move || self.try_finish(job_id, outcome))
            .await?;

        tracing::debug!(job_id = %job_id, status = %job.status, "Job finished");
        Ok(job)
    }

    async fn try_finish(&self, job_id: JobId, outcome: &JobOutcome) -> Result<Job, DbError> {
        let query = format!(
            r#"
            BEGIN TRANSACTION;
            UPDATE type::thing('job', $seq)
                SET status = $status, finished_at = time::now(), bytes_sent = $bytes_sent, error = $error
                WHERE status = 'running'
                RETURN {JOB_FIELDS};
            COMMIT TRANSACTION;
            "#
        );

        let response = self
            .db
            .query(query)
            .bind(("seq", job_id.get()))
            .bind(("status", outcome.status().as_str()))
            .bind(("bytes_sent", outcome.bytes_sent() as i64))
            .bind(("error", outcome.error().map(str::to_string)))
            .await?;

        let records: Vec<JobRecord> = take_last(response)?;
        if let Some(record) = records.into_iter().next() {
            return Ok(record.into());
        }

        // Nothing matched: either the job is missing or it is not running.
        let current = self.get(job_id).await?;
        Err(DbError::InvalidTransition {
            job_id,
            from: current.status,
            to: outcome.status(),
        })
    }

    /// Get a job by ID.
    pub async fn get(&self, job_id: JobId) -> Result<Job, DbError> {
        let query = format!("SELECT {JOB_FIELDS} FROM type::thing('job', $seq)");

        let response = self.db.query(query).bind(("seq", job_id.get())).await?;
        let records: Vec<JobRecord> = take_last(response)?;

        records
            .into_iter()
            .next()
            .map(Job::from)
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", job_id)))
    }

    /// List jobs in id order, optionally filtered by status.
    pub async fn list(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>, DbError> {
        let where_clause = if status.is_some() {
            "WHERE status = $status"
        } else {
            ""
        };
        let query =
            format!("SELECT {JOB_FIELDS} FROM job {where_clause} ORDER BY seq ASC LIMIT $limit");

        let mut request = self.db.query(query).bind(("limit", limit as i64));
        if let Some(status) = status {
            request = request.bind(("status", status.as_str()));
        }

        let records: Vec<JobRecord> = take_last(request.await?)?;
        Ok(records.into_iter().map(Job::from).collect())
    }

    /// Point-in-time queued and running counts.
    ///
    /// Reads without extra locking; concurrent transitions may make the
    /// result slightly stale.
    pub async fn counts(&self) -> Result<QueueCounts, DbError> {
        let response = self
            .db
            .query(
                r#"
                SELECT status, count() AS count
                FROM job
                WHERE status IN ['queued', 'running']
                GROUP BY status
                "#,
            )
            .await?;

        let rows: Vec<StatusCount> = take_last(response)?;

        let mut counts = QueueCounts::default();
        for row in rows {
            match row.status {
                JobStatus::Queued => counts.queued = row.count.max(0) as u64,
                JobStatus::Running => counts.running = row.count.max(0) as u64,
                _ => {}
            }
        }
        Ok(counts)
    }
}
