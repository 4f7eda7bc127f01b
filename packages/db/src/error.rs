//! Store error type and contention classification.

use queue_core::{JobId, JobStatus};
use thiserror::Error;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(surrealdb::Error),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A concurrent transaction touched the same records; safe to retry.
    #[error("Transaction conflict: {0}")]
    Contention(String),
    #[error("Gave up {op} after {attempts} conflicting attempts")]
    ContentionExhausted { op: &'static str, attempts: u32 },
    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
}

impl DbError {
    /// Whether the operation may succeed if simply retried.
    pub fn is_contention(&self) -> bool {
        matches!(self, DbError::Contention(_))
    }
}

/// Message fragments the storage engines use for retryable conflicts.
const CONTENTION_MARKERS: &[&str] = &[
    "can be retried",
    "read or write conflict",
    "transaction conflict",
    "resource busy",
    "tryagain",
];

fn looks_like_contention(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    CONTENTION_MARKERS.iter().any(|m| message.contains(m))
}

impl From<surrealdb::Error> for DbError {
    fn from(err: surrealdb::Error) -> Self {
        use surrealdb::error::Api;

        let message = err.to_string();
        if looks_like_contention(&message) {
            return DbError::Contention(message);
        }

        match err {
            surrealdb::Error::Db(_) | surrealdb::Error::Api(Api::Query(_)) => {
                DbError::Query(message)
            }
            surrealdb::Error::Api(Api::FromValue { .. }) => DbError::Serialization(message),
            other => DbError::Connection(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use surrealdb::error::Api;

    use super::{DbError, looks_like_contention};

    #[test]
    fn remote_query_failures_are_query_errors() {
        let err = DbError::from(surrealdb::Error::Api(Api::Query("no such table".into())));
        assert!(matches!(err, DbError::Query(_)));

        let err = DbError::from(surrealdb::Error::Api(Api::Query(
            "Transaction conflict: resource busy".into(),
        )));
        assert!(err.is_contention());
    }

    #[test]
    fn recognizes_engine_conflict_messages() {
        assert!(looks_like_contention(
            "Failed to commit transaction due to a read or write conflict. This transaction can be retried"
        ));
        assert!(looks_like_contention(
            "The query was not executed due to a failed transaction. Resource busy: "
        ));
        assert!(!looks_like_contention("Found NONE for field `url`"));
    }
}
