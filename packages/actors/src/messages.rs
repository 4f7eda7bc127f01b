//! Message types for actor communication.

use queue_core::QueueCounts;
use ractor::RpcReplyPort;

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Try to claim and run the next queued job.
    Poll,

    /// Stop after the job in hand, if any, is finished.
    Shutdown,
}

/// Messages for the Supervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Queued and running counts from the store.
    GetCounts {
        reply: RpcReplyPort<Result<QueueCounts, String>>,
    },

    /// Number of live workers.
    WorkerCount { reply: RpcReplyPort<usize> },

    /// Shut every worker down, then stop.
    Shutdown,
}

/// Result type for pool operations.
pub type ActorResult<T> = Result<T, ActorError>;

/// Error type for pool operations.
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    #[error("Failed to spawn actor: {0}")]
    Spawn(#[from] ractor::SpawnErr),

    #[error("Actor error: {0}")]
    Actor(String),

    #[error("Database error: {0}")]
    Database(#[from] db::DbError),

    #[error("Timeout")]
    Timeout,
}
