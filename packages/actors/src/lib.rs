//! Actor system for the job queue.
//!
//! This crate provides the Ractor-based worker pool that drains the
//! durable job store, the pipeline each job runs through, and the
//! façade producers enqueue with.
//!
//! # Architecture
//!
//! - `Supervisor` - Top-level actor that spawns and watches the workers
//! - `WorkerActor` - Claims one job at a time from the store and runs it
//! - `JobPipeline` - Fetch, size check, remux, probe and deliver
//! - `LivenessPump` - Progress signals while a delivery is in flight
//!
//! # Usage
//!
//! ```ignore
//! use actors::{Collaborators, start_pool};
//!
//! let pool = start_pool(&config, store, stats, collaborators).await?;
//! let enqueued = pool.scheduler().enqueue(requester, url).await?;
//! pool.shutdown().await?;
//! ```

mod collaborators;
mod liveness;
mod messages;
mod pipeline;
mod scheduler;
mod supervisor;
mod worker_actor;

pub use collaborators::{
    BoxError, CallFuture, Collaborators, Fetched, Fetcher, MediaInfo, OutgoingMedia, Prober,
    Remuxer, Transport,
};
pub use liveness::{LivenessPump, with_liveness};
pub use messages::{ActorError, ActorResult, SupervisorMessage, WorkerMessage};
pub use pipeline::{JobPipeline, PipelineError};
pub use scheduler::Scheduler;
pub use supervisor::{Supervisor, WorkerPool, start_pool};
pub use worker_actor::WorkerActor;

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef};
