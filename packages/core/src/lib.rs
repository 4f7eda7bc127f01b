//! Core domain types for the job queue system.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobStatus and JobOutcome for work items
//! - QueueConfig and QueueCounts for the pool and status reporting
//! - Events for observing workers

mod config;
mod events;
mod format;
mod job;

pub use config::{ConfigError, QueueConfig, QueueCounts};
pub use events::JobEvent;
pub use format::format_bytes;
pub use job::{FILE_TOO_LARGE, Job, JobId, JobOutcome, JobStatus, Requester};
