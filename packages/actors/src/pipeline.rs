//! The per-job pipeline: fetch, size check, remux, probe, deliver.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Duration;

use futures_util::FutureExt;
use queue_core::{FILE_TOO_LARGE, Job, JobOutcome, QueueConfig, format_bytes};
use thiserror::Error;

use crate::collaborators::{BoxError, Collaborators, OutgoingMedia};
use crate::liveness::with_liveness;

/// Why a job did not complete.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(BoxError),
    #[error("file_too_large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },
    #[error("delivery failed: {0}")]
    Deliver(BoxError),
    #[error("pipeline panicked: {0}")]
    Panicked(String),
}

impl PipelineError {
    /// Error text recorded on the job.
    pub fn reason(&self) -> String {
        match self {
            PipelineError::TooLarge { .. } => FILE_TOO_LARGE.to_string(),
            other => other.to_string(),
        }
    }

    /// Message shown to the requester.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::TooLarge { size, limit } => format!(
                "File too large: {} (limit {}).",
                format_bytes(*size),
                format_bytes(*limit)
            ),
            other => format!("Error: {}", other),
        }
    }
}

/// Runs one claimed job to an outcome.
///
/// Never fails and never panics outward: every error, including a panic in
/// a collaborator, becomes [`JobOutcome::Failed`] after a best-effort
/// notification to the requester.
#[derive(Debug, Clone)]
pub struct JobPipeline {
    collaborators: Collaborators,
    max_payload_bytes: u64,
    liveness_interval: Duration,
    work_dir: PathBuf,
    caption: Option<String>,
}

impl JobPipeline {
    pub fn new(collaborators: Collaborators, config: &QueueConfig) -> Self {
        Self {
            collaborators,
            max_payload_bytes: config.max_payload_bytes,
            liveness_interval: config.liveness_interval(),
            work_dir: PathBuf::from(&config.work_dir),
            caption: config.caption.clone(),
        }
    }

    pub async fn run(&self, job: &Job) -> JobOutcome {
        let result = match AssertUnwindSafe(self.execute(job)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(PipelineError::Panicked(panic_message(panic.as_ref()))),
        };

        match result {
            Ok(bytes_sent) => JobOutcome::Done { bytes_sent },
            Err(err) => {
                tracing::warn!(job_id = %job.id, "Job failed: {}", err);
                self.notify(job, &err.user_message()).await;
                JobOutcome::failed(err.reason())
            }
        }
    }

    async fn execute(&self, job: &Job) -> Result<u64, PipelineError> {
        let Collaborators {
            transport,
            fetcher,
            remuxer,
            prober,
        } = &self.collaborators;
        let chat_id = job.requester.chat_id;

        let fetched = fetcher
            .fetch(&job.payload, &self.work_dir)
            .await
            .map_err(PipelineError::Fetch)?;

        if fetched.size >= self.max_payload_bytes {
            return Err(PipelineError::TooLarge {
                size: fetched.size,
                limit: self.max_payload_bytes,
            });
        }

        let path = remuxer.remux(&fetched.path).await;
        let info = prober.probe(&path).await.oriented();
        let media = OutgoingMedia {
            path,
            info,
            caption: self.caption.clone(),
        };

        let (delivered, signals) = with_liveness(
            transport.clone(),
            chat_id,
            self.liveness_interval,
            transport.send_media(chat_id, &media, job.requester.reply_to),
        )
        .await;
        tracing::debug!(job_id = %job.id, signals, "Delivery finished");
        delivered.map_err(PipelineError::Deliver)?;

        Ok(fetched.size)
    }

    /// Best-effort text to the requester; failures are only logged.
    async fn notify(&self, job: &Job, text: &str) {
        let requester = &job.requester;
        let sent = AssertUnwindSafe(self.collaborators.transport.send_text(
            requester.chat_id,
            text,
            requester.reply_to,
        ))
        .catch_unwind()
        .await;

        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(job_id = %job.id, "Failed to notify requester: {}", e),
            Err(_) => tracing::warn!(job_id = %job.id, "Notification panicked"),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_large_records_reason_code_and_shows_both_sizes() {
        let err = PipelineError::TooLarge {
            size: 3 * 1024 * 1024 * 1024,
            limit: 2_090_000_000,
        };
        assert_eq!(err.reason(), FILE_TOO_LARGE);
        assert_eq!(
            err.user_message(),
            "File too large: 3.00 GB (limit 1.95 GB)."
        );
    }

    #[test]
    fn other_errors_record_their_description() {
        let err = PipelineError::Fetch("HTTP Error 404".into());
        assert_eq!(err.reason(), "fetch failed: HTTP Error 404");
        assert_eq!(err.user_message(), "Error: fetch failed: HTTP Error 404");
    }

    #[test]
    fn panic_payloads_become_text() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(5u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
