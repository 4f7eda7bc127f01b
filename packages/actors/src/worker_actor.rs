//! Worker actor that claims jobs from the store and runs them.

use std::time::Duration;

use chrono::Utc;
use db::{JobStore, StatsRepository};
use queue_core::{Job, JobEvent, JobOutcome};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::broadcast;

use crate::messages::WorkerMessage;
use crate::pipeline::JobPipeline;

/// State for the worker actor.
pub struct WorkerActorState {
    /// Worker ID, used for logs and events only.
    pub worker_id: String,
    /// This worker's handle on the job store.
    store: JobStore,
    stats: StatsRepository,
    pipeline: JobPipeline,
    /// Wait before polling again after finding the queue empty.
    poll_interval: Duration,
    event_tx: broadcast::Sender<JobEvent>,
    /// Jobs this worker has finished.
    pub jobs_processed: u64,
}

impl WorkerActorState {
    fn emit(&self, event: JobEvent) {
        tracing::debug!("{}", event.description());
        let _ = self.event_tx.send(event);
    }

    /// Run one claimed job through to a terminal state.
    ///
    /// Pipeline failures are contained here; only store errors propagate.
    async fn process(&mut self, job: Job) -> Result<(), ActorProcessingErr> {
        tracing::info!(worker_id = %self.worker_id, job_id = %job.id, "Processing job");
        self.emit(JobEvent::JobStarted {
            job_id: job.id,
            worker_id: self.worker_id.clone(),
            timestamp: Utc::now(),
        });

        let outcome = self.pipeline.run(&job).await;
        let finished = self.store.finish(job.id, &outcome).await?;
        self.jobs_processed += 1;

        let requester = job.requester;
        if let Err(e) = self
            .stats
            .add_download(
                requester.user_id,
                requester.chat_id,
                &job.payload,
                outcome.bytes_sent(),
                outcome.is_success(),
            )
            .await
        {
            tracing::warn!(job_id = %job.id, "Failed to record download: {}", e);
        }

        let event = match outcome {
            JobOutcome::Done { bytes_sent } => JobEvent::JobCompleted {
                job_id: job.id,
                worker_id: self.worker_id.clone(),
                bytes_sent,
                duration_ms: finished.duration_ms().unwrap_or(0),
                timestamp: Utc::now(),
            },
            JobOutcome::Failed { error } => JobEvent::JobFailed {
                job_id: job.id,
                worker_id: self.worker_id.clone(),
                error,
                timestamp: Utc::now(),
            },
        };
        self.emit(event);

        Ok(())
    }
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub worker_id: String,
    pub store: JobStore,
    pub stats: StatsRepository,
    pub pipeline: JobPipeline,
    pub poll_interval: Duration,
    pub event_tx: broadcast::Sender<JobEvent>,
}

/// Worker actor that executes jobs.
///
/// Handles one `Poll` at a time, so a worker never holds more than one
/// job. An empty queue schedules the next `Poll` after the poll interval;
/// a finished job polls again immediately.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting worker: {}", args.worker_id);

        let state = WorkerActorState {
            worker_id: args.worker_id,
            store: args.store,
            stats: args.stats,
            pipeline: args.pipeline,
            poll_interval: args.poll_interval,
            event_tx: args.event_tx,
            jobs_processed: 0,
        };
        state.emit(JobEvent::WorkerStarted {
            worker_id: state.worker_id.clone(),
            timestamp: Utc::now(),
        });

        myself.send_message(WorkerMessage::Poll)?;
        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Poll => match state.store.claim_next().await? {
                Some(job) => {
                    state.process(job).await?;
                    myself.send_message(WorkerMessage::Poll)?;
                }
                None => {
                    let myself = myself.clone();
                    let interval = state.poll_interval;
                    tokio::spawn(async move {
                        tokio::time::sleep(interval).await;
                        // The worker may have stopped in the meantime.
                        let _ = myself.send_message(WorkerMessage::Poll);
                    });
                }
            },

            WorkerMessage::Shutdown => {
                tracing::info!("Shutting down worker: {}", state.worker_id);
                myself.stop(Some("shutdown".to_string()));
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(
            worker_id = %state.worker_id,
            jobs = state.jobs_processed,
            "Worker stopped"
        );
        state.emit(JobEvent::WorkerStopped {
            worker_id: state.worker_id.clone(),
            reason: None,
            timestamp: Utc::now(),
        });
        Ok(())
    }
}
