//! Supervisor actor owning the worker pool.

use std::collections::HashMap;
use std::time::Duration;

use db::{JobStore, StatsRepository};
use queue_core::{JobEvent, QueueConfig, QueueCounts};
use ractor::{Actor, ActorCell, ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::collaborators::Collaborators;
use crate::messages::{ActorError, ActorResult, SupervisorMessage, WorkerMessage};
use crate::pipeline::JobPipeline;
use crate::scheduler::Scheduler;
use crate::worker_actor::{WorkerActor, WorkerArgs};

/// How long pool queries wait for the supervisor.
const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// State for the supervisor actor.
pub struct SupervisorState {
    /// Live workers by actor ID, with their worker IDs.
    workers: HashMap<ActorId, (String, ActorRef<WorkerMessage>)>,
    store: JobStore,
    /// Set once shutdown starts; worker exits are expected from then on.
    shutting_down: bool,
}

/// Supervisor arguments.
pub struct SupervisorArgs {
    pub config: QueueConfig,
    pub store: JobStore,
    pub stats: StatsRepository,
    pub collaborators: Collaborators,
    pub event_tx: broadcast::Sender<JobEvent>,
}

/// Supervisor actor that spawns and watches the workers.
///
/// Workers are linked to it. A worker that dies from a store error is
/// logged and not restarted; the remaining workers keep draining the queue.
pub struct Supervisor;

impl Supervisor {
    fn forget(state: &mut SupervisorState, cell: &ActorCell) -> Option<String> {
        state.workers.remove(&cell.get_id()).map(|(id, _)| id)
    }
}

impl Actor for Supervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = SupervisorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let concurrency = args.config.worker_concurrency;
        tracing::info!(concurrency, "Starting worker pool supervisor");

        let pipeline = JobPipeline::new(args.collaborators, &args.config);
        let mut workers = HashMap::new();

        for n in 1..=concurrency {
            let worker_id = format!("worker-{}", n);
            let worker_args = WorkerArgs {
                worker_id: worker_id.clone(),
                // Each worker gets its own store handle.
                store: args.store.clone(),
                stats: args.stats.clone(),
                pipeline: pipeline.clone(),
                poll_interval: args.config.poll_interval(),
                event_tx: args.event_tx.clone(),
            };

            let (worker, _handle) =
                Actor::spawn_linked(None, WorkerActor, worker_args, myself.get_cell()).await?;
            workers.insert(worker.get_id(), (worker_id, worker));
        }

        Ok(SupervisorState {
            workers,
            store: args.store,
            shutting_down: false,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::GetCounts { reply } => {
                let counts = state.store.counts().await.map_err(|e| e.to_string());
                let _ = reply.send(counts);
            }

            SupervisorMessage::WorkerCount { reply } => {
                let _ = reply.send(state.workers.len());
            }

            SupervisorMessage::Shutdown => {
                tracing::info!("Shutting down worker pool");
                state.shutting_down = true;
                if state.workers.is_empty() {
                    myself.stop(None);
                    return Ok(());
                }
                for (_, worker) in state.workers.values() {
                    let _ = worker.send_message(WorkerMessage::Shutdown);
                }
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                let worker_id = Self::forget(state, &cell).unwrap_or_default();
                if state.shutting_down {
                    tracing::debug!("Worker {} exited", worker_id);
                } else {
                    tracing::error!("Worker {} terminated: {:?}", worker_id, reason);
                }
            }
            SupervisionEvent::ActorFailed(cell, err) => {
                let worker_id = Self::forget(state, &cell).unwrap_or_default();
                tracing::error!("Worker {} failed: {}", worker_id, err);
            }
            _ => {}
        }

        if state.shutting_down && state.workers.is_empty() {
            myself.stop(None);
        }
        Ok(())
    }
}

/// A running pool of workers plus the channel it reports on.
pub struct WorkerPool {
    supervisor: ActorRef<SupervisorMessage>,
    handle: JoinHandle<()>,
    events: broadcast::Sender<JobEvent>,
    scheduler: Scheduler,
}

impl WorkerPool {
    /// Producer-side façade sharing this pool's store and event channel.
    pub fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }

    /// Receive job and worker events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub fn supervisor(&self) -> &ActorRef<SupervisorMessage> {
        &self.supervisor
    }

    /// Queued and running counts, answered by the supervisor.
    pub async fn counts(&self) -> ActorResult<QueueCounts> {
        let result = ractor::rpc::call(
            &self.supervisor,
            |reply| SupervisorMessage::GetCounts { reply },
            Some(CALL_TIMEOUT),
        )
        .await
        .map_err(|e| ActorError::Actor(e.to_string()))?;

        match result {
            ractor::rpc::CallResult::Success(counts) => counts.map_err(ActorError::Actor),
            ractor::rpc::CallResult::Timeout => Err(ActorError::Timeout),
            ractor::rpc::CallResult::SenderError => {
                Err(ActorError::Actor("supervisor dropped the reply".into()))
            }
        }
    }

    /// Number of workers still alive.
    pub async fn worker_count(&self) -> ActorResult<usize> {
        let result = ractor::rpc::call(
            &self.supervisor,
            |reply| SupervisorMessage::WorkerCount { reply },
            Some(CALL_TIMEOUT),
        )
        .await
        .map_err(|e| ActorError::Actor(e.to_string()))?;

        match result {
            ractor::rpc::CallResult::Success(count) => Ok(count),
            ractor::rpc::CallResult::Timeout => Err(ActorError::Timeout),
            ractor::rpc::CallResult::SenderError => {
                Err(ActorError::Actor("supervisor dropped the reply".into()))
            }
        }
    }

    /// Let every worker finish its current job, then stop the pool.
    pub async fn shutdown(self) -> ActorResult<()> {
        self.supervisor
            .send_message(SupervisorMessage::Shutdown)
            .map_err(|e| ActorError::Actor(e.to_string()))?;
        self.handle
            .await
            .map_err(|e| ActorError::Actor(e.to_string()))
    }
}

/// Start the supervisor and its `worker_concurrency` workers.
pub async fn start_pool(
    config: &QueueConfig,
    store: JobStore,
    stats: StatsRepository,
    collaborators: Collaborators,
) -> ActorResult<WorkerPool> {
    let (events, _) = broadcast::channel(1024);
    let scheduler = Scheduler::new(store.clone()).with_events(events.clone());

    let args = SupervisorArgs {
        config: config.clone(),
        store,
        stats,
        collaborators,
        event_tx: events.clone(),
    };
    let (supervisor, handle) = Actor::spawn(None, Supervisor, args).await?;

    Ok(WorkerPool {
        supervisor,
        handle,
        events,
        scheduler,
    })
}
