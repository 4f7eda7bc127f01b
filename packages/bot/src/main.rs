//! Download bot: queues media links from chat messages and delivers them
//! through a fixed-size worker pool.

use std::sync::Arc;

use actors::{Collaborators, start_pool};
use db::{DbConfig, JobStore, StatsRepository};
use queue_core::QueueConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

mod commands;
mod console;
mod tools;

use commands::CommandRouter;
use console::{ConsoleTransport, InboundReader};
use tools::{FfmpegRemuxer, FfprobeProber, YtDlpFetcher};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    // Logs go to stderr; stdout carries outbound messages.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = QueueConfig::from_env()?;
    tracing::info!(
        workers = config.worker_concurrency,
        db = %config.db_endpoint,
        "Starting bot"
    );

    let database = db::init(&DbConfig::endpoint(config.db_endpoint.clone())).await?;
    let store = JobStore::new(database.clone());
    let stats = StatsRepository::new(database);

    let transport = Arc::new(ConsoleTransport::new());
    let collaborators = Collaborators::new(
        transport.clone(),
        Arc::new(YtDlpFetcher),
        Arc::new(FfmpegRemuxer),
        Arc::new(FfprobeProber),
    );

    let pool = start_pool(&config, store, stats.clone(), collaborators).await?;
    let router = CommandRouter::new(pool.scheduler(), stats, transport, &config)?;

    let mut events = pool.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!("{}", event.description()),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Event log fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let reader = InboundReader::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::info!("Input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let Some(message) = reader.parse(&line) else {
                    tracing::warn!("Ignoring malformed line, expected `<user_id> <chat_id> <text>`");
                    continue;
                };
                if let Err(e) = router.handle(&message).await {
                    tracing::warn!(chat_id = message.chat_id, "Failed to handle message: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    pool.shutdown().await?;
    tracing::info!("Bot stopped");
    Ok(())
}
