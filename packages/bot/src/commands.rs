//! Routing of inbound messages: bot commands and download requests.

use std::sync::Arc;

use actors::{BoxError, Scheduler, Transport};
use db::repositories::NewRequester;
use db::{DbError, StatsRepository};
use queue_core::{QueueConfig, Requester, format_bytes};
use regex::Regex;
use thiserror::Error;

use crate::console::Inbound;

const URL_PATTERN: &str = r"https?://(www\.)?instagram\.com/\S+";

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),
    #[error("Reply failed: {0}")]
    Reply(BoxError),
}

/// What an inbound message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Stats,
    /// Queue a download of the first matching URL.
    Download(String),
    Ignore,
}

/// Finds supported links in free text.
#[derive(Debug, Clone)]
pub struct UrlMatcher {
    pattern: Regex,
}

impl UrlMatcher {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(URL_PATTERN)?,
        })
    }

    pub fn find<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.pattern.find(text).map(|m| m.as_str())
    }
}

impl Command {
    pub fn parse(text: &str, urls: &UrlMatcher) -> Self {
        let text = text.trim();
        if let Some(command) = text.strip_prefix('/') {
            // "/stats@SomeBot extra" addresses the same command.
            let name = command
                .split(|c: char| c.is_whitespace() || c == '@')
                .next()
                .unwrap_or_default();
            match name {
                "start" => return Command::Start,
                "help" => return Command::Help,
                "stats" => return Command::Stats,
                _ => {}
            }
        }

        match urls.find(text) {
            Some(url) => Command::Download(url.to_string()),
            None => Command::Ignore,
        }
    }
}

/// Answers commands and feeds download requests to the scheduler.
pub struct CommandRouter {
    scheduler: Scheduler,
    stats: StatsRepository,
    transport: Arc<dyn Transport>,
    urls: UrlMatcher,
    workers: u32,
    max_payload_bytes: u64,
}

impl CommandRouter {
    pub fn new(
        scheduler: Scheduler,
        stats: StatsRepository,
        transport: Arc<dyn Transport>,
        config: &QueueConfig,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            scheduler,
            stats,
            transport,
            urls: UrlMatcher::new()?,
            workers: config.worker_concurrency,
            max_payload_bytes: config.max_payload_bytes,
        })
    }

    pub async fn handle(&self, message: &Inbound) -> Result<(), CommandError> {
        match Command::parse(&message.text, &self.urls) {
            Command::Start => {
                self.stats.add_user(&NewRequester::new(message.user_id)).await?;
                let text = format!(
                    "Hi! I download Instagram videos.\n\n\
                     Send an IG link (Reels/Post).\n\
                     Up to {} downloads run in parallel, the rest wait in the queue.\n\
                     /stats shows personal or group statistics.",
                    self.workers
                );
                self.reply(message, &text).await
            }
            Command::Help => {
                let text = format!(
                    "Send an IG link. {} downloads run in parallel, the rest wait in the queue.\n\
                     Files of {} or more are not sent.",
                    self.workers,
                    format_bytes(self.max_payload_bytes)
                );
                self.reply(message, &text).await
            }
            Command::Stats => {
                let text = self.stats_text(message).await?;
                self.reply(message, &text).await
            }
            Command::Download(url) => {
                self.stats.add_user(&NewRequester::new(message.user_id)).await?;
                let requester = Requester::new(message.user_id, message.chat_id)
                    .replying_to(message.message_id);
                let enqueued = self.scheduler.enqueue(requester, &url).await?;
                // The worker replies when the job runs; nothing is sent now.
                tracing::info!(
                    job_id = %enqueued.job_id,
                    position = enqueued.position,
                    user_id = message.user_id,
                    "Queued download"
                );
                Ok(())
            }
            Command::Ignore => Ok(()),
        }
    }

    async fn stats_text(&self, message: &Inbound) -> Result<String, DbError> {
        let counts = self.scheduler.counts().await?;
        let queue_line = format!("Queued: {} | Running: {}", counts.queued, counts.running);

        if message.is_group() {
            let totals = self.stats.chat_stats(message.chat_id).await?;
            let active = self.stats.group_active_users(message.chat_id).await?;
            Ok(format!(
                "Group statistics: {} downloads, {}\nActive users: {}\n{}",
                totals.count,
                format_bytes(totals.bytes),
                active,
                queue_line
            ))
        } else {
            let totals = self.stats.user_stats(message.user_id).await?;
            let users = self.stats.total_users().await?;
            Ok(format!(
                "Your statistics: {} downloads, {}\nTotal bot users: {}\n{}",
                totals.count,
                format_bytes(totals.bytes),
                users,
                queue_line
            ))
        }
    }

    async fn reply(&self, message: &Inbound, text: &str) -> Result<(), CommandError> {
        self.transport
            .send_text(message.chat_id, text, None)
            .await
            .map_err(CommandError::Reply)
    }
}
