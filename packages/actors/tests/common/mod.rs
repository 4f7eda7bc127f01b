#![allow(dead_code, clippy::disallowed_methods)]

use std::collections::HashMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actors::{
    BoxError, CallFuture, Collaborators, Fetched, Fetcher, MediaInfo, OutgoingMedia, Prober,
    Remuxer, Transport,
};
use db::{Database, DbConfig, JobStore, StatsRepository};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use queue_core::{JobEvent, QueueConfig, Requester};
use tokio::sync::broadcast;

pub async fn setup_database() -> Result<Database, db::DbError> {
    db::init(&DbConfig::memory()).await
}

pub async fn setup_store() -> Result<(JobStore, StatsRepository), db::DbError> {
    let database = setup_database().await?;
    Ok((
        JobStore::new(database.clone()),
        StatsRepository::new(database),
    ))
}

/// Fast polling and liveness so tests finish quickly.
pub fn test_config(workers: u32) -> QueueConfig {
    QueueConfig::default()
        .with_concurrency(workers)
        .with_poll_interval(Duration::from_millis(20))
        .with_liveness_interval(Duration::from_millis(50))
}

pub fn requester(n: i64) -> Requester {
    Requester::new(n, 1_000 + n).replying_to(n * 10)
}

pub fn url(n: i64) -> String {
    format!("https://www.instagram.com/reel/{n}")
}

/// Collect terminal job events until `count` have arrived.
pub async fn wait_for_terminal(
    events: &mut broadcast::Receiver<JobEvent>,
    count: usize,
) -> Result<Vec<JobEvent>, Box<dyn Error>> {
    let mut terminal = Vec::new();
    tokio::time::timeout(Duration::from_secs(30), async {
        while terminal.len() < count {
            let event = events.recv().await?;
            if event.is_terminal() {
                terminal.push(event);
            }
        }
        Ok::<_, broadcast::error::RecvError>(())
    })
    .await??;
    Ok(terminal)
}

/// Records everything sent to requesters.
#[derive(Default)]
pub struct FakeTransport {
    texts: Mutex<Vec<(i64, String, Option<i64>)>>,
    media: Mutex<Vec<(i64, OutgoingMedia, Option<i64>)>>,
    signals: AtomicUsize,
    fail_text: bool,
    fail_media: bool,
    media_delay: Duration,
}

impl FakeTransport {
    /// Every text notification fails.
    pub fn failing_text(mut self) -> Self {
        self.fail_text = true;
        self
    }

    /// Every media delivery fails.
    pub fn failing_media(mut self) -> Self {
        self.fail_media = true;
        self
    }

    pub fn with_media_delay(mut self, delay: Duration) -> Self {
        self.media_delay = delay;
        self
    }

    pub fn texts(&self) -> Vec<(i64, String, Option<i64>)> {
        self.texts.lock().unwrap().clone()
    }

    pub fn media(&self) -> Vec<(i64, OutgoingMedia, Option<i64>)> {
        self.media.lock().unwrap().clone()
    }

    pub fn signals(&self) -> usize {
        self.signals.load(Ordering::SeqCst)
    }
}

impl Transport for FakeTransport {
    fn send_text<'a>(
        &'a self,
        chat_id: i64,
        text: &'a str,
        reply_to: Option<i64>,
    ) -> CallFuture<'a, ()> {
        async move {
            if self.fail_text {
                return Err(BoxError::from("chat not found"));
            }
            self.texts
                .lock()
                .unwrap()
                .push((chat_id, text.to_string(), reply_to));
            Ok(())
        }
        .boxed()
    }

    fn send_media<'a>(
        &'a self,
        chat_id: i64,
        media: &'a OutgoingMedia,
        reply_to: Option<i64>,
    ) -> CallFuture<'a, ()> {
        async move {
            tokio::time::sleep(self.media_delay).await;
            if self.fail_media {
                return Err(BoxError::from("upload rejected"));
            }
            self.media
                .lock()
                .unwrap()
                .push((chat_id, media.clone(), reply_to));
            Ok(())
        }
        .boxed()
    }

    fn send_progress_signal(&self, _chat_id: i64) -> CallFuture<'_, ()> {
        self.signals.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }.boxed()
    }
}

#[derive(Debug, Clone)]
pub enum FetchPlan {
    Size(u64),
    Fail(&'static str),
    Panic,
}

/// Fetcher scripted per URL, tracking how many fetches overlap.
pub struct FakeFetcher {
    plans: Mutex<HashMap<String, FetchPlan>>,
    default_size: u64,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeFetcher {
    pub fn new(default_size: u64, delay: Duration) -> Self {
        Self {
            plans: Mutex::new(HashMap::new()),
            default_size,
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn plan(self, url: impl Into<String>, plan: FetchPlan) -> Self {
        self.plans.lock().unwrap().insert(url.into(), plan);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Fetcher for FakeFetcher {
    fn fetch<'a>(&'a self, url: &'a str, work_dir: &'a Path) -> CallFuture<'a, Fetched> {
        async move {
            let plan = self
                .plans
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .unwrap_or(FetchPlan::Size(self.default_size));

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match plan {
                FetchPlan::Size(size) => Ok(Fetched {
                    path: work_dir.join("video.mp4"),
                    size,
                }),
                FetchPlan::Fail(message) => Err(BoxError::from(message)),
                FetchPlan::Panic => panic!("fetcher exploded"),
            }
        }
        .boxed()
    }
}

pub struct PassthroughRemuxer;

impl Remuxer for PassthroughRemuxer {
    fn remux<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, PathBuf> {
        async move { path.to_path_buf() }.boxed()
    }
}

pub struct FixedProber(pub MediaInfo);

impl Prober for FixedProber {
    fn probe<'a>(&'a self, _path: &'a Path) -> BoxFuture<'a, MediaInfo> {
        let info = self.0;
        async move { info }.boxed()
    }
}

pub fn collaborators(transport: Arc<FakeTransport>, fetcher: Arc<FakeFetcher>) -> Collaborators {
    Collaborators::new(
        transport,
        fetcher,
        Arc::new(PassthroughRemuxer),
        Arc::new(FixedProber(MediaInfo::default())),
    )
}
