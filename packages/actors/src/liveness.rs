//! Periodic "still working" signal scoped to a long-running step.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::collaborators::Transport;

/// Background task emitting progress signals to one chat.
///
/// The first signal goes out immediately, then one per `interval`. After
/// [`stop`](Self::stop) resolves no further signal is emitted. Dropping
/// the pump without stopping it aborts the task, so a pump never outlives
/// its owner.
pub struct LivenessPump {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<u64>>,
}

impl LivenessPump {
    pub fn start(transport: Arc<dyn Transport>, chat_id: i64, interval: Duration) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut emitted = 0u64;
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    result = transport.send_progress_signal(chat_id) => {
                        emitted += 1;
                        if let Err(e) = result {
                            tracing::debug!(chat_id, "Progress signal failed: {}", e);
                        }
                    }
                }

                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            emitted
        });

        Self {
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Stop the pump and wait for it to wind down.
    ///
    /// Returns the number of signals emitted. Takes at most one in-flight
    /// signal call to complete, never a full interval.
    pub async fn stop(mut self) -> u64 {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        match self.task.take() {
            Some(task) => task.await.unwrap_or(0),
            None => 0,
        }
    }
}

impl Drop for LivenessPump {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Run `step` with a pump active for exactly its duration.
///
/// Returns the step's output and the number of signals emitted.
pub async fn with_liveness<F>(
    transport: Arc<dyn Transport>,
    chat_id: i64,
    interval: Duration,
    step: F,
) -> (F::Output, u64)
where
    F: Future,
{
    let pump = LivenessPump::start(transport, chat_id, interval);
    let output = step.await;
    let emitted = pump.stop().await;
    (output, emitted)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use std::sync::atomic::{AtomicU64, Ordering};

    use futures_util::FutureExt;

    use super::*;
    use crate::collaborators::{BoxError, CallFuture, OutgoingMedia};

    #[derive(Default)]
    struct SignalCounter {
        signals: AtomicU64,
        fail: bool,
    }

    impl SignalCounter {
        fn count(&self) -> u64 {
            self.signals.load(Ordering::SeqCst)
        }
    }

    impl Transport for SignalCounter {
        fn send_text<'a>(
            &'a self,
            _chat_id: i64,
            _text: &'a str,
            _reply_to: Option<i64>,
        ) -> CallFuture<'a, ()> {
            async { Ok(()) }.boxed()
        }

        fn send_media<'a>(
            &'a self,
            _chat_id: i64,
            _media: &'a OutgoingMedia,
            _reply_to: Option<i64>,
        ) -> CallFuture<'a, ()> {
            async { Ok(()) }.boxed()
        }

        fn send_progress_signal(&self, _chat_id: i64) -> CallFuture<'_, ()> {
            self.signals.fetch_add(1, Ordering::SeqCst);
            let fail = self.fail;
            async move {
                if fail {
                    Err(BoxError::from("chat unavailable"))
                } else {
                    Ok(())
                }
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ten_second_step_gets_two_or_three_signals() {
        let transport = Arc::new(SignalCounter::default());

        let ((), emitted) = with_liveness(
            transport.clone(),
            1,
            Duration::from_secs(4),
            tokio::time::sleep(Duration::from_secs(10)),
        )
        .await;

        assert!((2..=3).contains(&emitted), "emitted {emitted}");
        assert_eq!(transport.count(), emitted);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.count(), emitted, "signal after stop");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_prompt() {
        let transport = Arc::new(SignalCounter::default());
        let pump = LivenessPump::start(transport.clone(), 1, Duration::from_secs(3600));

        tokio::time::sleep(Duration::from_millis(10)).await;
        let started = tokio::time::Instant::now();
        let emitted = pump.stop().await;

        assert_eq!(emitted, 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn signal_failures_do_not_stop_the_pump() {
        let transport = Arc::new(SignalCounter {
            fail: true,
            ..Default::default()
        });

        let (value, emitted) = with_liveness(
            transport.clone(),
            1,
            Duration::from_secs(1),
            async {
                tokio::time::sleep(Duration::from_millis(3500)).await;
                7
            },
        )
        .await;

        assert_eq!(value, 7);
        assert_eq!(emitted, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_pump_aborts_it() {
        let transport = Arc::new(SignalCounter::default());
        let pump = LivenessPump::start(transport.clone(), 1, Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        drop(pump);
        let seen = transport.count();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.count(), seen);
    }
}
