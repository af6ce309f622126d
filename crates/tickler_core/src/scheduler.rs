//! Cancellable fixed-interval jobs on the tokio runtime.
//!
//! [`PeriodicTask`] replaces ad-hoc polling timers: the job runs once
//! immediately and then every `interval` until the cancellation token fires.
//! A tick that is missed because the runtime was busy is skipped, never
//! replayed in a burst. Each invocation runs on the blocking pool, and once
//! [`PeriodicTask::stop`] returns no invocation is in flight.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct PeriodicTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawns `job` on the current tokio runtime.
    ///
    /// Must be called from within a runtime context.
    pub fn spawn<F>(
        name: &'static str,
        interval: Duration,
        cancel: CancellationToken,
        job: F,
    ) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let interval = interval.max(Duration::from_millis(1));
        let token = cancel.clone();
        let job = Arc::new(Mutex::new(job));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                task = name,
                interval_ms = interval.as_millis() as u64,
                "periodic task started"
            );

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        info!(task = name, "periodic task cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        debug!(task = name, "periodic task tick");
                        run_blocking(name, job.clone()).await;
                    }
                }
            }
        });

        Self {
            name,
            cancel,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Cancels the task and waits for its loop to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        self.join().await;
    }

    /// Waits for the loop to exit after its token has been cancelled elsewhere.
    pub async fn join(self) {
        if let Err(err) = self.handle.await {
            warn!(task = self.name, error = %err, "periodic task ended abnormally");
        }
    }
}

async fn run_blocking<F>(name: &'static str, job: Arc<Mutex<F>>)
where
    F: FnMut() + Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || {
        let mut job = job.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        (*job)();
    })
    .await;
    if let Err(err) = result {
        warn!(task = name, error = %err, "periodic task job failed");
    }
}

#[cfg(test)]
mod tests {
    use super::PeriodicTask;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn counting_task(
        interval: Duration,
        cancel: CancellationToken,
    ) -> (PeriodicTask, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let task = PeriodicTask::spawn("counter", interval, cancel, move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (task, count)
    }

    #[tokio::test(start_paused = true)]
    async fn runs_immediately_then_on_every_interval() {
        let (task, count) = counting_task(Duration::from_secs(60), CancellationToken::new());

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        task.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_further_ticks() {
        let (task, count) = counting_task(Duration::from_secs(60), CancellationToken::new());

        tokio::time::sleep(Duration::from_secs(30)).await;
        task.stop().await;
        let after_stop = count.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(after_stop, 1);
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn external_cancellation_ends_the_loop() {
        let cancel = CancellationToken::new();
        let (task, _count) = counting_task(Duration::from_secs(60), cancel.child_token());

        assert_eq!(task.name(), "counter");
        cancel.cancel();
        let finished = tokio::time::timeout(Duration::from_secs(1), task.join()).await;
        assert!(finished.is_ok(), "task should finish after parent cancel");
    }

    #[tokio::test]
    async fn blocked_job_does_not_stall_other_tasks() {
        let (release, blocked) = std::sync::mpsc::channel::<()>();
        let blocked = std::sync::Mutex::new(blocked);
        let slow = PeriodicTask::spawn(
            "slow",
            Duration::from_secs(60),
            CancellationToken::new(),
            move || {
                let receiver = blocked.lock().unwrap();
                let _ = receiver.recv_timeout(Duration::from_secs(5));
            },
        );
        let (fast, count) = counting_task(Duration::from_millis(10), CancellationToken::new());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let seen = count.load(Ordering::SeqCst);
        release.send(()).unwrap();
        fast.stop().await;
        slow.stop().await;

        assert!(seen >= 2, "fast task ran {seen} times while the slow job was blocked");
    }

    #[tokio::test]
    async fn stop_waits_for_an_in_flight_job() {
        let finished = Arc::new(AtomicUsize::new(0));
        let marker = finished.clone();
        let task = PeriodicTask::spawn(
            "sleeper",
            Duration::from_secs(60),
            CancellationToken::new(),
            move || {
                std::thread::sleep(Duration::from_millis(100));
                marker.fetch_add(1, Ordering::SeqCst);
            },
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        task.stop().await;

        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
