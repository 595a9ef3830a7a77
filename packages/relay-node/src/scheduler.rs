//! Cancellable periodic job runner.
//!
//! A job runs once after `initial_delay`, then again every `interval`,
//! until its [`ScheduledJob`] is stopped. Cancellation is only observed
//! between invocations: a job already running always runs to completion.
//! Jobs that poll until success are expected to loop internally, so the
//! interval only governs when a finished job is re-run. A panicking
//! invocation is logged and the job is rescheduled as if it had returned.

use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Handle to a running periodic job.
pub struct ScheduledJob {
    name: &'static str,
    cancel: CancellationToken,
    task: AsyncMutex<Option<JoinHandle<()>>>,
}

/// Spawn `job` on the tokio runtime.
pub fn schedule<F, Fut>(
    name: &'static str,
    job: F,
    interval: Duration,
    initial_delay: Duration,
) -> ScheduledJob
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let task = tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(job = name, "Cancelled before first run");
                return;
            }
            _ = tokio::time::sleep(initial_delay) => {}
        }

        loop {
            // Own task per invocation so a panic cannot take the loop down.
            if let Err(e) = tokio::spawn(job()).await {
                error!(job = name, error = %e, "Scheduled job panicked, rescheduling");
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(job = name, "Scheduled job stopped");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    });

    debug!(job = name, interval_ms = interval.as_millis() as u64, "Job scheduled");

    ScheduledJob {
        name,
        cancel,
        task: AsyncMutex::new(Some(task)),
    }
}

impl ScheduledJob {
    /// Signal cancellation and wait until the task has exited.
    ///
    /// Safe to call any number of times, concurrently. Every caller returns
    /// only once the task is gone, which may take as long as the in-flight
    /// invocation.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let mut task = self.task.lock().await;
        // Await in place: if this future is dropped, the handle stays for the next caller.
        if let Some(handle) = task.as_mut() {
            if let Err(e) = handle.await {
                warn!(job = self.name, error = %e, "Scheduled job panicked");
            }
            *task = None;
        }
    }

    /// True once [`stop`](Self::stop) has been requested, even if the task is
    /// still finishing its in-flight invocation.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True once the task has exited.
    pub fn is_finished(&self) -> bool {
        match self.task.try_lock() {
            Ok(task) => task.as_ref().map_or(true, |h| h.is_finished()),
            // Someone is inside stop() waiting on the task.
            Err(_) => false,
        }
    }
}

impl Drop for ScheduledJob {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
