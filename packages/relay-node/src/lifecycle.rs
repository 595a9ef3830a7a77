//! Ownership of the two background loops.
//!
//! Start, stop and hub reconfiguration all go through one async mutex, so
//! they serialize against each other. Running jobs stay in the slot until
//! their stop has fully returned; a caller dropped mid-stop leaves them
//! there, cancelled, for the next caller to finish off.
//!
//! Liveness: stopping waits for the in-flight pass of each loop to return.
//! A pass blocked on an unresponsive chain (e.g. still waiting for stake)
//! holds up `stop()` and `reconfigure_hub()` for as long as it keeps
//! retrying. Passes are not preempted.

use crate::bootstrap::Bootstrap;
use crate::config::{Config, ScheduleConfig};
use crate::engine::RelayEngine;
use crate::metrics::METRICS;
use crate::readiness::ReadinessGate;
use crate::scheduler::{schedule, ScheduledJob};
use alloy::primitives::Address;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

struct Jobs {
    keep_alive: ScheduledJob,
    refresh: ScheduledJob,
}

impl Jobs {
    async fn stop(&self) {
        tokio::join!(self.keep_alive.stop(), self.refresh.stop());
    }

    /// Neither loop has been told to stop nor has exited.
    fn is_live(&self) -> bool {
        [&self.keep_alive, &self.refresh]
            .iter()
            .all(|job| !job.is_cancelled() && !job.is_finished())
    }
}

pub struct BackgroundLoops {
    inner: Arc<Inner>,
}

struct Inner {
    bootstrap: Arc<Bootstrap>,
    engine: Arc<dyn RelayEngine>,
    readiness: Arc<ReadinessGate>,
    schedule: ScheduleConfig,
    jobs: AsyncMutex<Option<Jobs>>,
}

impl BackgroundLoops {
    pub fn new(
        engine: Arc<dyn RelayEngine>,
        readiness: Arc<ReadinessGate>,
        config: &Config,
    ) -> Self {
        let bootstrap = Bootstrap::new(
            Arc::clone(&engine),
            Arc::clone(&readiness),
            config.backoff.clone(),
            config.min_balance_wei,
        );
        Self {
            inner: Arc::new(Inner {
                bootstrap: Arc::new(bootstrap),
                engine,
                readiness,
                schedule: config.schedule.clone(),
                jobs: AsyncMutex::new(None),
            }),
        }
    }

    /// Spawn both loops. No-op when already running.
    ///
    /// Jobs left cancelled by an abandoned stop are drained first.
    pub async fn start(&self) {
        let mut jobs = self.inner.jobs.lock().await;
        if jobs.as_ref().is_some_and(Jobs::is_live) {
            return;
        }
        if let Some(stale) = jobs.as_ref() {
            warn!("Draining background loops left by an interrupted stop");
            stale.stop().await;
        }
        *jobs = Some(self.inner.spawn());
        info!(hub = %self.inner.engine.hub_address(), "Background loops started");
    }

    /// Stop both loops, waiting for in-flight passes. Idempotent.
    pub async fn stop(&self) {
        let mut jobs = self.inner.jobs.lock().await;
        if let Some(running) = jobs.as_ref() {
            running.stop().await;
            *jobs = None;
            info!("Background loops stopped");
        }
    }

    /// Switch the engine to `hub` and restart both loops against it.
    ///
    /// The hub is only written once both loops have exited, so no pass ever
    /// observes it changing. Loops that were stopped are started as well.
    /// The sequence runs on its own task: dropping the returned future stops
    /// waiting for it but does not interrupt it.
    pub async fn reconfigure_hub(&self, hub: Address) {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.reconfigure_hub(hub).await });
        if let Err(e) = task.await {
            error!(hub = %hub, error = %e, "Hub reconfiguration task failed");
        }
    }

    /// True while both loops are scheduled and neither has exited.
    pub async fn is_running(&self) -> bool {
        self.inner.jobs.lock().await.as_ref().is_some_and(Jobs::is_live)
    }
}

impl Inner {
    async fn reconfigure_hub(&self, hub: Address) {
        let mut jobs = self.jobs.lock().await;
        let previous = self.engine.hub_address();

        if let Some(running) = jobs.as_ref() {
            info!(from = %previous, to = %hub, "Stopping background loops for hub change");
            running.stop().await;
        }

        // No await from here on: the swap and restart happen as one step.
        self.readiness.set(false);
        self.engine.set_hub_address(hub);
        *jobs = Some(self.spawn());

        METRICS.hub_reconfigurations.fetch_add(1, Ordering::Relaxed);
        info!(from = %previous, to = %hub, "Background loops restarted");
    }

    fn spawn(&self) -> Jobs {
        let bootstrap = Arc::clone(&self.bootstrap);
        let keep_alive = schedule(
            "keep_alive",
            move || {
                let bootstrap = Arc::clone(&bootstrap);
                async move { bootstrap.keep_alive().await }
            },
            self.schedule.keep_alive_interval(),
            self.schedule.initial_delay(),
        );

        let bootstrap = Arc::clone(&self.bootstrap);
        let refresh = schedule(
            "refresh_blockchain_view",
            move || {
                let bootstrap = Arc::clone(&bootstrap);
                async move { bootstrap.refresh_blockchain_view().await }
            },
            self.schedule.refresh_interval(),
            self.schedule.initial_delay(),
        );

        Jobs {
            keep_alive,
            refresh,
        }
    }
}
