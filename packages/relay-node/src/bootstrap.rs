//! Bootstrap sequence and keep-alive registration.
//!
//! Both are job bodies for [`crate::scheduler`]. Each stage is a blocking
//! retry loop against the engine, so a pass can take arbitrarily long on a
//! slow or unresponsive chain; callers stopping the loops wait for it.
//!
//! Stage order: stake, funding, gas price, registration. A failing stage
//! sets readiness to `false` and retries from its own top; earlier stages
//! are not re-checked within the same pass.

use crate::config::BackoffConfig;
use crate::engine::RelayEngine;
use crate::metrics::METRICS;
use crate::readiness::ReadinessGate;
use alloy::primitives::{Address, U256};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Bootstrap {
    engine: Arc<dyn RelayEngine>,
    readiness: Arc<ReadinessGate>,
    backoff: BackoffConfig,
    min_balance: U256,
}

impl Bootstrap {
    pub fn new(
        engine: Arc<dyn RelayEngine>,
        readiness: Arc<ReadinessGate>,
        backoff: BackoffConfig,
        min_balance: U256,
    ) -> Self {
        Self {
            engine,
            readiness,
            backoff,
            min_balance,
        }
    }

    /// One full pass. Marks the relay ready only after every stage passed.
    pub async fn refresh_blockchain_view(&self) {
        self.wait_for_owner_actions().await;
        self.wait_for_gas_price().await;
        self.wait_for_registration().await;

        METRICS.bootstrap_passes.fetch_add(1, Ordering::Relaxed);
        info!(
            hub = %self.engine.hub_address(),
            gas_price = %self.engine.gas_price(),
            "Relay ready"
        );
        self.readiness.set(true);
    }

    /// Stake, then funding. Shared with [`Self::keep_alive`].
    pub async fn wait_for_owner_actions(&self) {
        self.wait_for_stake().await;
        self.wait_for_funding().await;
    }

    /// Re-assert registration on the hub.
    pub async fn keep_alive(&self) {
        self.wait_for_owner_actions().await;

        info!("Registering relay...");
        loop {
            match self.engine.register_relay(Address::ZERO).await {
                Ok(()) => break,
                Err(e) => warn!(error = %e, "Registration failed, trying again"),
            }
            tokio::time::sleep(self.backoff.register_retry()).await;
        }

        METRICS.registrations.fetch_add(1, Ordering::Relaxed);
        info!(hub = %self.engine.hub_address(), "Done registering");
    }

    async fn wait_for_stake(&self) {
        loop {
            let hub = self.engine.hub_address();
            match self.engine.is_staked(hub).await {
                Ok(true) => break,
                Ok(false) => info!(hub = %hub, "Waiting for stake..."),
                Err(e) => warn!(hub = %hub, error = %e, "Stake check failed"),
            }
            self.readiness.set(false);
            tokio::time::sleep(self.backoff.stake()).await;
        }
        debug!("Relay staked");
    }

    async fn wait_for_funding(&self) {
        let balance = loop {
            match self.engine.balance().await {
                Ok(balance) if balance >= self.min_balance => break balance,
                Ok(balance) => info!(
                    balance = %balance,
                    minimum = %self.min_balance,
                    "Balance too low. Waiting for funding..."
                ),
                Err(e) => warn!(error = %e, "Balance check failed"),
            }
            self.readiness.set(false);
            tokio::time::sleep(self.backoff.funding()).await;
        };
        info!(balance = %balance, "Relay funded");
    }

    async fn wait_for_gas_price(&self) {
        loop {
            match self.engine.refresh_gas_price().await {
                Ok(()) => break,
                Err(e) => warn!(error = %e, "Gas price refresh failed, trying again"),
            }
            self.readiness.set(false);
            tokio::time::sleep(self.backoff.gas_price()).await;
        }
        debug!(gas_price = %self.engine.gas_price(), "Gas price synced");
    }

    async fn wait_for_registration(&self) {
        loop {
            let hub = self.engine.hub_address();
            match self.engine.is_registered(hub).await {
                Ok(true) => break,
                Ok(false) => info!(hub = %hub, "Waiting for registration..."),
                Err(e) => warn!(hub = %hub, error = %e, "Registration check failed"),
            }
            self.readiness.set(false);
            tokio::time::sleep(self.backoff.registration()).await;
        }
        debug!("Relay registered");
    }
}
