use alloy::consensus::TxEnvelope;
use alloy::primitives::{address, Address, Bytes, B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use relay_node::config::{BackoffConfig, ScheduleConfig};
use relay_node::{AppState, Config, Error, ReadinessGate, RelayEngine};
use relay_types::{RelayTransactionRequest, SignedRelayTransaction};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::Duration;

pub const HUB_A: Address = address!("0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1");
pub const HUB_B: Address = address!("0xb2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2b2");
pub const RELAY: Address = address!("0x7777777777777777777777777777777777777777");
pub const ONE_ETHER: u64 = 1_000_000_000_000_000_000;
pub const NETWORK_GAS_PRICE: u64 = 20_000_000_000;

#[derive(Default)]
pub struct Calls {
    pub is_staked: AtomicUsize,
    pub balance: AtomicUsize,
    pub refresh_gas_price: AtomicUsize,
    pub is_registered: AtomicUsize,
    pub register_relay: AtomicUsize,
    pub create_relay_transaction: AtomicUsize,
    pub audit: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// In-memory engine whose chain view is keyed by hub address.
///
/// Failure counters count down: each poll consumes one and answers with a
/// failure while any remain.
pub struct ScriptedEngine {
    hub: RwLock<Address>,
    gas_price: RwLock<U256>,
    balance: RwLock<U256>,
    staked: Mutex<HashSet<Address>>,
    registered: Mutex<HashSet<Address>>,
    pub stake_errors: AtomicUsize,
    pub low_balance_polls: AtomicUsize,
    pub unregistered_polls: AtomicUsize,
    /// Held by a test to park every stake check.
    pub stake_hold: tokio::sync::Mutex<()>,
    pub calls: Calls,
    /// Hub argument of every stake and registration check, in call order.
    pub hubs_polled: Mutex<Vec<Address>>,
    readiness: OnceLock<Arc<ReadinessGate>>,
    /// Readiness as seen at the start of every chain poll.
    pub readiness_seen: Mutex<Vec<bool>>,
}

impl ScriptedEngine {
    pub fn new(hub: Address) -> Self {
        Self {
            hub: RwLock::new(hub),
            gas_price: RwLock::new(U256::ZERO),
            balance: RwLock::new(U256::from(ONE_ETHER)),
            staked: Mutex::new(HashSet::new()),
            registered: Mutex::new(HashSet::new()),
            stake_errors: AtomicUsize::new(0),
            low_balance_polls: AtomicUsize::new(0),
            unregistered_polls: AtomicUsize::new(0),
            stake_hold: tokio::sync::Mutex::new(()),
            calls: Calls::default(),
            hubs_polled: Mutex::new(Vec::new()),
            readiness: OnceLock::new(),
            readiness_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn stake_on(&self, hub: Address) {
        self.staked.lock().unwrap().insert(hub);
    }

    pub fn register_on(&self, hub: Address) {
        self.registered.lock().unwrap().insert(hub);
    }

    pub fn is_registered_on(&self, hub: Address) -> bool {
        self.registered.lock().unwrap().contains(&hub)
    }

    pub fn set_balance(&self, balance: U256) {
        *self.balance.write().unwrap() = balance;
    }

    pub fn watch_readiness(&self, gate: Arc<ReadinessGate>) {
        let _ = self.readiness.set(gate);
    }

    fn observe(&self) {
        if let Some(gate) = self.readiness.get() {
            self.readiness_seen.lock().unwrap().push(gate.get());
        }
    }

    fn consume(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RelayEngine for ScriptedEngine {
    fn address(&self) -> Address {
        RELAY
    }

    fn hub_address(&self) -> Address {
        *self.hub.read().unwrap()
    }

    fn set_hub_address(&self, hub: Address) {
        *self.hub.write().unwrap() = hub;
    }

    fn gas_price(&self) -> U256 {
        *self.gas_price.read().unwrap()
    }

    async fn balance(&self) -> Result<U256, Error> {
        self.observe();
        self.calls.balance.fetch_add(1, Ordering::SeqCst);
        if Self::consume(&self.low_balance_polls) {
            return Ok(U256::ZERO);
        }
        Ok(*self.balance.read().unwrap())
    }

    async fn is_staked(&self, hub: Address) -> Result<bool, Error> {
        let _hold = self.stake_hold.lock().await;
        self.observe();
        self.calls.is_staked.fetch_add(1, Ordering::SeqCst);
        self.hubs_polled.lock().unwrap().push(hub);
        if Self::consume(&self.stake_errors) {
            return Err(Error::Rpc("connection refused".into()));
        }
        Ok(self.staked.lock().unwrap().contains(&hub))
    }

    async fn is_registered(&self, hub: Address) -> Result<bool, Error> {
        self.observe();
        self.calls.is_registered.fetch_add(1, Ordering::SeqCst);
        self.hubs_polled.lock().unwrap().push(hub);
        if Self::consume(&self.unregistered_polls) {
            return Ok(false);
        }
        Ok(self.is_registered_on(hub))
    }

    async fn refresh_gas_price(&self) -> Result<(), Error> {
        self.observe();
        self.calls.refresh_gas_price.fetch_add(1, Ordering::SeqCst);
        *self.gas_price.write().unwrap() = U256::from(NETWORK_GAS_PRICE * 3 / 2);
        Ok(())
    }

    async fn register_relay(&self, _stake_address: Address) -> Result<(), Error> {
        self.calls.register_relay.fetch_add(1, Ordering::SeqCst);
        let hub = self.hub_address();
        self.register_on(hub);
        Ok(())
    }

    async fn create_relay_transaction(
        &self,
        request: RelayTransactionRequest,
    ) -> Result<SignedRelayTransaction, Error> {
        self.calls.create_relay_transaction.fetch_add(1, Ordering::SeqCst);
        let hub = self.hub_address();
        if request.relay_hub_address != hub {
            return Err(Error::Rejected(format!(
                "wrong hub address {}, relay serves {hub}",
                request.relay_hub_address
            )));
        }
        Ok(SignedRelayTransaction {
            nonce: U256::ZERO,
            gas_price: request.gas_price,
            gas: request.gas_limit,
            to: hub,
            value: U256::ZERO,
            input: request.encoded_function,
            v: U256::from(27u64),
            r: U256::from(1u64),
            s: U256::from(2u64),
            hash: B256::repeat_byte(0xab),
            raw: Bytes::from(vec![0xf8, 0x01]),
        })
    }

    async fn audit_relay_transaction(&self, _tx: TxEnvelope) -> Result<(), Error> {
        self.calls.audit.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Defaults with millisecond backoffs so tests finish quickly.
pub fn fast_config() -> Config {
    Config {
        hub_address: HUB_A,
        backoff: BackoffConfig::uniform(10),
        schedule: ScheduleConfig {
            keep_alive_interval_ms: 60_000,
            refresh_interval_ms: 60_000,
            initial_delay_ms: 0,
        },
        ..Config::default()
    }
}

/// App state around a scripted engine, with readiness snapshots wired up.
pub fn scripted_state(config: Config, engine: Arc<ScriptedEngine>) -> Arc<AppState> {
    let state = Arc::new(AppState::with_engine(config, Arc::clone(&engine) as Arc<dyn RelayEngine>));
    engine.watch_readiness(Arc::clone(&state.readiness));
    state
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(timeout, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("condition not met within {timeout:?}"))
}

pub fn post_json(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Result<serde_json::Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
