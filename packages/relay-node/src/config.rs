//! Relay node configuration.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the relay node.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Account expected to own the relay's stake.
    #[serde(default = "defaults::owner_address")]
    pub owner_address: Address,

    /// Per-transaction fee advertised on registration.
    #[serde(default = "defaults::fee")]
    pub fee: u64,

    /// Public URL advertised on registration.
    #[serde(default = "defaults::url")]
    pub url: String,

    #[serde(default = "defaults::hub_address")]
    pub hub_address: Address,

    /// Minimum stake (wei) for the relay to count as staked.
    #[serde(default = "defaults::stake_amount")]
    pub stake_amount: u64,

    /// Gas added on top of each request's own gas limit.
    #[serde(default = "defaults::gas_limit")]
    pub gas_limit: u64,

    /// Gas price multiplier in percent over the network price.
    #[serde(default = "defaults::gas_price_factor")]
    pub gas_price_factor: u64,

    #[serde(default = "defaults::unstake_delay")]
    pub unstake_delay: u64,

    #[serde(default = "defaults::ethereum_node_url")]
    pub ethereum_node_url: String,

    /// Directory holding `keystore/`.
    #[serde(default = "defaults::workdir")]
    pub workdir: PathBuf,

    /// Base64 AES-256 key. Unset = plaintext key file (dev).
    #[serde(default)]
    pub keystore_encryption_key: Option<String>,

    #[serde(default = "defaults::bind_address")]
    pub bind_address: String,

    /// Expose `/setRelayHub`.
    #[serde(default)]
    pub debug_api: bool,

    /// Expose `/audit`.
    #[serde(default)]
    pub audit_api: bool,

    /// Balance (wei) below which the relay waits for funding. Accepts an
    /// integer or a decimal / `0x` hex string for amounts past `u64`.
    #[serde(default = "defaults::min_balance_wei", deserialize_with = "wei")]
    pub min_balance_wei: U256,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            owner_address: defaults::owner_address(),
            fee: defaults::fee(),
            url: defaults::url(),
            hub_address: defaults::hub_address(),
            stake_amount: defaults::stake_amount(),
            gas_limit: defaults::gas_limit(),
            gas_price_factor: defaults::gas_price_factor(),
            unstake_delay: defaults::unstake_delay(),
            ethereum_node_url: defaults::ethereum_node_url(),
            workdir: defaults::workdir(),
            keystore_encryption_key: None,
            bind_address: defaults::bind_address(),
            debug_api: false,
            audit_api: false,
            min_balance_wei: defaults::min_balance_wei(),
            schedule: ScheduleConfig::default(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl Config {
    pub fn keystore_dir(&self) -> PathBuf {
        self.workdir.join("keystore")
    }
}

/// Intervals of the two background loops.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "defaults::loop_interval_ms")]
    pub keep_alive_interval_ms: u64,

    #[serde(default = "defaults::loop_interval_ms")]
    pub refresh_interval_ms: u64,

    #[serde(default)]
    pub initial_delay_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval_ms: defaults::loop_interval_ms(),
            refresh_interval_ms: defaults::loop_interval_ms(),
            initial_delay_ms: 0,
        }
    }
}

impl ScheduleConfig {
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

/// Fixed retry backoffs of the bootstrap stages.
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "defaults::stake_backoff_ms")]
    pub stake_ms: u64,

    #[serde(default = "defaults::funding_backoff_ms")]
    pub funding_ms: u64,

    #[serde(default = "defaults::gas_price_backoff_ms")]
    pub gas_price_ms: u64,

    #[serde(default = "defaults::registration_backoff_ms")]
    pub registration_ms: u64,

    #[serde(default = "defaults::register_retry_backoff_ms")]
    pub register_retry_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            stake_ms: defaults::stake_backoff_ms(),
            funding_ms: defaults::funding_backoff_ms(),
            gas_price_ms: defaults::gas_price_backoff_ms(),
            registration_ms: defaults::registration_backoff_ms(),
            register_retry_ms: defaults::register_retry_backoff_ms(),
        }
    }
}

impl BackoffConfig {
    /// Same backoff for every stage. Handy for tests.
    pub fn uniform(ms: u64) -> Self {
        Self {
            stake_ms: ms,
            funding_ms: ms,
            gas_price_ms: ms,
            registration_ms: ms,
            register_retry_ms: ms,
        }
    }

    pub fn stake(&self) -> Duration {
        Duration::from_millis(self.stake_ms)
    }

    pub fn funding(&self) -> Duration {
        Duration::from_millis(self.funding_ms)
    }

    pub fn gas_price(&self) -> Duration {
        Duration::from_millis(self.gas_price_ms)
    }

    pub fn registration(&self) -> Duration {
        Duration::from_millis(self.registration_ms)
    }

    pub fn register_retry(&self) -> Duration {
        Duration::from_millis(self.register_retry_ms)
    }
}

fn wei<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wei {
        Int(u64),
        Text(String),
    }

    match Wei::deserialize(deserializer)? {
        Wei::Int(n) => Ok(U256::from(n)),
        Wei::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

mod defaults {
    use alloy::primitives::{address, Address, U256};
    use std::path::PathBuf;

    pub fn owner_address() -> Address {
        Address::ZERO
    }

    pub fn fee() -> u64 {
        11
    }

    pub fn url() -> String {
        "http://localhost:8090".into()
    }

    pub fn hub_address() -> Address {
        address!("0x254dffcd3277c0b1660f6d42efbb754edababc2b")
    }

    pub fn stake_amount() -> u64 {
        1002
    }

    pub fn gas_limit() -> u64 {
        100_000
    }

    pub fn gas_price_factor() -> u64 {
        50
    }

    pub fn unstake_delay() -> u64 {
        1200
    }

    pub fn ethereum_node_url() -> String {
        "http://localhost:8545".into()
    }

    pub fn workdir() -> PathBuf {
        "./build/server".into()
    }

    pub fn bind_address() -> String {
        "0.0.0.0:8090".into()
    }

    /// One ether.
    pub fn min_balance_wei() -> U256 {
        U256::from(1_000_000_000_000_000_000u64)
    }

    pub fn loop_interval_ms() -> u64 {
        60_000
    }

    pub fn stake_backoff_ms() -> u64 {
        5_000
    }

    pub fn funding_backoff_ms() -> u64 {
        10_000
    }

    pub fn gas_price_backoff_ms() -> u64 {
        10_000
    }

    pub fn registration_backoff_ms() -> u64 {
        15_000
    }

    pub fn register_retry_backoff_ms() -> u64 {
        10_000
    }
}
