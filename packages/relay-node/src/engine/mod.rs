//! The relay engine: on-chain queries plus relayed-transaction signing.
//!
//! The control plane only talks to the engine through [`RelayEngine`], so
//! bootstrap, admission and dispatch can be driven by a mock in tests.

mod chain;

pub use chain::ChainEngine;

use alloy::consensus::TxEnvelope;
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use relay_types::{RelayTransactionRequest, SignedRelayTransaction};

/// Capabilities the control plane needs from a relay engine.
///
/// Implementations must tolerate concurrent calls, including concurrent
/// `register_relay` from the keep-alive loop and registration checks from
/// the bootstrap loop.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelayEngine: Send + Sync {
    /// The relay's own signing address.
    fn address(&self) -> Address;

    fn hub_address(&self) -> Address;

    /// Only called while both background loops are stopped.
    fn set_hub_address(&self, hub: Address);

    /// Cached minimum gas price, zero until the first refresh succeeds.
    fn gas_price(&self) -> U256;

    async fn balance(&self) -> Result<U256, crate::Error>;

    async fn is_staked(&self, hub: Address) -> Result<bool, crate::Error>;

    async fn is_registered(&self, hub: Address) -> Result<bool, crate::Error>;

    /// Fetch the network gas price, apply the configured factor, cache it.
    async fn refresh_gas_price(&self) -> Result<(), crate::Error>;

    async fn register_relay(&self, stake_address: Address) -> Result<(), crate::Error>;

    async fn create_relay_transaction(
        &self,
        request: RelayTransactionRequest,
    ) -> Result<SignedRelayTransaction, crate::Error>;

    async fn audit_relay_transaction(&self, tx: TxEnvelope) -> Result<(), crate::Error>;
}
