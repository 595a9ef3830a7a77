//! Request bodies accepted by the relay node.

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// Parameters a client supplies so the relay can wrap its call in a
/// hub `relayCall` transaction. Only structural validity is checked here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayTransactionRequest {
    pub encoded_function: Bytes,
    #[serde(default)]
    pub approval_data: Bytes,
    pub signature: Bytes,
    pub from: Address,
    pub to: Address,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub recipient_nonce: U256,
    pub relay_max_nonce: u64,
    pub relay_fee: U256,
    pub relay_hub_address: Address,
}

/// Debug-only hub switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetHubRequest {
    #[serde(rename = "RelayHubAddress")]
    pub relay_hub_address: Address,
}

/// A signed transaction, as a `0x`-prefixed hex string of its RLP encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRelaysRequest {
    #[serde(rename = "SignedTx")]
    pub signed_tx: String,
}
