//! Response bodies produced by the relay node.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// `GET /getaddr` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetAddrResponse {
    pub relay_server_address: Address,
    pub min_gas_price: U256,
    pub ready: bool,
}

/// A relayed transaction after signing, as broadcast by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedRelayTransaction {
    pub nonce: U256,
    pub gas_price: U256,
    pub gas: U256,
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
    pub v: U256,
    pub r: U256,
    pub s: U256,
    pub hash: B256,
    /// RLP encoding of the signed transaction.
    pub raw: Bytes,
}
