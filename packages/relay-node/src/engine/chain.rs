//! Relay engine over Ethereum JSON-RPC.
//!
//! Reads hub state through `getRelay`, caches a surcharged gas price, and
//! signs legacy transactions locally with the relay's key before
//! broadcasting them raw.

use super::RelayEngine;
use crate::config::Config;
use crate::Error;
use alloy::consensus::transaction::SignerRecoverable;
use alloy::consensus::{Transaction, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use relay_types::{RelayTransactionRequest, SignedRelayTransaction};
use std::sync::RwLock;
use tokio::sync::{Mutex as AsyncMutex, OnceCell};
use tracing::{debug, info, warn};

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IRelayHub {
        function getRelay(address relay) external view returns (
            uint256 totalStake,
            uint256 unstakeDelay,
            uint256 unstakeTime,
            address owner,
            uint8 state
        );

        function registerRelay(uint256 transactionFee, string url) external;

        function relayCall(
            address from,
            address recipient,
            bytes encodedFunction,
            uint256 transactionFee,
            uint256 gasPrice,
            uint256 gasLimit,
            uint256 nonce,
            bytes signature,
            bytes approvalData
        ) external;
    }
}

/// `RelayHub.RelayState` discriminants.
const STATE_UNKNOWN: u8 = 0;
const STATE_STAKED: u8 = 1;
const STATE_REGISTERED: u8 = 2;

/// Static relay parameters taken from configuration.
#[derive(Debug, Clone)]
struct EngineParams {
    owner_address: Address,
    fee: U256,
    url: String,
    stake_amount: U256,
    unstake_delay: U256,
    gas_limit: u64,
    gas_price_factor: u64,
}

impl EngineParams {
    fn from_config(config: &Config) -> Self {
        Self {
            owner_address: config.owner_address,
            fee: U256::from(config.fee),
            url: config.url.clone(),
            stake_amount: U256::from(config.stake_amount),
            unstake_delay: U256::from(config.unstake_delay),
            gas_limit: config.gas_limit,
            gas_price_factor: config.gas_price_factor,
        }
    }
}

/// Relay engine backed by an Ethereum node.
pub struct ChainEngine {
    provider: DynProvider,
    wallet: EthereumWallet,
    address: Address,
    hub: RwLock<Address>,
    gas_price: RwLock<U256>,
    chain_id: OnceCell<u64>,
    /// Serializes nonce lookup + broadcast of our own transactions.
    tx_lock: AsyncMutex<()>,
    params: EngineParams,
}

impl ChainEngine {
    pub fn new(config: &Config, signer: PrivateKeySigner) -> Result<Self, Error> {
        let rpc_url = config
            .ethereum_node_url
            .parse()
            .map_err(|e| Error::Config(format!("Invalid ethereum node url: {e}")))?;
        let provider = ProviderBuilder::new().connect_http(rpc_url).erased();
        let address = signer.address();

        info!(
            relay = %address,
            hub = %config.hub_address,
            node = %config.ethereum_node_url,
            "Chain engine initialized"
        );

        Ok(Self {
            provider,
            wallet: EthereumWallet::from(signer),
            address,
            hub: RwLock::new(config.hub_address),
            gas_price: RwLock::new(U256::ZERO),
            chain_id: OnceCell::new(),
            tx_lock: AsyncMutex::new(()),
            params: EngineParams::from_config(config),
        })
    }

    fn hub(&self, hub: Address) -> IRelayHub::IRelayHubInstance<DynProvider> {
        IRelayHub::new(hub, self.provider.clone())
    }

    async fn relay_state(&self, hub: Address, relay: Address) -> Result<IRelayHub::getRelayReturn, Error> {
        self.hub(hub)
            .getRelay(relay)
            .call()
            .await
            .map_err(|e| Error::Rpc(format!("getRelay({relay}) on hub {hub}: {e}")))
    }

    async fn chain_id(&self) -> Result<u64, Error> {
        self.chain_id
            .get_or_try_init(|| async {
                self.provider
                    .get_chain_id()
                    .await
                    .map_err(|e| Error::Rpc(format!("eth_chainId: {e}")))
            })
            .await
            .copied()
    }

    async fn pending_nonce(&self) -> Result<u64, Error> {
        self.provider
            .get_transaction_count(self.address)
            .pending()
            .await
            .map_err(|e| Error::Rpc(format!("eth_getTransactionCount: {e}")))
    }

    /// Sign `request` as a legacy transaction and broadcast it.
    /// Caller must hold `tx_lock`.
    async fn sign_and_send(
        &self,
        request: TransactionRequest,
        nonce: u64,
        gas_limit: u64,
        gas_price: U256,
    ) -> Result<TxEnvelope, Error> {
        let gas_price = u128::try_from(gas_price)
            .map_err(|_| Error::Rejected(format!("gas price {gas_price} out of range")))?;
        let chain_id = self.chain_id().await?;

        let envelope = request
            .with_from(self.address)
            .with_nonce(nonce)
            .with_chain_id(chain_id)
            .with_gas_limit(gas_limit)
            .with_gas_price(gas_price)
            .build(&self.wallet)
            .await
            .map_err(|e| Error::Signing(e.to_string()))?;

        let tx_hash = self
            .provider
            .send_raw_transaction(&envelope.encoded_2718())
            .await
            .map_err(|e| Error::Rpc(format!("eth_sendRawTransaction: {e}")))?;

        debug!(tx_hash = %tx_hash.tx_hash(), nonce, "Transaction broadcast");
        Ok(envelope)
    }
}

#[async_trait]
impl RelayEngine for ChainEngine {
    fn address(&self) -> Address {
        self.address
    }

    fn hub_address(&self) -> Address {
        *self.hub.read().unwrap_or_else(|e| e.into_inner())
    }

    fn set_hub_address(&self, hub: Address) {
        *self.hub.write().unwrap_or_else(|e| e.into_inner()) = hub;
        info!(hub = %hub, "Hub address updated");
    }

    fn gas_price(&self) -> U256 {
        *self.gas_price.read().unwrap_or_else(|e| e.into_inner())
    }

    async fn balance(&self) -> Result<U256, Error> {
        self.provider
            .get_balance(self.address)
            .await
            .map_err(|e| Error::Rpc(format!("eth_getBalance: {e}")))
    }

    async fn is_staked(&self, hub: Address) -> Result<bool, Error> {
        let relay = self.relay_state(hub, self.address).await?;

        if relay.state != STATE_STAKED && relay.state != STATE_REGISTERED {
            return Ok(false);
        }
        if relay.totalStake < self.params.stake_amount
            || relay.unstakeDelay < self.params.unstake_delay
        {
            debug!(
                stake = %relay.totalStake,
                unstake_delay = %relay.unstakeDelay,
                "Stake below configured minimum"
            );
            return Ok(false);
        }
        if !self.params.owner_address.is_zero() && relay.owner != self.params.owner_address {
            warn!(owner = %relay.owner, expected = %self.params.owner_address, "Relay staked by unexpected owner");
            return Ok(false);
        }
        Ok(true)
    }

    async fn is_registered(&self, hub: Address) -> Result<bool, Error> {
        let relay = self.relay_state(hub, self.address).await?;
        Ok(relay.state == STATE_REGISTERED)
    }

    async fn refresh_gas_price(&self) -> Result<(), Error> {
        let network_price = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| Error::Rpc(format!("eth_gasPrice: {e}")))?;

        let price = apply_gas_price_factor(network_price, self.params.gas_price_factor);
        *self.gas_price.write().unwrap_or_else(|e| e.into_inner()) = price;
        debug!(network_price = %network_price, gas_price = %price, "Gas price refreshed");
        Ok(())
    }

    async fn register_relay(&self, stake_address: Address) -> Result<(), Error> {
        let hub = self.hub_address();
        let call = IRelayHub::registerRelayCall {
            transactionFee: self.params.fee,
            url: self.params.url.clone(),
        };
        let request = TransactionRequest::default()
            .with_to(hub)
            .with_input(call.abi_encode());

        let gas_price = self.gas_price();
        if gas_price.is_zero() {
            return Err(Error::Rejected("gas price not yet known".into()));
        }

        let _guard = self.tx_lock.lock().await;
        let nonce = self.pending_nonce().await?;
        let envelope = self
            .sign_and_send(request, nonce, self.params.gas_limit, gas_price)
            .await?;

        info!(
            hub = %hub,
            stake_address = %stake_address,
            tx_hash = %envelope.tx_hash(),
            "registerRelay submitted"
        );
        Ok(())
    }

    async fn create_relay_transaction(
        &self,
        request: RelayTransactionRequest,
    ) -> Result<SignedRelayTransaction, Error> {
        let hub = self.hub_address();
        validate_request(&request, hub, self.gas_price(), self.params.fee)?;

        let request_gas = u64::try_from(request.gas_limit)
            .map_err(|_| Error::Rejected(format!("gas limit {} out of range", request.gas_limit)))?;
        let gas_limit = request_gas.saturating_add(self.params.gas_limit);

        let call = IRelayHub::relayCallCall {
            from: request.from,
            recipient: request.to,
            encodedFunction: request.encoded_function.clone(),
            transactionFee: request.relay_fee,
            gasPrice: request.gas_price,
            gasLimit: request.gas_limit,
            nonce: request.recipient_nonce,
            signature: request.signature.clone(),
            approvalData: request.approval_data.clone(),
        };
        let tx_request = TransactionRequest::default()
            .with_to(hub)
            .with_input(call.abi_encode());

        let _guard = self.tx_lock.lock().await;
        let nonce = self.pending_nonce().await?;
        if nonce > request.relay_max_nonce {
            return Err(Error::Rejected(format!(
                "unacceptable relayMaxNonce {}, relay nonce is {nonce}",
                request.relay_max_nonce
            )));
        }

        let envelope = self
            .sign_and_send(tx_request, nonce, gas_limit, request.gas_price)
            .await?;
        let signed = to_signed_relay_transaction(&envelope)?;

        info!(
            from = %request.from,
            to = %request.to,
            nonce,
            tx_hash = %signed.hash,
            "Relayed transaction signed"
        );
        Ok(signed)
    }

    async fn audit_relay_transaction(&self, tx: TxEnvelope) -> Result<(), Error> {
        let signer = tx
            .recover_signer()
            .map_err(|e| Error::Audit(format!("could not recover signer: {e}")))?;
        let hub = self.hub_address();

        let relay = self.relay_state(hub, signer).await?;
        if relay.state == STATE_UNKNOWN {
            return Err(Error::Audit(format!("{signer} is not a relay on hub {hub}")));
        }

        let mined = self
            .provider
            .get_transaction_count(signer)
            .await
            .map_err(|e| Error::Rpc(format!("eth_getTransactionCount: {e}")))?;
        let nonce = tx.nonce();
        if nonce >= mined {
            debug!(relay = %signer, nonce, mined, "Audited nonce not yet mined");
            return Ok(());
        }

        let tx_hash = *tx.tx_hash();
        let known = self
            .provider
            .get_transaction_by_hash(tx_hash)
            .await
            .map_err(|e| Error::Rpc(format!("eth_getTransactionByHash: {e}")))?;

        if known.is_none() {
            warn!(relay = %signer, nonce, tx_hash = %tx_hash, "Relay signed a repeated nonce");
            return Err(Error::Audit(format!(
                "relay {signer} signed nonce {nonce} twice (tx {tx_hash} not on chain)"
            )));
        }

        debug!(relay = %signer, tx_hash = %tx_hash, "Audited transaction is on chain");
        Ok(())
    }
}

/// Network price raised by `factor` percent. Cannot overflow: the product
/// of a `u128` price and a `u64`-plus-100 factor fits in 256 bits.
fn apply_gas_price_factor(network_price: u128, factor: u64) -> U256 {
    let percent = U256::from(factor) + U256::from(100u64);
    U256::from(network_price) * percent / U256::from(100u64)
}

/// Reject requests this relay would not be paid for.
fn validate_request(
    request: &RelayTransactionRequest,
    hub: Address,
    min_gas_price: U256,
    min_fee: U256,
) -> Result<(), Error> {
    if request.relay_hub_address != hub {
        return Err(Error::Rejected(format!(
            "wrong hub address {}, relay serves {hub}",
            request.relay_hub_address
        )));
    }
    if request.gas_price < min_gas_price {
        return Err(Error::Rejected(format!(
            "unacceptable gasPrice {}, minimum is {min_gas_price}",
            request.gas_price
        )));
    }
    if request.relay_fee < min_fee {
        return Err(Error::Rejected(format!(
            "unacceptable fee {}, minimum is {min_fee}",
            request.relay_fee
        )));
    }
    Ok(())
}

fn to_signed_relay_transaction(envelope: &TxEnvelope) -> Result<SignedRelayTransaction, Error> {
    let signed = envelope
        .as_legacy()
        .ok_or_else(|| Error::Signing("expected a legacy transaction".into()))?;
    let tx = signed.tx();
    let signature = signed.signature();

    let parity = U256::from(signature.v() as u64);
    let v = match tx.chain_id {
        Some(chain_id) => U256::from(chain_id) * U256::from(2u64) + U256::from(35u64) + parity,
        None => U256::from(27u64) + parity,
    };

    Ok(SignedRelayTransaction {
        nonce: U256::from(tx.nonce),
        gas_price: U256::from(tx.gas_price),
        gas: U256::from(tx.gas_limit),
        to: tx.to.to().copied().unwrap_or_default(),
        value: tx.value,
        input: tx.input.clone(),
        v,
        r: signature.r(),
        s: signature.s(),
        hash: *signed.hash(),
        raw: Bytes::from(envelope.encoded_2718()),
    })
}
