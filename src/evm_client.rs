//! EVM client for bridge app transactions
//!
//! Signs and submits the planned bridge call, then waits for the receipt.
//!
//! # Transaction Building
//!
//! Uses Alloy's `ProviderBuilder::with_recommended_fillers()` to automatically
//! populate transaction fields (nonce, gas_limit, max_fee_per_gas,
//! max_priority_fee_per_gas).

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, FixedBytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::Log;
use alloy::signers::local::PrivateKeySigner;
use eyre::{eyre, Result, WrapErr};
use tracing::{debug, info};
use url::Url;

use crate::commands::ContractCall;
use crate::contracts::{XBridge, XBridgeUC};
use crate::network::Network;

/// Outcome of a mined transaction
#[derive(Debug, Clone)]
pub struct SubmittedTx {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub logs: Vec<Log>,
}

/// EVM client bound to one network and one signer account
pub struct EvmClient {
    rpc_url: Url,
    network: Network,
    signer: PrivateKeySigner,
}

impl EvmClient {
    pub fn new(rpc_url: &str, network: Network, private_key: &str) -> Result<Self> {
        let rpc_url: Url = rpc_url.parse().wrap_err("Invalid RPC URL")?;
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .wrap_err("Invalid private key")?;

        info!(
            network = %network,
            sender = %signer.address(),
            "EVM client initialized"
        );

        Ok(Self {
            rpc_url,
            network,
            signer,
        })
    }

    /// Sender address
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Refuse to sign for a chain other than the one the network names
    pub async fn verify_chain_id(&self) -> Result<()> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());
        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| eyre!("Failed to get chain id: {}", e))?;

        if chain_id != self.network.chain_id() {
            return Err(eyre!(
                "RPC for network '{}' reports chain id {}, expected {}",
                self.network,
                chain_id,
                self.network.chain_id()
            ));
        }

        debug!(chain_id, "Chain id verified");
        Ok(())
    }

    /// Send `call` to the app at `app_address` and wait for it to be mined
    pub async fn submit(&self, app_address: Address, call: &ContractCall) -> Result<SubmittedTx> {
        let wallet = EthereumWallet::from(self.signer.clone());
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(self.rpc_url.clone());

        debug!(
            app = %app_address,
            function = call.function_name(),
            value = %call.value(),
            "Submitting bridge transaction"
        );

        let pending = match *call {
            ContractCall::Bridge {
                channel_id,
                timeout_seconds,
                dest_chain_id,
                value,
            } => {
                XBridge::new(app_address, &provider)
                    .bridge(
                        FixedBytes(channel_id),
                        timeout_seconds,
                        U256::from(dest_chain_id),
                    )
                    .value(value)
                    .send()
                    .await
            }
            ContractCall::Withdraw {
                channel_id,
                timeout_seconds,
                amount,
            } => {
                XBridge::new(app_address, &provider)
                    .withdraw(FixedBytes(channel_id), timeout_seconds, amount)
                    .send()
                    .await
            }
            ContractCall::UniversalBridge {
                dest_port,
                channel_id,
                timeout_seconds,
                dest_chain_id,
                value,
            } => {
                XBridgeUC::new(app_address, &provider)
                    .bridge(
                        dest_port,
                        FixedBytes(channel_id),
                        timeout_seconds,
                        U256::from(dest_chain_id),
                    )
                    .value(value)
                    .send()
                    .await
            }
            ContractCall::UniversalDeposit {
                dest_port,
                channel_id,
                timeout_seconds,
                value,
            } => {
                XBridgeUC::new(app_address, &provider)
                    .deposit(dest_port, FixedBytes(channel_id), timeout_seconds)
                    .value(value)
                    .send()
                    .await
            }
        }
        .map_err(|e| eyre!("Failed to send {} tx: {}", call.function_name(), e))?;

        let tx_hash = *pending.tx_hash();
        info!(tx_hash = %tx_hash, "Transaction sent");

        // Wait for confirmation
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| eyre!("Failed to get receipt: {}", e))?;

        if !receipt.status() {
            return Err(eyre!("{} transaction reverted", call.function_name()));
        }

        info!(
            tx_hash = %tx_hash,
            block = ?receipt.block_number,
            "Transaction confirmed"
        );

        Ok(SubmittedTx {
            tx_hash,
            block_number: receipt.block_number,
            logs: receipt.inner.logs().to_vec(),
        })
    }
}
