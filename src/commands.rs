//! Bridge commands
//!
//! Each command resolves its parameters from the packet config in a pure
//! [`plan`] step, then [`execute`] signs and sends the single resulting
//! transaction and optionally follows the packet it emits.
//!
//! | Command      | Section               | Contract  | Signer | Native value |
//! |--------------|-----------------------|-----------|--------|--------------|
//! | `bridge`     | `sendPacket`          | XBridge   | 0      | 0.00001      |
//! | `withdraw`   | `sendPacket`          | XBridge   | 0      | (amount arg) |
//! | `uc-bridge`  | `sendUniversalPacket` | XBridgeUC | 1      | 0.00001      |
//! | `uc-deposit` | `sendUniversalPacket` | XBridgeUC | 0      | 0.0001       |

use alloy::primitives::{Address, U256};
use alloy::rpc::types::Log;
use eyre::{Result, WrapErr};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{Config, PacketConfigFile, PacketKind};
use crate::encoding::{bytes32_to_hex, encode_bytes32_string, parse_native_amount};
use crate::error::XBridgeError;
use crate::events::find_send_packet;
use crate::evm_client::EvmClient;
use crate::listener::{
    log_send_event, ListenEndpoint, ListenOutcome, PacketListener, PacketTracker,
};
use crate::network::{destination_chain_id, Network};

/// A bridge app operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `XBridge.bridge`
    Bridge,
    /// `XBridge.withdraw`
    Withdraw,
    /// `XBridgeUC.bridge`
    UniversalBridge,
    /// `XBridgeUC.deposit`
    UniversalDeposit,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Bridge => "bridge",
            Command::Withdraw => "withdraw",
            Command::UniversalBridge => "uc-bridge",
            Command::UniversalDeposit => "uc-deposit",
        }
    }

    pub fn packet_kind(&self) -> PacketKind {
        match self {
            Command::Bridge | Command::Withdraw => PacketKind::Standard,
            Command::UniversalBridge | Command::UniversalDeposit => PacketKind::Universal,
        }
    }

    /// Signer account index (0-based) the command sends from
    pub fn signer_index(&self) -> usize {
        match self {
            Command::UniversalBridge => 1,
            _ => 0,
        }
    }

    /// Hardcoded native amount in ether
    pub fn default_amount(&self) -> &'static str {
        match self {
            Command::UniversalDeposit => "0.0001",
            _ => "0.00001",
        }
    }
}

/// The fully encoded contract call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    Bridge {
        channel_id: [u8; 32],
        timeout_seconds: u64,
        dest_chain_id: u64,
        value: U256,
    },
    Withdraw {
        channel_id: [u8; 32],
        timeout_seconds: u64,
        amount: U256,
    },
    UniversalBridge {
        dest_port: Address,
        channel_id: [u8; 32],
        timeout_seconds: u64,
        dest_chain_id: u64,
        value: U256,
    },
    UniversalDeposit {
        dest_port: Address,
        channel_id: [u8; 32],
        timeout_seconds: u64,
        value: U256,
    },
}

impl ContractCall {
    pub fn function_name(&self) -> &'static str {
        match self {
            ContractCall::Bridge { .. } | ContractCall::UniversalBridge { .. } => "bridge",
            ContractCall::Withdraw { .. } => "withdraw",
            ContractCall::UniversalDeposit { .. } => "deposit",
        }
    }

    /// Native value attached to the transaction
    pub fn value(&self) -> U256 {
        match self {
            ContractCall::Bridge { value, .. }
            | ContractCall::UniversalBridge { value, .. }
            | ContractCall::UniversalDeposit { value, .. } => *value,
            ContractCall::Withdraw { .. } => U256::ZERO,
        }
    }

    pub fn channel_id(&self) -> &[u8; 32] {
        match self {
            ContractCall::Bridge { channel_id, .. }
            | ContractCall::Withdraw { channel_id, .. }
            | ContractCall::UniversalBridge { channel_id, .. }
            | ContractCall::UniversalDeposit { channel_id, .. } => channel_id,
        }
    }
}

/// Everything needed to send one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketPlan {
    pub command: Command,
    pub network: Network,
    /// Local app contract the call goes to
    pub app_address: Address,
    pub signer_index: usize,
    /// Channel id as written in the config
    pub channel_name: String,
    /// Counterparty's channel id, when its entry is configured
    pub counterparty_channel: Option<[u8; 32]>,
    pub timeout_seconds: u64,
    pub call: ContractCall,
}

/// Resolve a command's parameters for `network` from the packet config.
///
/// `amount` overrides the command's hardcoded native amount.
pub fn plan(
    command: Command,
    network: Network,
    file: &PacketConfigFile,
    amount: Option<&str>,
) -> Result<PacketPlan, XBridgeError> {
    let section = file.section(command.packet_kind())?;
    let entry = section.entry(network)?;
    let app_address = section.app_address(network)?;

    let channel_id = encode_bytes32_string(&entry.channel_id)?;
    let timeout_seconds = entry.timeout;
    let amount = parse_native_amount(amount.unwrap_or(command.default_amount()))?;
    let dest_chain_id = destination_chain_id(network.chain_id());

    // Only used to narrow the listener, so an unusable counterpart entry
    // never blocks the send.
    let counterparty_channel = match section.entry(network.counterpart()) {
        Ok(other) => match encode_bytes32_string(&other.channel_id) {
            Ok(encoded) => Some(encoded),
            Err(e) => {
                warn!(
                    network = %network.counterpart(),
                    channel = %other.channel_id,
                    error = %e,
                    "Ignoring counterparty channel id"
                );
                None
            }
        },
        Err(_) => None,
    };

    let call = match command {
        Command::Bridge => ContractCall::Bridge {
            channel_id,
            timeout_seconds,
            dest_chain_id,
            value: amount,
        },
        Command::Withdraw => ContractCall::Withdraw {
            channel_id,
            timeout_seconds,
            amount,
        },
        Command::UniversalBridge => ContractCall::UniversalBridge {
            dest_port: section.destination_port(network)?,
            channel_id,
            timeout_seconds,
            dest_chain_id,
            value: amount,
        },
        Command::UniversalDeposit => ContractCall::UniversalDeposit {
            dest_port: section.destination_port(network)?,
            channel_id,
            timeout_seconds,
            value: amount,
        },
    };

    Ok(PacketPlan {
        command,
        network,
        app_address,
        signer_index: command.signer_index(),
        channel_name: entry.channel_id.clone(),
        counterparty_channel,
        timeout_seconds,
        call,
    })
}

/// Options shared by every command
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Override of the hardcoded native amount, in ether
    pub amount: Option<String>,
    /// Skip following the packet after sending
    pub no_listen: bool,
}

/// Listener endpoints for both ends of the channel, or `None` when
/// listening is disabled
pub fn listen_endpoints(
    config: &Config,
    source: Network,
    no_listen: bool,
) -> Result<Option<(ListenEndpoint<'_>, ListenEndpoint<'_>)>> {
    if no_listen {
        return Ok(None);
    }

    let dest = source.counterpart();
    Ok(Some((
        ListenEndpoint {
            network: source,
            rpc_url: config.rpc_url(source)?,
            dispatcher: config.dispatcher(source)?,
        },
        ListenEndpoint {
            network: dest,
            rpc_url: config.rpc_url(dest)?,
            dispatcher: config.dispatcher(dest)?,
        },
    )))
}

/// Tracker for the packet emitted in a send receipt, if it carries a
/// `SendPacket` from `dispatcher`
pub fn tracker_for(plan: &PacketPlan, logs: &[Log], dispatcher: Address) -> Option<PacketTracker> {
    let send_event = find_send_packet(logs, Some(dispatcher))?;
    log_send_event(plan.network, &send_event);

    Some(PacketTracker::new(
        plan.network,
        *plan.call.channel_id(),
        plan.counterparty_channel,
        send_event.sequence,
    ))
}

/// Plan, send, and (unless disabled) follow one command
pub async fn execute(
    config: &Config,
    command: Command,
    options: &RunOptions,
    shutdown: mpsc::Receiver<()>,
) -> Result<()> {
    let file = PacketConfigFile::load(&config.config_path)?;
    let plan = plan(command, config.network, &file, options.amount.as_deref())?;

    info!(
        command = command.name(),
        network = %plan.network,
        app = %plan.app_address,
        channel = %plan.channel_name,
        channel_bytes = %bytes32_to_hex(plan.call.channel_id()),
        timeout_secs = plan.timeout_seconds,
        value = %plan.call.value(),
        "Prepared packet"
    );

    let source = plan.network;

    // The listener connects to both chains before anything is signed.
    let listener = match listen_endpoints(config, source, options.no_listen)? {
        Some((source_endpoint, dest_endpoint)) => {
            let dispatcher = source_endpoint.dispatcher;
            let listener = PacketListener::connect(
                source_endpoint,
                dest_endpoint,
                Duration::from_millis(config.poll_interval_ms),
                Duration::from_secs(plan.timeout_seconds + config.listen_grace_secs),
            )
            .await
            .wrap_err("Failed to connect packet listener")?;
            Some((listener, dispatcher))
        }
        None => None,
    };

    let client = EvmClient::new(
        config.rpc_url(source)?,
        source,
        config.private_key(plan.signer_index)?,
    )?;
    client.verify_chain_id().await?;

    let sent = client
        .submit(plan.app_address, &plan.call)
        .await
        .wrap_err_with(|| format!("{} on {} failed", command.name(), source))?;

    info!(
        tx_hash = %sent.tx_hash,
        sender = %client.address(),
        "Packet transaction mined"
    );

    // From here on the packet is sent; listener trouble is only reported.
    let Some((mut listener, dispatcher)) = listener else {
        return Ok(());
    };

    let Some(mut tracker) = tracker_for(&plan, &sent.logs, dispatcher) else {
        warn!(
            tx_hash = %sent.tx_hash,
            "No SendPacket event in receipt, nothing to follow"
        );
        return Ok(());
    };

    if let Some(block) = sent.block_number {
        listener.start_source_at(block);
    }

    match listener.run(&mut tracker, shutdown).await {
        ListenOutcome::Acknowledged => info!(sequence = tracker.sequence(), "Packet acknowledged"),
        ListenOutcome::TimedOut => warn!(sequence = tracker.sequence(), "Packet timed out"),
        ListenOutcome::DeadlineElapsed | ListenOutcome::Interrupted => {
            info!(stage = ?tracker.stage(), "Listener stopped")
        }
    }

    Ok(())
}
