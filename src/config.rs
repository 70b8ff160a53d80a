//! Configuration
//!
//! Two sources feed every command:
//!
//! - the packet config file (JSON, `CONFIG_PATH`), which maps each network to
//!   its channel id, timeout, and app port address, and
//! - the environment (optionally a `.env` file), which supplies the active
//!   network, RPC endpoints, signer keys, and dispatcher addresses.

use alloy::primitives::Address;
use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::XBridgeError;
use crate::network::Network;

/// Number of signer accounts read from `PRIVATE_KEY_1..=PRIVATE_KEY_N`
pub const MAX_SIGNERS: usize = 3;

const DEFAULT_CONFIG_PATH: &str = "config.json";

// ============================================================================
// Packet config file
// ============================================================================

/// Which packet flavour a command sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Direct vIBC packet through the dispatcher (`sendPacket`)
    Standard,
    /// Universal packet through the UC middleware (`sendUniversalPacket`)
    Universal,
}

impl PacketKind {
    pub fn section_name(&self) -> &'static str {
        match self {
            PacketKind::Standard => "sendPacket",
            PacketKind::Universal => "sendUniversalPacket",
        }
    }
}

/// Per-network packet parameters
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketEntry {
    pub channel_id: String,
    /// Packet timeout in seconds
    pub timeout: u64,
    #[serde(default)]
    pub port_addr: Option<String>,
}

/// The JSON packet config file. Keys other than the two packet sections are
/// ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketConfigFile {
    #[serde(default)]
    pub send_packet: Option<BTreeMap<String, PacketEntry>>,
    #[serde(default)]
    pub send_universal_packet: Option<BTreeMap<String, PacketEntry>>,
}

impl PacketConfigFile {
    /// Read and parse the config file at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&raw)
            .wrap_err_with(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// The section used by `kind`
    pub fn section(&self, kind: PacketKind) -> Result<PacketSection<'_>, XBridgeError> {
        let entries = match kind {
            PacketKind::Standard => self.send_packet.as_ref(),
            PacketKind::Universal => self.send_universal_packet.as_ref(),
        };

        entries
            .map(|entries| PacketSection { kind, entries })
            .ok_or(XBridgeError::MissingSection(kind.section_name()))
    }
}

/// A borrowed view of one packet section
#[derive(Debug, Clone, Copy)]
pub struct PacketSection<'a> {
    kind: PacketKind,
    entries: &'a BTreeMap<String, PacketEntry>,
}

impl<'a> PacketSection<'a> {
    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    /// The entry keyed by `network`'s name
    pub fn entry(&self, network: Network) -> Result<&'a PacketEntry, XBridgeError> {
        self.entries
            .get(network.name())
            .ok_or_else(|| XBridgeError::MissingNetworkEntry {
                section: self.kind.section_name(),
                network: network.name().to_string(),
            })
    }

    /// Address of the app contract deployed on `network`
    pub fn app_address(&self, network: Network) -> Result<Address, XBridgeError> {
        self.port_address(network)
    }

    /// Port address of the receiving app for a packet sent from `source`.
    ///
    /// Sending on optimism targets base's port; any other source targets
    /// optimism's port.
    pub fn destination_port(&self, source: Network) -> Result<Address, XBridgeError> {
        let dest = match source {
            Network::Optimism => Network::Base,
            _ => Network::Optimism,
        };
        self.port_address(dest)
    }

    fn port_address(&self, network: Network) -> Result<Address, XBridgeError> {
        let entry = self.entry(network)?;
        let raw = entry
            .port_addr
            .as_deref()
            .ok_or_else(|| XBridgeError::MissingPortAddress {
                section: self.kind.section_name(),
                network: network.name().to_string(),
            })?;
        parse_address(raw)
    }
}

/// Parse a 0x-prefixed EVM address
pub fn parse_address(value: &str) -> Result<Address, XBridgeError> {
    Address::from_str(value.trim()).map_err(|e| XBridgeError::InvalidAddress {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

// ============================================================================
// Runtime configuration (environment)
// ============================================================================

/// Runtime configuration resolved from the environment
#[derive(Clone)]
pub struct Config {
    /// Path to the packet config file
    pub config_path: PathBuf,
    /// Network the transaction is sent on
    pub network: Network,

    /// `OPTIMISM_RPC_URL`
    pub optimism_rpc_url: Option<String>,
    /// `BASE_RPC_URL`
    pub base_rpc_url: Option<String>,

    /// `PRIVATE_KEY_1..=3`, indexed from 0
    pub private_keys: [Option<String>; MAX_SIGNERS],

    /// `OPTIMISM_DISPATCHER`
    pub optimism_dispatcher: Option<String>,
    /// `BASE_DISPATCHER`
    pub base_dispatcher: Option<String>,

    /// Listener poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Seconds to keep listening past the packet timeout
    pub listen_grace_secs: u64,
}

/// Custom Debug that redacts private keys to prevent accidental log leakage.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self
            .private_keys
            .iter()
            .map(|k| if k.is_some() { "<redacted>" } else { "<unset>" })
            .collect();

        f.debug_struct("Config")
            .field("config_path", &self.config_path)
            .field("network", &self.network)
            .field("optimism_rpc_url", &self.optimism_rpc_url)
            .field("base_rpc_url", &self.base_rpc_url)
            .field("private_keys", &keys)
            .field("optimism_dispatcher", &self.optimism_dispatcher)
            .field("base_dispatcher", &self.base_dispatcher)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("listen_grace_secs", &self.listen_grace_secs)
            .finish()
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// `network_override` takes precedence over `NETWORK` / `HARDHAT_NETWORK`.
    pub fn load(network_override: Option<&str>) -> Result<Self> {
        // Try to load .env file
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded .env from {:?}", path);
        }

        Self::from_lookup(|key| env::var(key).ok(), network_override)
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F, network_override: Option<&str>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let network_name = network_override
            .map(str::to_string)
            .or_else(|| non_empty("NETWORK"))
            .or_else(|| non_empty("HARDHAT_NETWORK"))
            .ok_or_else(|| eyre!("NETWORK required (or pass --network)"))?;
        let network: Network = network_name.parse()?;

        let private_keys = [
            non_empty("PRIVATE_KEY_1"),
            non_empty("PRIVATE_KEY_2"),
            non_empty("PRIVATE_KEY_3"),
        ];
        if private_keys.iter().all(Option::is_none) {
            return Err(eyre!("PRIVATE_KEY_1 required"));
        }

        Ok(Self {
            config_path: non_empty("CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
            network,

            optimism_rpc_url: non_empty("OPTIMISM_RPC_URL"),
            base_rpc_url: non_empty("BASE_RPC_URL"),

            private_keys,

            optimism_dispatcher: non_empty("OPTIMISM_DISPATCHER"),
            base_dispatcher: non_empty("BASE_DISPATCHER"),

            poll_interval_ms: lookup("POLL_INTERVAL_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(2000),
            listen_grace_secs: lookup("LISTEN_GRACE_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        })
    }

    /// RPC endpoint for `network`
    pub fn rpc_url(&self, network: Network) -> Result<&str> {
        let url = match network {
            Network::Optimism => self.optimism_rpc_url.as_deref(),
            Network::Base => self.base_rpc_url.as_deref(),
        };
        url.ok_or_else(|| eyre!("{}_RPC_URL required", network.env_prefix()))
    }

    /// Private key of signer account `index` (0-based)
    pub fn private_key(&self, index: usize) -> Result<&str, XBridgeError> {
        self.private_keys
            .get(index)
            .and_then(|k| k.as_deref())
            .ok_or(XBridgeError::MissingSigner(index))
    }

    /// Dispatcher contract on `network`, required for packet listening
    pub fn dispatcher(&self, network: Network) -> Result<Address> {
        let raw = match network {
            Network::Optimism => self.optimism_dispatcher.as_deref(),
            Network::Base => self.base_dispatcher.as_deref(),
        }
        .ok_or_else(|| eyre!("{}_DISPATCHER required", network.env_prefix()))?;

        Ok(parse_address(raw)?)
    }
}
