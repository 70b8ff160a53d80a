//! Known networks and the destination chain rule

use std::fmt;
use std::str::FromStr;

use crate::error::XBridgeError;

/// OP Sepolia
pub const OPTIMISM_CHAIN_ID: u64 = 11_155_420;
/// Base Sepolia
pub const BASE_CHAIN_ID: u64 = 84_532;

/// A network the bridge apps are deployed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Optimism,
    Base,
}

impl Network {
    pub const ALL: [Network; 2] = [Network::Optimism, Network::Base];

    /// Config key and CLI name
    pub fn name(&self) -> &'static str {
        match self {
            Network::Optimism => "optimism",
            Network::Base => "base",
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Optimism => OPTIMISM_CHAIN_ID,
            Network::Base => BASE_CHAIN_ID,
        }
    }

    /// The other end of the channel
    pub fn counterpart(&self) -> Network {
        match self {
            Network::Optimism => Network::Base,
            Network::Base => Network::Optimism,
        }
    }

    pub fn from_chain_id(chain_id: u64) -> Option<Network> {
        Network::ALL.into_iter().find(|n| n.chain_id() == chain_id)
    }

    /// Prefix for per-network environment variables (e.g. `OPTIMISM_RPC_URL`)
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Network::Optimism => "OPTIMISM",
            Network::Base => "BASE",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Network {
    type Err = XBridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "optimism" => Ok(Network::Optimism),
            "base" => Ok(Network::Base),
            other => Err(XBridgeError::UnknownNetwork(other.to_string())),
        }
    }
}

/// Chain id passed to `bridge` as the destination.
///
/// Base Sepolia sends to OP Sepolia; every other source sends to Base Sepolia.
pub fn destination_chain_id(source_chain_id: u64) -> u64 {
    if source_chain_id == BASE_CHAIN_ID {
        OPTIMISM_CHAIN_ID
    } else {
        BASE_CHAIN_ID
    }
}
