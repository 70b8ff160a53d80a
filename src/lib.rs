//! XBridge packet sender - Library interface
//!
//! Re-exports internal modules for use in integration tests.

pub mod commands;
pub mod config;
pub mod contracts;
pub mod encoding;
pub mod error;
pub mod events;
pub mod evm_client;
pub mod listener;
pub mod network;
