//! Contract ABI definitions
//!
//! Uses alloy's sol! macro to generate type-safe bindings for the two bridge
//! apps and the vIBC dispatcher events they trigger.

use alloy::sol;

sol! {
    /// Bridge app speaking raw vIBC packets through the dispatcher
    #[sol(rpc)]
    contract XBridge {
        /// Lock native value and send a bridge packet to `destChainId`
        function bridge(bytes32 channelId, uint64 timeoutSeconds, uint256 destChainId) external payable;

        /// Request a withdrawal of `amount` from the counterpart chain
        function withdraw(bytes32 channelId, uint64 timeoutSeconds, uint256 amount) external;
    }
}

sol! {
    /// Bridge app speaking universal packets through the UC middleware
    #[sol(rpc)]
    contract XBridgeUC {
        /// Lock native value and send a universal bridge packet to `destPortAddr`
        function bridge(address destPortAddr, bytes32 channelId, uint64 timeoutSeconds, uint256 destChainId) external payable;

        /// Deposit native value into the remote app at `destPortAddr`
        function deposit(address destPortAddr, bytes32 channelId, uint64 timeoutSeconds) external payable;
    }
}

sol! {
    /// vIBC core dispatcher (events only)
    #[sol(rpc)]
    contract Dispatcher {
        struct AckPacket {
            bool success;
            bytes data;
        }

        event SendPacket(
            address indexed sourcePortAddress,
            bytes32 indexed sourceChannelId,
            bytes packet,
            uint64 sequence,
            uint64 timeoutTimestamp
        );

        event RecvPacket(
            address indexed destPortAddress,
            bytes32 indexed destChannelId,
            uint64 sequence
        );

        event WriteAckPacket(
            address indexed writerPortAddress,
            bytes32 indexed writerChannelId,
            uint64 sequence,
            AckPacket ackPacket
        );

        event Acknowledgement(
            address indexed sourcePortAddress,
            bytes32 indexed sourceChannelId,
            uint64 sequence
        );

        event Timeout(
            address indexed sourcePortAddress,
            bytes32 indexed sourceChannelId,
            uint64 indexed sequence
        );
    }
}
