//! Dispatcher event parsing
//!
//! Provides typed packet lifecycle events decoded from vIBC dispatcher logs.

use alloy::primitives::{Address, B256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use tracing::warn;

use crate::contracts::Dispatcher;

/// Lifecycle step reported by a dispatcher event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketEventKind {
    /// Packet committed on the source chain
    Send { timeout_timestamp: u64 },
    /// Packet delivered on the destination chain
    Recv,
    /// Destination app wrote its acknowledgement
    WriteAck { success: bool },
    /// Acknowledgement relayed back to the source chain
    Acknowledgement,
    /// Packet timed out on the source chain
    Timeout,
}

/// A decoded dispatcher event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketEvent {
    pub kind: PacketEventKind,
    /// Port of the app on the emitting side
    pub port: Address,
    /// Channel id on the emitting side (bytes32)
    pub channel_id: [u8; 32],
    pub sequence: u64,
    pub block_number: Option<u64>,
    pub tx_hash: Option<B256>,
}

impl PacketEvent {
    pub fn label(&self) -> &'static str {
        match self.kind {
            PacketEventKind::Send { .. } => "SendPacket",
            PacketEventKind::Recv => "RecvPacket",
            PacketEventKind::WriteAck { .. } => "WriteAckPacket",
            PacketEventKind::Acknowledgement => "Acknowledgement",
            PacketEventKind::Timeout => "Timeout",
        }
    }
}

/// Topics of every event the listener subscribes to
pub fn packet_event_topics() -> Vec<B256> {
    vec![
        Dispatcher::SendPacket::SIGNATURE_HASH,
        Dispatcher::RecvPacket::SIGNATURE_HASH,
        Dispatcher::WriteAckPacket::SIGNATURE_HASH,
        Dispatcher::Acknowledgement::SIGNATURE_HASH,
        Dispatcher::Timeout::SIGNATURE_HASH,
    ]
}

/// Decode a dispatcher log, returning `None` for unrelated or malformed logs
pub fn parse_packet_log(log: &Log) -> Option<PacketEvent> {
    let topic0 = *log.topic0()?;

    let (kind, port, channel_id, sequence) = if topic0 == Dispatcher::SendPacket::SIGNATURE_HASH
    {
        let ev = decode::<Dispatcher::SendPacket>(log)?;
        (
            PacketEventKind::Send {
                timeout_timestamp: ev.timeoutTimestamp,
            },
            ev.sourcePortAddress,
            ev.sourceChannelId.0,
            ev.sequence,
        )
    } else if topic0 == Dispatcher::RecvPacket::SIGNATURE_HASH {
        let ev = decode::<Dispatcher::RecvPacket>(log)?;
        (
            PacketEventKind::Recv,
            ev.destPortAddress,
            ev.destChannelId.0,
            ev.sequence,
        )
    } else if topic0 == Dispatcher::WriteAckPacket::SIGNATURE_HASH {
        let ev = decode::<Dispatcher::WriteAckPacket>(log)?;
        (
            PacketEventKind::WriteAck {
                success: ev.ackPacket.success,
            },
            ev.writerPortAddress,
            ev.writerChannelId.0,
            ev.sequence,
        )
    } else if topic0 == Dispatcher::Acknowledgement::SIGNATURE_HASH {
        let ev = decode::<Dispatcher::Acknowledgement>(log)?;
        (
            PacketEventKind::Acknowledgement,
            ev.sourcePortAddress,
            ev.sourceChannelId.0,
            ev.sequence,
        )
    } else if topic0 == Dispatcher::Timeout::SIGNATURE_HASH {
        let ev = decode::<Dispatcher::Timeout>(log)?;
        (
            PacketEventKind::Timeout,
            ev.sourcePortAddress,
            ev.sourceChannelId.0,
            ev.sequence,
        )
    } else {
        return None;
    };

    Some(PacketEvent {
        kind,
        port,
        channel_id,
        sequence,
        block_number: log.block_number,
        tx_hash: log.transaction_hash,
    })
}

fn decode<E: SolEvent>(log: &Log) -> Option<E> {
    match E::decode_log(&log.inner, true) {
        Ok(decoded) => Some(decoded.data),
        Err(e) => {
            warn!(
                event = E::SIGNATURE,
                block = ?log.block_number,
                tx = ?log.transaction_hash,
                error = %e,
                "Failed to decode dispatcher event"
            );
            None
        }
    }
}

/// Find the packet committed by a transaction among its receipt logs.
///
/// When `dispatcher` is given only logs emitted by it are considered.
pub fn find_send_packet(logs: &[Log], dispatcher: Option<Address>) -> Option<PacketEvent> {
    logs.iter()
        .filter(|log| dispatcher.map_or(true, |d| log.address() == d))
        .filter_map(parse_packet_log)
        .find(|ev| matches!(ev.kind, PacketEventKind::Send { .. }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::encoding::encode_bytes32_string;
    use alloy::primitives::{Bytes, FixedBytes, LogData};

    pub(crate) fn make_log(emitter: Address, data: LogData, block: u64) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address: emitter,
                data,
            },
            block_number: Some(block),
            transaction_hash: Some(B256::repeat_byte(0xaa)),
            log_index: Some(0),
            ..Default::default()
        }
    }

    pub(crate) fn channel(name: &str) -> FixedBytes<32> {
        FixedBytes(encode_bytes32_string(name).unwrap())
    }

    pub(crate) fn send_log(emitter: Address, port: Address, chan: &str, seq: u64) -> Log {
        let ev = Dispatcher::SendPacket {
            sourcePortAddress: port,
            sourceChannelId: channel(chan),
            packet: Bytes::from_static(b"payload"),
            sequence: seq,
            timeoutTimestamp: 1_700_000_000_000_000_000,
        };
        make_log(emitter, ev.encode_log_data(), 10)
    }

    pub(crate) fn recv_log(emitter: Address, port: Address, chan: &str, seq: u64) -> Log {
        let ev = Dispatcher::RecvPacket {
            destPortAddress: port,
            destChannelId: channel(chan),
            sequence: seq,
        };
        make_log(emitter, ev.encode_log_data(), 20)
    }

    pub(crate) fn write_ack_log(emitter: Address, port: Address, chan: &str, seq: u64) -> Log {
        let ev = Dispatcher::WriteAckPacket {
            writerPortAddress: port,
            writerChannelId: channel(chan),
            sequence: seq,
            ackPacket: Dispatcher::AckPacket {
                success: true,
                data: Bytes::from_static(b"ok"),
            },
        };
        make_log(emitter, ev.encode_log_data(), 21)
    }

    pub(crate) fn ack_log(emitter: Address, port: Address, chan: &str, seq: u64) -> Log {
        let ev = Dispatcher::Acknowledgement {
            sourcePortAddress: port,
            sourceChannelId: channel(chan),
            sequence: seq,
        };
        make_log(emitter, ev.encode_log_data(), 30)
    }

    pub(crate) fn timeout_log(emitter: Address, port: Address, chan: &str, seq: u64) -> Log {
        let ev = Dispatcher::Timeout {
            sourcePortAddress: port,
            sourceChannelId: channel(chan),
            sequence: seq,
        };
        make_log(emitter, ev.encode_log_data(), 31)
    }

    #[test]
    fn test_parse_send_packet() {
        let dispatcher = Address::repeat_byte(0xd1);
        let port = Address::repeat_byte(0x11);
        let ev = parse_packet_log(&send_log(dispatcher, port, "channel-10", 7)).unwrap();

        assert_eq!(ev.label(), "SendPacket");
        assert_eq!(ev.port, port);
        assert_eq!(ev.channel_id, channel("channel-10").0);
        assert_eq!(ev.sequence, 7);
        assert_eq!(ev.block_number, Some(10));
        assert_eq!(
            ev.kind,
            PacketEventKind::Send {
                timeout_timestamp: 1_700_000_000_000_000_000
            }
        );
    }

    #[test]
    fn test_parse_write_ack_reads_success_flag() {
        let ev = parse_packet_log(&write_ack_log(
            Address::ZERO,
            Address::repeat_byte(0x22),
            "channel-11",
            3,
        ))
        .unwrap();
        assert_eq!(ev.kind, PacketEventKind::WriteAck { success: true });
        assert_eq!(ev.sequence, 3);
    }

    #[test]
    fn test_parse_timeout_with_indexed_sequence() {
        let ev = parse_packet_log(&timeout_log(
            Address::ZERO,
            Address::repeat_byte(0x11),
            "channel-10",
            42,
        ))
        .unwrap();
        assert_eq!(ev.kind, PacketEventKind::Timeout);
        assert_eq!(ev.sequence, 42);
    }

    #[test]
    fn test_parse_unrelated_log() {
        let data = LogData::new_unchecked(vec![B256::repeat_byte(0x01)], Bytes::new());
        assert!(parse_packet_log(&make_log(Address::ZERO, data, 1)).is_none());

        let empty = LogData::new_unchecked(vec![], Bytes::new());
        assert!(parse_packet_log(&make_log(Address::ZERO, empty, 1)).is_none());
    }

    #[test]
    fn test_parse_truncated_log() {
        let topics = vec![
            Dispatcher::RecvPacket::SIGNATURE_HASH,
            B256::repeat_byte(0x11),
        ];
        let data = LogData::new_unchecked(topics, Bytes::new());
        assert!(parse_packet_log(&make_log(Address::ZERO, data, 1)).is_none());
    }

    #[test]
    fn test_find_send_packet_filters_by_dispatcher() {
        let dispatcher = Address::repeat_byte(0xd1);
        let other = Address::repeat_byte(0xd2);
        let port = Address::repeat_byte(0x11);
        let logs = vec![
            send_log(other, port, "channel-99", 1),
            ack_log(dispatcher, port, "channel-10", 4),
            send_log(dispatcher, port, "channel-10", 5),
        ];

        let found = find_send_packet(&logs, Some(dispatcher)).unwrap();
        assert_eq!(found.sequence, 5);

        let any = find_send_packet(&logs, None).unwrap();
        assert_eq!(any.sequence, 1);

        assert!(find_send_packet(&logs[1..2], None).is_none());
    }

    #[test]
    fn test_topics_are_distinct() {
        let topics = packet_event_topics();
        let mut sorted = topics.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), topics.len());
    }
}
