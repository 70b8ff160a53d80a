//! Packet lifecycle listener
//!
//! After a packet is sent, the listener polls the dispatchers on both ends of
//! the channel and reports each lifecycle step:
//!
//! 1. `SendPacket` on the source chain (read from the send receipt)
//! 2. `RecvPacket` on the destination chain
//! 3. `WriteAckPacket` on the destination chain
//! 4. `Acknowledgement` (or `Timeout`) back on the source chain
//!
//! Only events matching the packet's sequence and channel advance the
//! tracker. The listener never relays anything itself.

use alloy::{
    primitives::Address,
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::Filter,
    transports::http::{Client, Http},
};
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::encoding::decode_bytes32_string;
use crate::events::{packet_event_topics, parse_packet_log, PacketEvent, PacketEventKind};
use crate::network::Network;

/// Maximum block range per `eth_getLogs` query
const MAX_BLOCK_RANGE: u64 = 2_000;

/// Where a tracked packet is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PacketStage {
    Sent,
    Received,
    AckWritten,
    Acknowledged,
    TimedOut,
}

impl PacketStage {
    pub fn is_final(&self) -> bool {
        matches!(self, PacketStage::Acknowledged | PacketStage::TimedOut)
    }
}

/// Follows a single packet identified by its source channel and sequence
#[derive(Debug, Clone)]
pub struct PacketTracker {
    source: Network,
    source_channel: [u8; 32],
    /// Channel id on the destination side, when known from config
    dest_channel: Option<[u8; 32]>,
    sequence: u64,
    stage: PacketStage,
}

impl PacketTracker {
    pub fn new(
        source: Network,
        source_channel: [u8; 32],
        dest_channel: Option<[u8; 32]>,
        sequence: u64,
    ) -> Self {
        Self {
            source,
            source_channel,
            dest_channel,
            sequence,
            stage: PacketStage::Sent,
        }
    }

    pub fn stage(&self) -> PacketStage {
        self.stage
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Feed an event observed on `origin`. Returns the new stage when the
    /// event moved the packet forward.
    pub fn observe(&mut self, origin: Network, event: &PacketEvent) -> Option<PacketStage> {
        if self.stage.is_final() || event.sequence != self.sequence {
            return None;
        }

        let on_source = origin == self.source;
        let next = match event.kind {
            PacketEventKind::Recv if !on_source && self.matches_dest(event) => {
                PacketStage::Received
            }
            PacketEventKind::WriteAck { .. } if !on_source && self.matches_dest(event) => {
                PacketStage::AckWritten
            }
            PacketEventKind::Acknowledgement
                if on_source && event.channel_id == self.source_channel =>
            {
                PacketStage::Acknowledged
            }
            PacketEventKind::Timeout if on_source && event.channel_id == self.source_channel => {
                PacketStage::TimedOut
            }
            _ => return None,
        };

        if next <= self.stage {
            return None;
        }
        self.stage = next;
        Some(next)
    }

    fn matches_dest(&self, event: &PacketEvent) -> bool {
        self.dest_channel.map_or(true, |c| c == event.channel_id)
    }
}

/// How a listening session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenOutcome {
    Acknowledged,
    TimedOut,
    DeadlineElapsed,
    Interrupted,
}

/// A stream of decoded dispatcher events from one chain
#[async_trait]
pub trait LogSource: Send {
    fn network(&self) -> Network;

    /// Events emitted since the previous poll
    async fn poll(&mut self) -> Result<Vec<PacketEvent>>;

    /// Restart the cursor at `block`
    fn start_at(&mut self, block: u64);
}

/// Log cursor over one chain's dispatcher
pub struct ChainCursor {
    network: Network,
    provider: RootProvider<Http<Client>>,
    dispatcher: Address,
    next_block: u64,
}

impl ChainCursor {
    /// Build the cursor without touching the network
    fn open(endpoint: &ListenEndpoint<'_>) -> Result<Self> {
        let provider = ProviderBuilder::new().on_http(
            endpoint
                .rpc_url
                .parse()
                .wrap_err_with(|| format!("Invalid {} RPC URL", endpoint.network))?,
        );

        Ok(Self {
            network: endpoint.network,
            provider,
            dispatcher: endpoint.dispatcher,
            next_block: 0,
        })
    }

    /// Move the cursor to the current chain head
    async fn seek_head(&mut self) -> Result<()> {
        self.next_block = self.head().await?;
        Ok(())
    }

    async fn head(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| eyre!("Failed to get {} block number: {}", self.network, e))
    }
}

#[async_trait]
impl LogSource for ChainCursor {
    fn network(&self) -> Network {
        self.network
    }

    /// Fetch dispatcher events from `next_block` up to the chain head
    async fn poll(&mut self) -> Result<Vec<PacketEvent>> {
        let head = self.head().await?;

        if head < self.next_block {
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        let mut from = self.next_block;
        while from <= head {
            let to = std::cmp::min(from + MAX_BLOCK_RANGE - 1, head);

            let filter = Filter::new()
                .address(self.dispatcher)
                .event_signature(packet_event_topics())
                .from_block(from)
                .to_block(to);

            let logs = self.provider.get_logs(&filter).await.wrap_err_with(|| {
                format!(
                    "Failed to get {} logs from block {} to {}",
                    self.network, from, to
                )
            })?;

            events.extend(logs.iter().filter_map(parse_packet_log));
            from = to + 1;
        }

        self.next_block = head + 1;
        Ok(events)
    }

    fn start_at(&mut self, block: u64) {
        self.next_block = block;
    }
}

/// Polls both ends of a channel until the tracked packet settles
pub struct PacketListener<S: LogSource = ChainCursor> {
    source: S,
    dest: S,
    poll_interval: Duration,
    max_wait: Duration,
}

/// Endpoint of one side of the channel
#[derive(Debug, Clone)]
pub struct ListenEndpoint<'a> {
    pub network: Network,
    pub rpc_url: &'a str,
    pub dispatcher: Address,
}

impl PacketListener<ChainCursor> {
    /// Connect to both chains and position each cursor at its current head.
    ///
    /// Both RPC URLs are parsed before either chain is queried, so a bad
    /// endpoint fails before any request is made.
    pub async fn connect(
        source: ListenEndpoint<'_>,
        dest: ListenEndpoint<'_>,
        poll_interval: Duration,
        max_wait: Duration,
    ) -> Result<Self> {
        let mut source_cursor = ChainCursor::open(&source)?;
        let mut dest_cursor = ChainCursor::open(&dest)?;

        source_cursor.seek_head().await?;
        dest_cursor.seek_head().await?;

        info!(
            source = %source.network,
            source_dispatcher = %source.dispatcher,
            dest = %dest.network,
            dest_dispatcher = %dest.dispatcher,
            "Packet event listener connected"
        );

        Ok(Self::new(source_cursor, dest_cursor, poll_interval, max_wait))
    }
}

impl<S: LogSource> PacketListener<S> {
    pub fn new(source: S, dest: S, poll_interval: Duration, max_wait: Duration) -> Self {
        Self {
            source,
            dest,
            poll_interval,
            max_wait,
        }
    }

    /// Start scanning the source chain at `block`, typically the block the
    /// packet was sent in.
    pub fn start_source_at(&mut self, block: u64) {
        self.source.start_at(block);
    }

    /// Poll until the packet is acknowledged or timed out, the wait budget
    /// runs out, or a shutdown signal arrives.
    pub async fn run(
        &mut self,
        tracker: &mut PacketTracker,
        mut shutdown: mpsc::Receiver<()>,
    ) -> ListenOutcome {
        info!(
            sequence = tracker.sequence(),
            max_wait_secs = self.max_wait.as_secs(),
            "Waiting for packet lifecycle events"
        );

        let deadline = Instant::now() + self.max_wait;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutdown signal received, stopping listener");
                    return ListenOutcome::Interrupted;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(
                        sequence = tracker.sequence(),
                        stage = ?tracker.stage(),
                        "Stopped waiting for packet before it settled"
                    );
                    return ListenOutcome::DeadlineElapsed;
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    self.poll_once(tracker).await;

                    match tracker.stage() {
                        PacketStage::Acknowledged => return ListenOutcome::Acknowledged,
                        PacketStage::TimedOut => return ListenOutcome::TimedOut,
                        _ => {}
                    }
                }
            }
        }
    }

    async fn poll_once(&mut self, tracker: &mut PacketTracker) {
        debug!("Polling dispatcher events");

        for cursor in [&mut self.dest, &mut self.source] {
            let network = cursor.network();
            match cursor.poll().await {
                Ok(events) => {
                    for event in events {
                        if let Some(stage) = tracker.observe(network, &event) {
                            log_event(network, &event, stage);
                        }
                    }
                }
                Err(e) => {
                    error!(network = %network, error = %e, "Error polling dispatcher events");
                }
            }
        }
    }
}

fn log_event(network: Network, event: &PacketEvent, stage: PacketStage) {
    let channel = decode_bytes32_string(&event.channel_id)
        .unwrap_or_else(|_| format!("0x{}", hex::encode(event.channel_id)));

    info!(
        network = %network,
        event = event.label(),
        port = %event.port,
        channel = %channel,
        sequence = event.sequence,
        block = ?event.block_number,
        tx_hash = ?event.tx_hash,
        stage = ?stage,
        "Packet event"
    );
}

/// Log the `SendPacket` found in the send receipt
pub fn log_send_event(network: Network, event: &PacketEvent) {
    log_event(network, event, PacketStage::Sent);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use crate::events::tests::{ack_log, channel, recv_log, send_log, timeout_log, write_ack_log};

    fn port() -> Address {
        Address::repeat_byte(0x11)
    }

    fn dispatcher() -> Address {
        Address::repeat_byte(0xd1)
    }

    fn tracker(seq: u64) -> PacketTracker {
        PacketTracker::new(
            Network::Optimism,
            channel("channel-10").0,
            Some(channel("channel-11").0),
            seq,
        )
    }

    fn ev(log: alloy::rpc::types::Log) -> PacketEvent {
        parse_packet_log(&log).unwrap()
    }

    #[test]
    fn test_full_lifecycle() {
        let mut t = tracker(5);
        assert_eq!(t.stage(), PacketStage::Sent);

        let recv = ev(recv_log(dispatcher(), port(), "channel-11", 5));
        assert_eq!(
            t.observe(Network::Base, &recv),
            Some(PacketStage::Received)
        );

        let write_ack = ev(write_ack_log(dispatcher(), port(), "channel-11", 5));
        assert_eq!(
            t.observe(Network::Base, &write_ack),
            Some(PacketStage::AckWritten)
        );

        let ack = ev(ack_log(dispatcher(), port(), "channel-10", 5));
        assert_eq!(
            t.observe(Network::Optimism, &ack),
            Some(PacketStage::Acknowledged)
        );
        assert!(t.stage().is_final());
    }

    #[test]
    fn test_ignores_other_sequences() {
        let mut t = tracker(5);
        let recv = ev(recv_log(dispatcher(), port(), "channel-11", 6));
        assert_eq!(t.observe(Network::Base, &recv), None);
        assert_eq!(t.stage(), PacketStage::Sent);
    }

    #[test]
    fn test_ignores_wrong_side() {
        let mut t = tracker(5);
        // Recv must come from the destination chain
        let recv = ev(recv_log(dispatcher(), port(), "channel-11", 5));
        assert_eq!(t.observe(Network::Optimism, &recv), None);

        // Acknowledgement must come from the source chain
        let ack = ev(ack_log(dispatcher(), port(), "channel-10", 5));
        assert_eq!(t.observe(Network::Base, &ack), None);
    }

    #[test]
    fn test_ignores_other_channels() {
        let mut t = tracker(5);
        let recv = ev(recv_log(dispatcher(), port(), "channel-99", 5));
        assert_eq!(t.observe(Network::Base, &recv), None);

        let ack = ev(ack_log(dispatcher(), port(), "channel-99", 5));
        assert_eq!(t.observe(Network::Optimism, &ack), None);
    }

    #[test]
    fn test_unknown_dest_channel_accepts_any() {
        let mut t = PacketTracker::new(Network::Base, channel("channel-11").0, None, 1);
        let recv = ev(recv_log(dispatcher(), port(), "anything", 1));
        assert_eq!(
            t.observe(Network::Optimism, &recv),
            Some(PacketStage::Received)
        );
    }

    #[test]
    fn test_never_moves_backwards() {
        let mut t = tracker(5);
        let write_ack = ev(write_ack_log(dispatcher(), port(), "channel-11", 5));
        assert_eq!(
            t.observe(Network::Base, &write_ack),
            Some(PacketStage::AckWritten)
        );

        // A late RecvPacket does not rewind the stage
        let recv = ev(recv_log(dispatcher(), port(), "channel-11", 5));
        assert_eq!(t.observe(Network::Base, &recv), None);
        assert_eq!(t.stage(), PacketStage::AckWritten);
    }

    #[test]
    fn test_timeout_is_final() {
        let mut t = tracker(9);
        let timeout = ev(timeout_log(dispatcher(), port(), "channel-10", 9));
        assert_eq!(
            t.observe(Network::Optimism, &timeout),
            Some(PacketStage::TimedOut)
        );

        let ack = ev(ack_log(dispatcher(), port(), "channel-10", 9));
        assert_eq!(t.observe(Network::Optimism, &ack), None);
        assert_eq!(t.stage(), PacketStage::TimedOut);
    }

    #[test]
    fn test_send_event_does_not_advance() {
        let mut t = tracker(5);
        let send = ev(send_log(dispatcher(), port(), "channel-10", 5));
        assert_eq!(t.observe(Network::Optimism, &send), None);
    }

    /// Replays fixed poll results, then reports nothing
    struct ScriptedSource {
        network: Network,
        batches: VecDeque<Result<Vec<PacketEvent>>>,
        polls: usize,
        started_at: Option<u64>,
    }

    impl ScriptedSource {
        fn new(network: Network, batches: Vec<Result<Vec<PacketEvent>>>) -> Self {
            Self {
                network,
                batches: batches.into(),
                polls: 0,
                started_at: None,
            }
        }
    }

    #[async_trait]
    impl LogSource for ScriptedSource {
        fn network(&self) -> Network {
            self.network
        }

        async fn poll(&mut self) -> Result<Vec<PacketEvent>> {
            self.polls += 1;
            self.batches.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }

        fn start_at(&mut self, block: u64) {
            self.started_at = Some(block);
        }
    }

    fn listener(
        source: Vec<Result<Vec<PacketEvent>>>,
        dest: Vec<Result<Vec<PacketEvent>>>,
        max_wait: Duration,
    ) -> PacketListener<ScriptedSource> {
        PacketListener::new(
            ScriptedSource::new(Network::Optimism, source),
            ScriptedSource::new(Network::Base, dest),
            Duration::from_secs(2),
            max_wait,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let mut l = listener(vec![], vec![], Duration::from_secs(3600));
        let (tx, rx) = mpsc::channel(1);
        tx.send(()).await.unwrap();

        let mut t = tracker(5);
        assert_eq!(l.run(&mut t, rx).await, ListenOutcome::Interrupted);
        assert_eq!(t.stage(), PacketStage::Sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_at_deadline() {
        let mut l = listener(vec![], vec![], Duration::ZERO);
        let (_tx, rx) = mpsc::channel(1);

        let mut t = tracker(5);
        assert_eq!(l.run(&mut t, rx).await, ListenOutcome::DeadlineElapsed);
        assert_eq!(l.source.polls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_deadline_while_in_flight() {
        let recv = ev(recv_log(dispatcher(), port(), "channel-11", 5));
        let mut l = listener(vec![], vec![Ok(vec![recv])], Duration::from_secs(30));
        let (_tx, rx) = mpsc::channel(1);

        let mut t = tracker(5);
        assert_eq!(l.run(&mut t, rx).await, ListenOutcome::DeadlineElapsed);
        assert_eq!(t.stage(), PacketStage::Received);
        assert!(l.dest.polls > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_follows_packet_to_acknowledgement() {
        let recv = ev(recv_log(dispatcher(), port(), "channel-11", 5));
        let write_ack = ev(write_ack_log(dispatcher(), port(), "channel-11", 5));
        let ack = ev(ack_log(dispatcher(), port(), "channel-10", 5));

        let mut l = listener(
            vec![Ok(vec![]), Ok(vec![ack])],
            vec![Ok(vec![recv]), Ok(vec![write_ack])],
            Duration::from_secs(3600),
        );
        let (_tx, rx) = mpsc::channel(1);

        let mut t = tracker(5);
        assert_eq!(l.run(&mut t, rx).await, ListenOutcome::Acknowledged);
        assert_eq!(t.stage(), PacketStage::Acknowledged);
        assert_eq!(l.source.polls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reports_timeout() {
        let timeout = ev(timeout_log(dispatcher(), port(), "channel-10", 5));
        let mut l = listener(vec![Ok(vec![timeout])], vec![], Duration::from_secs(3600));
        let (_tx, rx) = mpsc::channel(1);

        let mut t = tracker(5);
        assert_eq!(l.run(&mut t, rx).await, ListenOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dest_poll_error_does_not_hide_source_events() {
        let ack = ev(ack_log(dispatcher(), port(), "channel-10", 5));
        let mut l = listener(
            vec![Ok(vec![ack])],
            vec![Err(eyre!("base RPC unavailable"))],
            Duration::from_secs(3600),
        );
        let (_tx, rx) = mpsc::channel(1);

        let mut t = tracker(5);
        assert_eq!(l.run(&mut t, rx).await, ListenOutcome::Acknowledged);
        assert_eq!(l.dest.polls, 1);
        assert_eq!(l.source.polls, 1);
    }

    #[test]
    fn test_start_source_at_moves_source_only() {
        let mut l = listener(vec![], vec![], Duration::from_secs(1));
        l.start_source_at(1234);
        assert_eq!(l.source.started_at, Some(1234));
        assert_eq!(l.dest.started_at, None);
    }

    fn endpoint(rpc_url: &str) -> ListenEndpoint<'_> {
        ListenEndpoint {
            network: Network::Base,
            rpc_url,
            dispatcher: dispatcher(),
        }
    }

    #[test]
    fn test_chain_cursor_start_at() {
        let mut cursor = ChainCursor::open(&endpoint("http://127.0.0.1:1")).unwrap();
        assert_eq!(cursor.next_block, 0);
        cursor.start_at(77);
        assert_eq!(cursor.next_block, 77);
        assert_eq!(LogSource::network(&cursor), Network::Base);
    }

    #[test]
    fn test_chain_cursor_rejects_bad_url() {
        let err = ChainCursor::open(&endpoint("not a url")).err().unwrap();
        assert!(format!("{:#}", err).contains("Invalid base RPC URL"));
    }
}
