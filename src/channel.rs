use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use log::{debug, error, trace, warn};
use tokio::net::lookup_host;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_stream::wrappers::IntervalStream;

use crate::block::BlockwiseManager;
use crate::error::{ChannelError, ConfigError};
use crate::message::header::{MessageClass, MessageType};
use crate::message::option::{BlockValue, CoAPOption};
use crate::message::packet::Packet;
use crate::message::request::CoAPRequest;
use crate::message::response::{CoAPResponse, Status};
use crate::observer::{ObserveRegistry, ObserverEntry};
use crate::reliability::{Disposition, ReliabilityEngine, TickAction, TransmissionParameters};
use crate::transport::{UdpTransport, COAP_MTU};

/// Tunables for one channel. The defaults follow RFC 7252/7641
/// conventions.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Initial CON retransmission timeout.
    pub base_timeout: Duration,
    /// Retransmissions before a CON send is declared undelivered.
    pub max_retries: usize,
    /// Preferred outbound block size, a power of two in 16..=1024.
    pub block_size: usize,
    /// Sliding window for message-ID deduplication, also the idle bound
    /// for inbound block assemblies.
    pub exchange_lifetime: Duration,
    /// Staleness bound for the observe freshness check.
    pub observe_max_age: Duration,
    /// Retransmission timer resolution, at most 250ms.
    pub tick_interval: Duration,
}

impl Default for ChannelConfig {
    fn default() -> ChannelConfig {
        ChannelConfig {
            base_timeout: Duration::from_millis(2000),
            max_retries: 4,
            block_size: 1024,
            exchange_lifetime: Duration::from_secs(247),
            observe_max_age: Duration::from_secs(128),
            tick_interval: Duration::from_millis(250),
        }
    }
}

impl ChannelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(16..=1024).contains(&self.block_size) || !self.block_size.is_power_of_two() {
            return Err(ConfigError::InvalidBlockSize(self.block_size));
        }
        if self.base_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.tick_interval.is_zero() || self.tick_interval > Duration::from_millis(250) {
            return Err(ConfigError::InvalidTickInterval);
        }
        Ok(())
    }
}

/// The three application-facing notification streams of a channel.
/// Consumers should drain these promptly; the receive loop never blocks
/// on them, but unread events accumulate.
pub struct ChannelEvents {
    pub requests: UnboundedReceiver<CoAPRequest>,
    pub responses: UnboundedReceiver<CoAPResponse>,
    pub errors: UnboundedReceiver<ChannelError>,
}

/// State shared between the receive loop, the timer loop and the
/// application-facing methods. One lock guards all of it so a
/// timer-driven retransmission can never race a receive-driven
/// resolution of the same transaction.
struct ChannelState {
    reliability: ReliabilityEngine,
    blocks: BlockwiseManager,
    observers: ObserveRegistry,
}

/// Client/server façade over transport, codec, reliability, blockwise
/// transfer and the observe registry. A client binds a fixed remote
/// peer at initialization; a server accepts requests from any peer.
/// Multiple channels can coexist in one process.
pub struct CoAPChannel {
    transport: Arc<UdpTransport>,
    state: Arc<Mutex<ChannelState>>,
    config: ChannelConfig,
    default_peer: Option<SocketAddr>,
    receive_task: JoinHandle<()>,
    timer_task: JoinHandle<()>,
}

impl CoAPChannel {
    /// Opens a server channel listening on `bind_addr`.
    pub async fn server<A: tokio::net::ToSocketAddrs>(
        bind_addr: A,
        config: ChannelConfig,
    ) -> Result<(CoAPChannel, ChannelEvents), ChannelError> {
        config.validate()?;
        let transport = UdpTransport::bind(bind_addr).await?;
        Ok(Self::start(transport, None, config))
    }

    /// Opens a client channel with a fixed remote peer.
    pub async fn client<A: tokio::net::ToSocketAddrs>(
        peer_addr: A,
        config: ChannelConfig,
    ) -> Result<(CoAPChannel, ChannelEvents), ChannelError> {
        config.validate()?;
        let peer = lookup_host(peer_addr)
            .await?
            .next()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no peer address"))?;
        let bind_addr: SocketAddr = match peer {
            SocketAddr::V4(_) => "0.0.0.0:0".parse().unwrap(),
            SocketAddr::V6(_) => "[::]:0".parse().unwrap(),
        };
        let transport = UdpTransport::bind(bind_addr).await?;
        Ok(Self::start(transport, Some(peer), config))
    }

    fn start(
        transport: UdpTransport,
        default_peer: Option<SocketAddr>,
        config: ChannelConfig,
    ) -> (CoAPChannel, ChannelEvents) {
        let transport = Arc::new(transport);
        let state = Arc::new(Mutex::new(ChannelState {
            reliability: ReliabilityEngine::new(TransmissionParameters {
                base_timeout: config.base_timeout,
                max_retries: config.max_retries,
                exchange_lifetime: config.exchange_lifetime,
            }),
            blocks: BlockwiseManager::new(config.exchange_lifetime),
            observers: ObserveRegistry::new(),
        }));

        let (request_tx, requests) = mpsc::unbounded_channel();
        let (response_tx, responses) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();

        let receive_task = tokio::spawn(receive_loop(
            Arc::clone(&transport),
            Arc::clone(&state),
            request_tx,
            response_tx,
            error_tx.clone(),
        ));
        let timer_task = tokio::spawn(timer_loop(
            Arc::clone(&transport),
            Arc::clone(&state),
            error_tx,
            config.tick_interval,
        ));

        (
            CoAPChannel {
                transport,
                state,
                config,
                default_peer,
                receive_task,
                timer_task,
            },
            ChannelEvents {
                requests,
                responses,
                errors,
            },
        )
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// The fixed remote peer, if this is a client channel.
    pub fn default_peer(&self) -> Option<SocketAddr> {
        self.default_peer
    }

    /// Allocates a message ID, skipping IDs still in flight.
    pub async fn next_message_id(&self) -> u16 {
        self.state.lock().await.reliability.next_message_id()
    }

    /// Sends to the fixed peer of a client channel.
    pub async fn send(&self, packet: Packet) -> Result<(), ChannelError> {
        let peer = self.default_peer.ok_or(ChannelError::NoDefaultPeer)?;
        self.send_to(packet, peer).await
    }

    /// Sends a message. CON goes through the reliability engine and
    /// will be retransmitted until acknowledged or exhausted; NON, ACK
    /// and RST go straight to the transport.
    pub async fn send_to(&self, packet: Packet, peer: SocketAddr) -> Result<(), ChannelError> {
        let bytes = match packet.header.message_type {
            MessageType::Confirmable => {
                let mut state = self.state.lock().await;
                state
                    .reliability
                    .send_reliable(&packet, peer, Instant::now())?
            }
            _ => packet.to_bytes()?,
        };
        self.transport.send(&bytes, peer).await
    }

    /// Cancels one in-flight CON transmission before its next deadline.
    pub async fn cancel_pending(&self, message_id: u16, peer: SocketAddr) -> Option<Packet> {
        self.state.lock().await.reliability.cancel(message_id, peer)
    }

    /// Registers a path as observable. Idempotent.
    pub async fn add_observable_resource(&self, path: &str) {
        self.state
            .lock()
            .await
            .observers
            .add_observable_resource(path);
    }

    pub async fn is_resource_being_observed(&self, path: &str) -> bool {
        self.state
            .lock()
            .await
            .observers
            .is_resource_being_observed(path)
    }

    /// Records the sender of a valid observe-GET as an observer.
    pub async fn add_resource_observer(&self, request: &CoAPRequest) -> bool {
        self.state
            .lock()
            .await
            .observers
            .add_resource_observer(request)
    }

    pub async fn get_resource_observers(&self, path: &str) -> Vec<ObserverEntry> {
        self.state
            .lock()
            .await
            .observers
            .get_resource_observers(path)
    }

    /// Fans a state change out to every observer of `path` as CON
    /// 2.05 notifications carrying the resource's next sequence number.
    /// Returns the number of notifications sent.
    pub async fn notify_observers(
        &self,
        path: &str,
        payload: Vec<u8>,
        content_format: Option<u16>,
    ) -> Result<usize, ChannelError> {
        let mut sends: Vec<(Vec<u8>, SocketAddr)> = Vec::new();
        {
            let mut state = self.state.lock().await;
            let sequence = match state.observers.next_sequence(path) {
                Some(sequence) => sequence,
                None => return Ok(0),
            };
            let observers = state.observers.get_resource_observers(path);

            for observer in observers {
                let mut packet = Packet::new();
                packet.header.message_type = MessageType::Confirmable;
                packet.header.code = MessageClass::Response(Status::Content);
                packet.header.message_id = state.reliability.next_message_id();
                packet.set_token(observer.token.clone());
                packet.set_observe_value(sequence);
                if let Some(format) = content_format {
                    packet.set_content_format(format);
                }
                packet.payload = payload.clone();

                let bytes =
                    state
                        .reliability
                        .send_reliable(&packet, observer.peer, Instant::now())?;
                sends.push((bytes, observer.peer));
            }
        }

        let count = sends.len();
        for (bytes, peer) in sends {
            self.transport.send(&bytes, peer).await?;
        }
        debug!("notified {} observers of {}", count, path);
        Ok(count)
    }

    /// Stops both loops and drops all pending, dedup, assembly and
    /// observer state. The channel cannot be reused afterwards.
    pub async fn shutdown(&self) {
        self.receive_task.abort();
        self.timer_task.abort();
        let mut state = self.state.lock().await;
        state.reliability.clear();
        state.blocks.clear();
        state.observers.clear();
    }
}

impl Drop for CoAPChannel {
    fn drop(&mut self) {
        self.receive_task.abort();
        self.timer_task.abort();
    }
}

/// The Block1/Block2 value of a transaction-originating message, if it
/// carries one. Malformed block values are treated like any other
/// malformed datagram: dropped.
fn inbound_block(packet: &Packet) -> Option<Result<(CoAPOption, BlockValue), ()>> {
    if !packet.header.message_type.originates_transaction() {
        return None;
    }
    for option in [CoAPOption::Block1, CoAPOption::Block2] {
        match packet.block_value(option) {
            Some(Ok(block)) => return Some(Ok((option, block))),
            Some(Err(err)) => {
                debug!("dropping message with malformed block option: {}", err);
                return Some(Err(()));
            }
            None => {}
        }
    }
    None
}

/// Builds the per-block acknowledgment: same message ID and token, the
/// received sequence number, `more=false` as the "send the next block"
/// signal.
fn block_ack(packet: &Packet, option: CoAPOption, block: &BlockValue) -> Packet {
    let mut ack = Packet::new();
    ack.header.message_type = MessageType::Acknowledgement;
    ack.header.code = MessageClass::Response(Status::Content);
    ack.header.message_id = packet.header.message_id;
    ack.set_token(packet.token().to_vec());
    ack.set_block_value(
        option,
        BlockValue {
            num: block.num,
            more: false,
            size_exponent: block.size_exponent,
        },
    );
    ack
}

fn dispatch(
    packet: Packet,
    peer: SocketAddr,
    request_tx: &UnboundedSender<CoAPRequest>,
    response_tx: &UnboundedSender<CoAPResponse>,
) {
    match packet.header.code {
        MessageClass::Request(_) => {
            let _ = request_tx.send(CoAPRequest::from_packet(packet, peer));
        }
        _ => {
            let _ = response_tx.send(CoAPResponse::from_packet(packet, peer));
        }
    }
}

async fn receive_loop(
    transport: Arc<UdpTransport>,
    state: Arc<Mutex<ChannelState>>,
    request_tx: UnboundedSender<CoAPRequest>,
    response_tx: UnboundedSender<CoAPResponse>,
    error_tx: UnboundedSender<ChannelError>,
) {
    let mut buf = vec![0u8; COAP_MTU];
    loop {
        let (n, peer) = match transport.recv(&mut buf).await {
            Ok(received) => received,
            Err(err) => {
                error!("receive loop terminated: {}", err);
                let _ = error_tx.send(err);
                return;
            }
        };

        // Decode errors are absorbed: drop the datagram, keep receiving.
        let packet = match Packet::from_bytes(&buf[..n]) {
            Ok(packet) => packet,
            Err(err) => {
                debug!("dropping malformed datagram from {}: {}", peer, err);
                continue;
            }
        };
        trace!(
            "received {:?} {} id {} from {}",
            packet.header.message_type,
            packet.header.code,
            packet.header.message_id,
            peer
        );

        // Everything below mutates shared state; the ack bytes are sent
        // after the lock is released.
        let mut ack_to_send: Option<Vec<u8>> = None;
        let mut to_dispatch: Option<Packet> = None;
        {
            let mut state = state.lock().await;

            match state
                .reliability
                .on_incoming(&packet, peer, Instant::now())
            {
                Disposition::Duplicate => {
                    debug!("duplicate message {} from {}", packet.header.message_id, peer);
                    continue;
                }
                Disposition::Deliver => {}
            }

            if packet.header.message_type == MessageType::Reset {
                state.observers.remove_resource_observer(&packet, peer);
            }

            match inbound_block(&packet) {
                Some(Err(())) => continue,
                Some(Ok((option, block))) => {
                    let ack = block_ack(&packet, option, &block);
                    match ack.to_bytes() {
                        Ok(bytes) => ack_to_send = Some(bytes),
                        Err(err) => warn!("block ack encode failed: {}", err),
                    }
                    let stored = state.blocks.store(
                        peer,
                        packet.token(),
                        &block,
                        packet.payload.clone(),
                        Instant::now(),
                    );
                    match stored {
                        // Intermediate block: ack it, nothing to dispatch.
                        Ok(None) => {}
                        // Final block: deliver the reassembled message
                        // as one logical payload.
                        Ok(Some(payload)) => {
                            let mut assembled = packet.clone();
                            assembled.payload = payload;
                            assembled.clear_option(option);
                            to_dispatch = Some(assembled);
                        }
                        Err(err) => {
                            let _ = error_tx.send(err);
                        }
                    }
                }
                None => to_dispatch = Some(packet),
            }
        }

        if let Some(bytes) = ack_to_send {
            if let Err(err) = transport.send(&bytes, peer).await {
                warn!("failed to send block ack to {}: {}", peer, err);
            }
        }
        if let Some(packet) = to_dispatch {
            dispatch(packet, peer, &request_tx, &response_tx);
        }
    }
}

async fn timer_loop(
    transport: Arc<UdpTransport>,
    state: Arc<Mutex<ChannelState>>,
    error_tx: UnboundedSender<ChannelError>,
    tick_interval: Duration,
) {
    let mut ticks = IntervalStream::new(interval(tick_interval));
    while ticks.next().await.is_some() {
        let now = Instant::now();
        let actions = {
            let mut state = state.lock().await;
            state.blocks.evict_idle(now);
            state.reliability.tick(now)
        };

        for action in actions {
            match action {
                TickAction::Retransmit { bytes, peer } => {
                    if let Err(err) = transport.send(&bytes, peer).await {
                        warn!("retransmission to {} failed: {}", peer, err);
                    }
                }
                TickAction::Expired { packet, peer } => {
                    let _ = error_tx.send(ChannelError::Undelivered { packet, peer });
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block::split_payload;
    use crate::message::header::RequestType;
    use crate::message::option::{ObserveOption, APPLICATION_JSON};
    use crate::observer::FreshnessTracker;
    use tokio::time::timeout;

    const RECV_WINDOW: Duration = Duration::from_secs(10);

    async fn server_pair() -> (CoAPChannel, ChannelEvents, SocketAddr) {
        let (server, events) = CoAPChannel::server("127.0.0.1:0", ChannelConfig::default())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        (server, events, addr)
    }

    fn con_get(path: &str, message_id: u16, token: Vec<u8>) -> Packet {
        let mut request = CoAPRequest::new();
        request.set_method(RequestType::Get);
        request.set_path(path);
        request.message.header.message_type = MessageType::Confirmable;
        request.message.header.message_id = message_id;
        request.message.set_token(token);
        request.message
    }

    #[tokio::test]
    async fn test_request_response_roundtrip() {
        let (server, mut server_events, server_addr) = server_pair().await;
        let (client, mut client_events) =
            CoAPChannel::client(server_addr, ChannelConfig::default())
                .await
                .unwrap();

        let message_id = client.next_message_id().await;
        client
            .send(con_get("hello", message_id, vec![1, 2, 3, 4]))
            .await
            .unwrap();

        let request = timeout(RECV_WINDOW, server_events.requests.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.path(), "hello");
        assert_eq!(request.message.token(), &[1, 2, 3, 4]);

        let mut response = request.response.clone().unwrap();
        response.message.payload = b"world".to_vec();
        server
            .send_to(response.message, request.source.unwrap())
            .await
            .unwrap();

        let response = timeout(RECV_WINDOW, client_events.responses.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.message.payload, b"world".to_vec());
        assert_eq!(response.status(), Some(Status::Content));

        server.shutdown().await;
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_undelivered_surfaces_once() {
        // No server on the other side: the CON must expire exactly once.
        let config = ChannelConfig {
            base_timeout: Duration::from_millis(40),
            max_retries: 2,
            tick_interval: Duration::from_millis(10),
            ..ChannelConfig::default()
        };
        let (client, mut events) = CoAPChannel::client("127.0.0.1:9", config).await.unwrap();

        let message_id = client.next_message_id().await;
        client
            .send(con_get("void", message_id, vec![9]))
            .await
            .unwrap();

        let err = timeout(RECV_WINDOW, events.errors.recv())
            .await
            .unwrap()
            .unwrap();
        match err {
            ChannelError::Undelivered { packet, .. } => {
                assert_eq!(packet.header.message_id, message_id)
            }
            other => panic!("expected Undelivered, got {:?}", other),
        }

        // And only once.
        assert!(
            timeout(Duration::from_millis(500), events.errors.recv())
                .await
                .is_err()
        );
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_observe_end_to_end() {
        let (server, mut server_events, server_addr) = server_pair().await;
        let (client, mut client_events) =
            CoAPChannel::client(server_addr, ChannelConfig::default())
                .await
                .unwrap();

        let path = "sensors/temp/observe";
        server.add_observable_resource(path).await;

        // Client registers with a 6-byte token.
        let token = b"obstok".to_vec();
        let message_id = client.next_message_id().await;
        let mut register = con_get(path, message_id, token.clone());
        register.set_observe_flag(ObserveOption::Register);
        client.send(register).await.unwrap();

        // Server side: valid observe-GET, record the observer and reply
        // ACK/EMPTY.
        let request = timeout(RECV_WINDOW, server_events.requests.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(request.is_observe());
        assert!(server.is_resource_being_observed(path).await);
        assert!(server.add_resource_observer(&request).await);
        server
            .send_to(
                Packet::ack_empty_for(&request.message),
                request.source.unwrap(),
            )
            .await
            .unwrap();

        let ack = timeout(RECV_WINDOW, client_events.responses.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(ack.is_empty_ack());

        // Resource changes: the first notification carries Observe=1.
        let sent = server
            .notify_observers(path, b"{\"temp\":25}".to_vec(), Some(APPLICATION_JSON))
            .await
            .unwrap();
        assert_eq!(sent, 1);

        let mut freshness = FreshnessTracker::new(Duration::from_secs(128));
        let notification = timeout(RECV_WINDOW, client_events.responses.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notification.message.payload, b"{\"temp\":25}".to_vec());
        assert_eq!(notification.message.token(), token.as_slice());
        let sequence = notification.message.observe_value().unwrap().unwrap();
        assert_eq!(sequence, 1);
        assert!(freshness.accept(sequence, Instant::now()));

        // Still interested: ACK the notification.
        client
            .send(Packet::ack_empty_for(&notification.message))
            .await
            .unwrap();

        let second = server.notify_observers(path, b"{\"temp\":26}".to_vec(), None)
            .await
            .unwrap();
        assert_eq!(second, 1);
        let notification = timeout(RECV_WINDOW, client_events.responses.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notification.message.observe_value().unwrap().unwrap(), 2);

        // No longer interested: RST instead of ACK deregisters.
        client
            .send(Packet::rst_for(&notification.message))
            .await
            .unwrap();

        timeout(RECV_WINDOW, async {
            while !server.get_resource_observers(path).await.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("observer should be removed after RST");

        assert_eq!(server.notify_observers(path, b"{}".to_vec(), None).await.unwrap(), 0);

        server.shutdown().await;
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_blockwise_put_end_to_end() {
        let (server, mut server_events, server_addr) = server_pair().await;
        let (client, mut client_events) =
            CoAPChannel::client(server_addr, ChannelConfig::default())
                .await
                .unwrap();

        let payload: Vec<u8> = (0..35u8).collect();
        let token = Packet::random_token();
        let blocks = split_payload(&payload, 16).unwrap();
        assert_eq!(blocks.len(), 3);

        // Send each block only after the previous one is acknowledged.
        for (block, fragment) in &blocks {
            let mut request = CoAPRequest::new();
            request.set_method(RequestType::Put);
            request.set_path("largedata/blockput");
            request.message.header.message_type = MessageType::Confirmable;
            request.message.header.message_id = client.next_message_id().await;
            request.message.set_token(token.clone());
            request.message.set_block_value(CoAPOption::Block1, *block);
            request.message.payload = fragment.to_vec();
            client.send(request.message).await.unwrap();

            let ack = timeout(RECV_WINDOW, client_events.responses.recv())
                .await
                .unwrap()
                .unwrap();
            let echoed = ack
                .message
                .block_value(CoAPOption::Block1)
                .unwrap()
                .unwrap();
            assert_eq!(echoed.num, block.num);
            assert!(!echoed.more);
        }

        // The server application sees one logical PUT with the full
        // payload; intermediate blocks never reach it.
        let request = timeout(RECV_WINDOW, server_events.requests.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.path(), "largedata/blockput");
        assert_eq!(request.message.payload, payload);
        assert!(request.message.block_value(CoAPOption::Block1).is_none());
        assert!(
            timeout(Duration::from_millis(200), server_events.requests.recv())
                .await
                .is_err()
        );

        server.shutdown().await;
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_dispatched_once() {
        let (_server, mut server_events, server_addr) = server_pair().await;

        // Raw transport, so the exact datagram can be repeated.
        let socket = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let bytes = con_get("dup", 77, vec![5]).to_bytes().unwrap();
        socket.send(&bytes, server_addr).await.unwrap();
        socket.send(&bytes, server_addr).await.unwrap();

        let first = timeout(RECV_WINDOW, server_events.requests.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.message.header.message_id, 77);
        assert!(
            timeout(Duration::from_millis(300), server_events.requests.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_malformed_datagram_absorbed() {
        let (_server, mut server_events, server_addr) = server_pair().await;

        let socket = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        // Reserved option delta nibble, then a valid request: the loop
        // must survive the first and deliver the second.
        socket
            .send(&[0x40, 0x01, 0x00, 0x01, 0xF0], server_addr)
            .await
            .unwrap();
        let bytes = con_get("ok", 3, vec![1]).to_bytes().unwrap();
        socket.send(&bytes, server_addr).await.unwrap();

        let request = timeout(RECV_WINDOW, server_events.requests.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.path(), "ok");
    }

    #[tokio::test]
    async fn test_server_send_without_peer_fails() {
        let (server, _events, _addr) = server_pair().await;
        let result = server.send(Packet::new()).await;
        assert!(matches!(result, Err(ChannelError::NoDefaultPeer)));
    }

    #[tokio::test]
    async fn test_config_rejects_bad_block_size() {
        let config = ChannelConfig {
            block_size: 100,
            ..ChannelConfig::default()
        };
        assert!(matches!(
            CoAPChannel::server("127.0.0.1:0", config).await,
            Err(ChannelError::Config(ConfigError::InvalidBlockSize(100)))
        ));
    }
}
