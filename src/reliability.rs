use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::{debug, warn};
use rand::Rng;

use crate::error::EncodeError;
use crate::message::header::MessageType;
use crate::message::packet::Packet;

/// Exponential backoff stops doubling here, the jitter-free ceiling for
/// the default RFC 7252 transmission parameters.
const MAX_RETRANSMIT_TIMEOUT: Duration = Duration::from_secs(32);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MessageKey {
    message_id: u16,
    peer: SocketAddr,
}

impl MessageKey {
    fn new(packet: &Packet, peer: SocketAddr) -> MessageKey {
        MessageKey {
            message_id: packet.header.message_id,
            peer,
        }
    }
}

/// One outstanding confirmable send: the bytes to repeat verbatim and
/// the schedule that governs them.
#[derive(Debug)]
struct PendingTransmission {
    packet: Packet,
    bytes: Vec<u8>,
    peer: SocketAddr,
    remaining_retries: usize,
    current_timeout: Duration,
    next_deadline: Instant,
}

#[derive(Debug, Clone, Copy)]
pub struct TransmissionParameters {
    pub base_timeout: Duration,
    pub max_retries: usize,
    pub exchange_lifetime: Duration,
}

impl Default for TransmissionParameters {
    /// Defaults per RFC 7252 section 4.8: 2 s ack timeout, 4 retries,
    /// 247 s exchange lifetime.
    fn default() -> TransmissionParameters {
        TransmissionParameters {
            base_timeout: Duration::from_millis(2000),
            max_retries: 4,
            exchange_lifetime: Duration::from_secs(247),
        }
    }
}

/// What the timer loop must do after a tick.
#[derive(Debug)]
pub enum TickAction {
    /// Resend the original bytes unchanged.
    Retransmit { bytes: Vec<u8>, peer: SocketAddr },
    /// Retries exhausted: surface `Undelivered` with the original message.
    Expired { packet: Packet, peer: SocketAddr },
}

/// Routing verdict for an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Hand the message to the application layer.
    Deliver,
    /// Already seen within the exchange lifetime; drop silently.
    Duplicate,
}

/// Tracks outstanding confirmable sends and deduplicates arrivals, so
/// CON delivery is attempted at least once on the wire and duplicate
/// arrivals reach the application at most once.
pub struct ReliabilityEngine {
    pending: HashMap<MessageKey, PendingTransmission>,
    dedup: HashMap<MessageKey, Instant>,
    next_message_id: u16,
    parameters: TransmissionParameters,
}

impl ReliabilityEngine {
    pub fn new(parameters: TransmissionParameters) -> ReliabilityEngine {
        ReliabilityEngine {
            pending: HashMap::new(),
            dedup: HashMap::new(),
            next_message_id: rand::thread_rng().gen(),
            parameters,
        }
    }

    /// Allocates the next message ID, skipping any ID still held by a
    /// pending transmission so a late ACK can never match two sends.
    pub fn next_message_id(&mut self) -> u16 {
        loop {
            let id = self.next_message_id;
            self.next_message_id = self.next_message_id.wrapping_add(1);
            if !self.pending.keys().any(|key| key.message_id == id) {
                return id;
            }
        }
    }

    /// Registers a confirmable send and returns the encoded bytes for
    /// immediate transmission.
    pub fn send_reliable(
        &mut self,
        packet: &Packet,
        peer: SocketAddr,
        now: Instant,
    ) -> Result<Vec<u8>, EncodeError> {
        let bytes = packet.to_bytes()?;
        let key = MessageKey::new(packet, peer);
        if self.pending.contains_key(&key) {
            warn!(
                "message id {} to {} reused while still in flight",
                key.message_id, peer
            );
        }
        self.pending.insert(
            key,
            PendingTransmission {
                packet: packet.clone(),
                bytes: bytes.clone(),
                peer,
                remaining_retries: self.parameters.max_retries,
                current_timeout: self.parameters.base_timeout,
                next_deadline: now + self.parameters.base_timeout,
            },
        );
        Ok(bytes)
    }

    /// Advances the retransmission schedule and evicts expired dedup
    /// entries. Driven by the channel's timer loop.
    pub fn tick(&mut self, now: Instant) -> Vec<TickAction> {
        let mut actions = Vec::new();

        let due: Vec<MessageKey> = self
            .pending
            .iter()
            .filter(|(_, p)| p.next_deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in due {
            let pending = self.pending.get_mut(&key).expect("key collected above");
            if pending.remaining_retries > 0 {
                pending.remaining_retries -= 1;
                pending.current_timeout =
                    (pending.current_timeout * 2).min(MAX_RETRANSMIT_TIMEOUT);
                pending.next_deadline = now + pending.current_timeout;
                debug!(
                    "retransmitting message {} to {}, {} retries left",
                    key.message_id, pending.peer, pending.remaining_retries
                );
                actions.push(TickAction::Retransmit {
                    bytes: pending.bytes.clone(),
                    peer: pending.peer,
                });
            } else {
                let pending = self.pending.remove(&key).expect("key collected above");
                warn!(
                    "message {} to {} undelivered, retries exhausted",
                    key.message_id, pending.peer
                );
                actions.push(TickAction::Expired {
                    packet: pending.packet,
                    peer: pending.peer,
                });
            }
        }

        let lifetime = self.parameters.exchange_lifetime;
        self.dedup.retain(|_, seen| now.duration_since(*seen) < lifetime);

        actions
    }

    /// Routes an incoming message: ACK/RST resolve a matching pending
    /// transmission before dispatch, CON/NON pass through the dedup
    /// window.
    pub fn on_incoming(&mut self, packet: &Packet, peer: SocketAddr, now: Instant) -> Disposition {
        let key = MessageKey::new(packet, peer);
        match packet.header.message_type {
            MessageType::Acknowledgement | MessageType::Reset => {
                if self.pending.remove(&key).is_some() {
                    debug!("message {} to {} resolved", key.message_id, peer);
                }
                Disposition::Deliver
            }
            MessageType::Confirmable | MessageType::NonConfirmable => {
                if let Some(seen) = self.dedup.get(&key) {
                    if now.duration_since(*seen) < self.parameters.exchange_lifetime {
                        return Disposition::Duplicate;
                    }
                }
                self.dedup.insert(key, now);
                Disposition::Deliver
            }
        }
    }

    /// Cancels one in-flight transmission, e.g. on application-driven
    /// shutdown. Returns the original message if it was still pending.
    pub fn cancel(&mut self, message_id: u16, peer: SocketAddr) -> Option<Packet> {
        self.pending
            .remove(&MessageKey { message_id, peer })
            .map(|p| p.packet)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.dedup.clear();
    }

    #[cfg(test)]
    fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
