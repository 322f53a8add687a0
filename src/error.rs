use std::io;
use std::net::SocketAddr;
use thiserror::Error;

use crate::message::packet::Packet;

/// Reasons a datagram failed to decode into a [`Packet`].
///
/// These are absorbed by the receive loop: the datagram is dropped and
/// nothing is dispatched to the application.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedPacketError {
    #[error("datagram truncated")]
    Truncated,

    #[error("unknown protocol version {0}")]
    UnknownVersion(u8),

    #[error("token length {0} exceeds the 8 byte limit")]
    InvalidTokenLength(u8),

    #[error("reserved option delta 15")]
    InvalidOptionDelta,

    #[error("option length inconsistent with remaining buffer")]
    InvalidOptionLength,

    #[error("payload marker present but payload is empty")]
    EmptyPayload,
}

/// Reasons a [`Packet`] could not be serialized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("encoded packet length {0} exceeds the 1280 byte datagram ceiling")]
    PacketTooLarge(usize),

    #[error("token length {0} exceeds the 8 byte limit")]
    InvalidTokenLength(usize),
}

/// Recognized option values are decoded strictly: a value of the wrong
/// width is an error, never a silent truncation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidOptionValue {
    #[error("option value is {actual} bytes, at most {max} allowed")]
    ValueTooLong { max: usize, actual: usize },

    #[error("block number {0} does not fit the 20 bit field")]
    BlockNumberOutOfRange(u32),

    #[error("block size {0} is not a power of two in 16..=1024")]
    UnsupportedBlockSize(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("block size {0} is not a power of two in 16..=1024")]
    InvalidBlockSize(usize),

    #[error("base timeout must be non-zero")]
    ZeroTimeout,

    #[error("timer tick must be non-zero and at most 250ms")]
    InvalidTickInterval,
}

/// Errors surfaced to the application on a channel's error stream, plus
/// the fatal conditions returned directly from channel calls.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// A confirmable message exhausted its retransmissions without a
    /// matching ACK or RST. Carries the original message so the
    /// application can apply its own retry policy.
    #[error("message {} to {peer} undelivered after retransmissions", packet.header.message_id)]
    Undelivered { packet: Packet, peer: SocketAddr },

    /// A blockwise transfer completed with a missing sequence number.
    /// The partial assembly has been discarded.
    #[error("blockwise reassembly from {peer} has a gap (token {token:02x?})")]
    IncompleteTransfer { peer: SocketAddr, token: Vec<u8> },

    /// The socket became unusable. The channel must be reinitialized.
    #[error("transport failure: {0}")]
    TransportFatal(#[from] io::Error),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("channel has no fixed peer, use send_to")]
    NoDefaultPeer,
}
