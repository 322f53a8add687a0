use std::net::SocketAddr;

use crate::message::header::{MessageClass, MessageType};
use crate::message::packet::Packet;

pub use crate::message::header::ResponseType as Status;

/// A response as dispatched on a channel's response stream. ACK, RST
/// and notification messages all arrive through this view.
#[derive(Debug, Clone)]
pub struct CoAPResponse {
    pub message: Packet,
    pub source: Option<SocketAddr>,
}

impl CoAPResponse {
    /// Builds the piggyback response skeleton for a request: ACK for
    /// CON, NON for NON, message ID and token carried over. Returns
    /// `None` for message types that cannot be responded to.
    pub fn new(request: &Packet) -> Option<CoAPResponse> {
        let response_type = match request.header.message_type {
            MessageType::Confirmable => MessageType::Acknowledgement,
            MessageType::NonConfirmable => MessageType::NonConfirmable,
            _ => return None,
        };

        let mut packet = Packet::new();
        packet.header.message_type = response_type;
        packet.header.code = MessageClass::Response(Status::Content);
        packet.header.message_id = request.header.message_id;
        packet.set_token(request.token().to_vec());

        Some(CoAPResponse {
            message: packet,
            source: None,
        })
    }

    pub fn from_packet(packet: Packet, source: SocketAddr) -> CoAPResponse {
        CoAPResponse {
            message: packet,
            source: Some(source),
        }
    }

    pub fn set_status(&mut self, status: Status) {
        self.message.header.code = MessageClass::Response(status);
    }

    pub fn status(&self) -> Option<Status> {
        match self.message.header.code {
            MessageClass::Response(status) => Some(status),
            _ => None,
        }
    }

    pub fn is_empty_ack(&self) -> bool {
        self.message.header.message_type == MessageType::Acknowledgement
            && self.message.header.code == MessageClass::Empty
    }

    pub fn is_reset(&self) -> bool {
        self.message.header.message_type == MessageType::Reset
    }
}
