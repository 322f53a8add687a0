use std::net::SocketAddr;
use std::str;

use crate::message::header::{MessageClass, MessageType};
use crate::message::option::CoAPOption;
use crate::message::packet::Packet;
use crate::message::response::CoAPResponse;

pub use crate::message::header::RequestType as Method;

/// A request as seen by a request handler: the decoded message, the
/// peer it came from, and a pre-built piggyback response skeleton.
#[derive(Debug, Clone)]
pub struct CoAPRequest {
    pub message: Packet,
    pub response: Option<CoAPResponse>,
    pub source: Option<SocketAddr>,
}

impl CoAPRequest {
    pub fn new() -> CoAPRequest {
        CoAPRequest {
            response: None,
            message: Packet::new(),
            source: None,
        }
    }

    pub fn from_packet(packet: Packet, source: SocketAddr) -> CoAPRequest {
        CoAPRequest {
            response: CoAPResponse::new(&packet),
            message: packet,
            source: Some(source),
        }
    }

    pub fn set_method(&mut self, method: Method) {
        self.message.header.code = MessageClass::Request(method);
    }

    pub fn method(&self) -> Option<Method> {
        match self.message.header.code {
            MessageClass::Request(method) => Some(method),
            _ => None,
        }
    }

    /// Replaces the URI-Path options with the segments of `path`.
    /// Full URL parsing stays outside the engine; this only splits on
    /// `/`.
    pub fn set_path(&mut self, path: &str) {
        self.message.clear_option(CoAPOption::UriPath);
        for segment in path.split('/') {
            if segment.is_empty() {
                continue;
            }
            self.message
                .add_option(CoAPOption::UriPath, segment.as_bytes().to_vec());
        }
    }

    /// Joins the URI-Path options back into a `/`-separated path.
    pub fn path(&self) -> String {
        match self.message.get_option(CoAPOption::UriPath) {
            Some(options) => {
                let segments: Vec<&str> = options
                    .iter()
                    .filter_map(|seg| str::from_utf8(seg).ok())
                    .collect();
                segments.join("/")
            }
            None => String::new(),
        }
    }

    /// Whether this request carries the Observe option.
    pub fn is_observe(&self) -> bool {
        self.message.observe_value().is_some()
    }

    pub fn is_confirmable(&self) -> bool {
        self.message.header.message_type == MessageType::Confirmable
    }
}

impl Default for CoAPRequest {
    fn default() -> CoAPRequest {
        CoAPRequest::new()
    }
}
