//! Typed CoAP message model and the RFC 7252 binary codec.

pub mod header;
pub mod option;
pub mod packet;
pub mod request;
pub mod response;

pub use header::{Header, MessageClass, MessageType, RequestType, ResponseType};
pub use option::{BlockValue, CoAPOption, ObserveOption, APPLICATION_JSON};
pub use packet::Packet;
pub use request::{CoAPRequest, Method};
pub use response::{CoAPResponse, Status};
