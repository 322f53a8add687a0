//! An asynchronous CoAP messaging engine: message model and codec,
//! UDP transport, confirmable-message retransmission, blockwise
//! transfer and resource observation, behind a client/server channel.
//!
//! This crate provides the messaging layer only. Request routing,
//! resource handlers and URL parsing live in the application.
//!
//! # Server example
//!
//! ```no_run
//! use coap_channel::{ChannelConfig, CoAPChannel};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (channel, mut events) =
//!         CoAPChannel::server("0.0.0.0:5683", ChannelConfig::default())
//!             .await
//!             .unwrap();
//!     channel.add_observable_resource("sensors/temp/observe").await;
//!
//!     while let Some(request) = events.requests.recv().await {
//!         println!("{} {}", request.source.unwrap(), request.path());
//!         if let Some(mut response) = request.response.clone() {
//!             response.message.payload = b"hello".to_vec();
//!             channel
//!                 .send_to(response.message, request.source.unwrap())
//!                 .await
//!                 .unwrap();
//!         }
//!     }
//! }
//! ```
//!
//! # Client example
//!
//! ```no_run
//! use coap_channel::message::request::{CoAPRequest, Method};
//! use coap_channel::message::header::MessageType;
//! use coap_channel::{ChannelConfig, CoAPChannel};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (channel, mut events) =
//!         CoAPChannel::client("127.0.0.1:5683", ChannelConfig::default())
//!             .await
//!             .unwrap();
//!
//!     let mut request = CoAPRequest::new();
//!     request.set_method(Method::Get);
//!     request.set_path("sensors/temp");
//!     request.message.header.message_type = MessageType::Confirmable;
//!     request.message.header.message_id = channel.next_message_id().await;
//!     request.message.set_token(vec![0x01, 0x02]);
//!     channel.send(request.message).await.unwrap();
//!
//!     let response = events.responses.recv().await.unwrap();
//!     println!("{:?}", response.message.payload);
//! }
//! ```

pub mod block;
pub mod channel;
pub mod error;
pub mod message;
pub mod observer;
pub mod reliability;
pub mod transport;

pub use crate::channel::{ChannelConfig, ChannelEvents, CoAPChannel};
pub use crate::error::ChannelError;
pub use crate::message::packet::Packet;
pub use crate::message::request::CoAPRequest;
pub use crate::message::response::CoAPResponse;
