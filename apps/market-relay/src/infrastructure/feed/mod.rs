//! Upstream Feed Adapters
//!
//! Everything between the upstream socket and the [`EventSink`]:
//!
//! - [`codec`]: `MessagePack` frame envelope and per-channel payload decoding
//! - [`reconnect`]: fixed-delay retry policy with an attempt budget
//! - [`client`]: connection state machine and in-order event dispatch
//! - [`transport`]: WebSocket implementation of the transport port
//!
//! [`EventSink`]: crate::application::ports::EventSink

pub mod client;
pub mod codec;
pub mod reconnect;
pub mod transport;

pub use client::{ConnectError, ConnectionState, FeedClient, FeedState, FeedStatus};
pub use codec::{DecodeError, FrameCodec, InboundFrame};
pub use transport::WsTransport;
