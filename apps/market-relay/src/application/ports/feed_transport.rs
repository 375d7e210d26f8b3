//! Feed Transport Port (Driven Port)
//!
//! Byte-level connection to the upstream feed. Framing and decoding happen in
//! the feed client; the transport only moves whole binary frames.

use async_trait::async_trait;

/// Transport failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Could not establish the connection.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The connection broke while sending or receiving.
    #[error("connection lost: {0}")]
    Io(String),

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,
}

/// Opens connections to the upstream feed.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// Open a fresh connection.
    async fn connect(&self) -> Result<Box<dyn FeedConnection>, TransportError>;
}

/// One open upstream connection.
#[async_trait]
pub trait FeedConnection: Send {
    /// Send one binary frame.
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Next binary frame. `None` once the connection has ended cleanly.
    async fn next_frame(&mut self) -> Option<Result<Vec<u8>, TransportError>>;

    /// Close the connection. Errors are ignored.
    async fn close(&mut self);
}
