//! Upstream Feed Client
//!
//! Owns the single logical connection to the upstream feed, decodes frames
//! into [`MarketEvent`]s and drives reconnection.
//!
//! # Connection States
//!
//! ```text
//! Disconnected ──start/retry──▶ Connecting ──ok──▶ Connected ──subscribe──▶ Subscribed
//!      ▲                            │                                          │
//!      └──────── fixed delay ◀── failure                       transport loss ─┘
//!                                   │
//!                      budget spent ▼
//!                               Exhausted ──manual reconnect──▶ Connecting
//! ```
//!
//! A successful connect resets the attempt counter. After the configured
//! number of consecutive failed attempts the client parks in `Exhausted` and
//! makes no further attempts until [`FeedClient::reconnect`] is called. The
//! snapshot keeps serving its last state in the meantime.
//!
//! # Ordering
//!
//! Frames are decoded and handed to the [`EventSink`] inline, one at a time,
//! before the next frame is read. A frame that fails to decode is counted,
//! logged and dropped; it never closes the connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::codec::{DecodeError, FrameCodec, InboundFrame};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::FeedSettings;
use crate::application::ports::{
    EventSink, FeedConnection, FeedTransport, SymbolUniverse, TransportError,
};
use crate::domain::market::Channel;
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// A failed connection attempt. Counted against the retry budget.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Connect handshake did not finish in time.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
}

// =============================================================================
// Connection State
// =============================================================================

/// Upstream connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not connected; a retry may be pending.
    Disconnected,
    /// Connect attempt in flight.
    Connecting,
    /// Transport is open; subscription not yet sent.
    Connected,
    /// Subscription sent; events are flowing.
    Subscribed,
    /// Retry budget spent; waiting for a manual reconnect.
    Exhausted,
}

impl ConnectionState {
    /// Numeric code for the state gauge.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Subscribed => 3,
            Self::Exhausted => 4,
        }
    }
}

/// Shared view of the feed client's state, read by the status surface.
#[derive(Debug)]
pub struct FeedState {
    state: RwLock<ConnectionState>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    attempts: AtomicU32,
    max_attempts: u32,
    subscribed_symbols: AtomicU64,
    events_received: AtomicU64,
    decode_errors: AtomicU64,
}

impl FeedState {
    fn new(max_attempts: u32) -> Self {
        Self {
            state: RwLock::new(ConnectionState::Disconnected),
            last_connected_at: RwLock::new(None),
            last_error: RwLock::new(None),
            attempts: AtomicU32::new(0),
            max_attempts,
            subscribed_symbols: AtomicU64::new(0),
            events_received: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        if state == ConnectionState::Connected {
            *self.last_connected_at.write() = Some(Utc::now());
            *self.last_error.write() = None;
        }
        metrics::set_feed_state(state.code());
    }

    fn set_error(&self, message: String) {
        *self.last_error.write() = Some(message);
    }

    /// Current connection state.
    #[must_use]
    pub fn get_state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Consecutive failed attempts.
    #[must_use]
    pub fn get_attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Events decoded and handed to the sink.
    #[must_use]
    pub fn get_events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    /// Frames dropped because they failed to decode.
    #[must_use]
    pub fn get_decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    /// Point-in-time copy for serialization.
    #[must_use]
    pub fn snapshot(&self) -> FeedStatus {
        FeedStatus {
            state: self.get_state(),
            attempts: self.get_attempts(),
            max_attempts: self.max_attempts,
            subscribed_symbols: self.subscribed_symbols.load(Ordering::Relaxed),
            events_received: self.get_events_received(),
            decode_errors: self.get_decode_errors(),
            last_connected_at: *self.last_connected_at.read(),
            last_error: self.last_error.read().clone(),
        }
    }
}

/// Serializable feed status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedStatus {
    /// Connection state.
    pub state: ConnectionState,
    /// Consecutive failed attempts.
    pub attempts: u32,
    /// Attempt budget (0 = unlimited).
    pub max_attempts: u32,
    /// Symbols in the last upstream subscription.
    pub subscribed_symbols: u64,
    /// Events decoded.
    pub events_received: u64,
    /// Frames dropped on decode failure.
    pub decode_errors: u64,
    /// Time of the last successful connect.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Last connect or transport error.
    pub last_error: Option<String>,
}

// =============================================================================
// Feed Client
// =============================================================================

enum SessionEnd {
    Cancelled,
    ReconnectRequested,
    Lost(TransportError),
}

enum Wake {
    Cancelled,
    Reconnect,
    Timer,
}

/// Upstream feed client.
pub struct FeedClient {
    settings: FeedSettings,
    transport: Arc<dyn FeedTransport>,
    universe: Arc<dyn SymbolUniverse>,
    sink: Arc<dyn EventSink>,
    codec: FrameCodec,
    state: Arc<FeedState>,
    reconnect_requested: Notify,
    cancel: CancellationToken,
}

impl FeedClient {
    /// Create a new feed client.
    #[must_use]
    pub fn new(
        settings: FeedSettings,
        transport: Arc<dyn FeedTransport>,
        universe: Arc<dyn SymbolUniverse>,
        sink: Arc<dyn EventSink>,
        cancel: CancellationToken,
    ) -> Self {
        let state = Arc::new(FeedState::new(settings.max_reconnect_attempts));
        Self {
            settings,
            transport,
            universe,
            sink,
            codec: FrameCodec::new(),
            state,
            reconnect_requested: Notify::new(),
            cancel,
        }
    }

    /// Shared state handle for the status surface.
    #[must_use]
    pub fn state(&self) -> Arc<FeedState> {
        Arc::clone(&self.state)
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> FeedStatus {
        self.state.snapshot()
    }

    /// Reset the attempt counter and reconnect now.
    ///
    /// Leaves `Exhausted`, skips a pending retry delay, or drops the current
    /// connection and opens a fresh one. A request made while a connect is in
    /// flight is satisfied by that connect if it succeeds.
    pub fn reconnect(&self) {
        tracing::info!(state = ?self.state.get_state(), "Manual feed reconnect requested");
        self.reconnect_requested.notify_one();
    }

    /// Run the connection loop until cancelled.
    pub async fn run(self: Arc<Self>) {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::from_feed_settings(&self.settings));

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.state.set_state(ConnectionState::Connecting);
            metrics::record_connect_attempt();
            let attempt = tokio::select! {
                () = self.cancel.cancelled() => break,
                result = self.connect() => result,
            };
            let session = match attempt {
                Ok(conn) => {
                    // Consume a request that arrived while connecting.
                    let _ = self.reconnect_requested.notified().now_or_never();
                    policy.reset();
                    self.state.attempts.store(0, Ordering::Relaxed);
                    Ok(self.run_session(conn).await)
                }
                Err(e) => {
                    policy.record_failure();
                    self.state.attempts.store(policy.attempt_count(), Ordering::Relaxed);
                    self.state.set_error(e.to_string());
                    tracing::warn!(
                        error = %e,
                        attempt = policy.attempt_count(),
                        max_attempts = policy.max_attempts(),
                        "Feed connect failed"
                    );
                    Err(e)
                }
            };

            let wake = match session {
                Ok(SessionEnd::Cancelled) => break,
                Ok(SessionEnd::ReconnectRequested) => Wake::Reconnect,
                Ok(SessionEnd::Lost(e)) => {
                    tracing::warn!(error = %e, "Feed connection lost");
                    self.state.set_error(e.to_string());
                    self.state.set_state(ConnectionState::Disconnected);
                    self.wait(Some(policy.delay())).await
                }
                Err(_) if policy.is_exhausted() => {
                    self.state.set_state(ConnectionState::Exhausted);
                    tracing::error!(
                        attempts = policy.attempt_count(),
                        "Feed reconnect budget exhausted; serving stale snapshot"
                    );
                    self.wait(None).await
                }
                Err(_) => {
                    self.state.set_state(ConnectionState::Disconnected);
                    self.wait(Some(policy.delay())).await
                }
            };

            match wake {
                Wake::Cancelled => break,
                Wake::Reconnect => {
                    policy.reset();
                    self.state.attempts.store(0, Ordering::Relaxed);
                }
                Wake::Timer => {}
            }
        }

        self.state.set_state(ConnectionState::Disconnected);
        tracing::info!("Feed client stopped");
    }

    async fn connect(&self) -> Result<Box<dyn FeedConnection>, ConnectError> {
        tracing::info!(url = %self.settings.url, "Connecting to upstream feed");
        let timeout = self.settings.connect_timeout;
        match tokio::time::timeout(timeout, self.transport.connect()).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ConnectError::Timeout(timeout)),
        }
    }

    async fn run_session(&self, mut conn: Box<dyn FeedConnection>) -> SessionEnd {
        self.state.set_state(ConnectionState::Connected);

        let symbols = self.universe.symbols();
        for channel in Channel::all() {
            let sent = match self.codec.encode_subscribe(*channel, &symbols) {
                Ok(frame) => conn.send(frame).await,
                Err(e) => Err(TransportError::Io(format!("failed to encode subscribe request: {e}"))),
            };
            if let Err(e) = sent {
                conn.close().await;
                return SessionEnd::Lost(e);
            }
        }
        self.state
            .subscribed_symbols
            .store(symbols.len() as u64, Ordering::Relaxed);
        self.state.set_state(ConnectionState::Subscribed);
        tracing::info!(symbols = symbols.len(), "Subscribed to upstream feed");

        loop {
            let next = tokio::select! {
                () = self.cancel.cancelled() => None,
                () = self.reconnect_requested.notified() => Some(None),
                frame = conn.next_frame() => Some(Some(frame)),
            };

            match next {
                None => {
                    conn.close().await;
                    return SessionEnd::Cancelled;
                }
                Some(None) => {
                    conn.close().await;
                    return SessionEnd::ReconnectRequested;
                }
                Some(Some(None)) => return SessionEnd::Lost(TransportError::Closed),
                Some(Some(Some(Err(e)))) => return SessionEnd::Lost(e),
                Some(Some(Some(Ok(bytes)))) => self.handle_frame(&bytes),
            }
        }
    }

    fn handle_frame(&self, bytes: &[u8]) {
        match self.codec.decode(bytes) {
            Ok(InboundFrame::Event(event)) => {
                self.state.events_received.fetch_add(1, Ordering::Relaxed);
                metrics::record_event_received(event.channel());
                self.sink.on_event(event);
            }
            Ok(InboundFrame::Ack { channel, action }) => {
                tracing::debug!(channel = channel.as_str(), action = %action, "Upstream acknowledged");
            }
            Err(e) => self.record_decode_error(&e),
        }
    }

    fn record_decode_error(&self, error: &DecodeError) {
        self.state.decode_errors.fetch_add(1, Ordering::Relaxed);
        metrics::record_decode_error(error.reason());
        tracing::warn!(error = %error, "Dropped undecodable feed frame");
    }

    async fn wait(&self, delay: Option<Duration>) -> Wake {
        let timer = async {
            match delay {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            () = self.cancel.cancelled() => Wake::Cancelled,
            () = self.reconnect_requested.notified() => Wake::Reconnect,
            () = timer => Wake::Timer,
        }
    }
}

impl std::fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("url", &self.settings.url)
            .field("state", &self.state.get_state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_codes_are_distinct() {
        let codes: Vec<_> = [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Subscribed,
            ConnectionState::Exhausted,
        ]
        .iter()
        .map(|s| s.code())
        .collect();
        assert_eq!(codes, [0, 1, 2, 3, 4]);
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ConnectionState::Exhausted).unwrap(),
            "\"exhausted\""
        );
    }

    #[test]
    fn feed_state_clears_error_on_connect() {
        let state = FeedState::new(3);
        state.set_error("refused".into());
        assert_eq!(state.snapshot().last_error.as_deref(), Some("refused"));

        state.set_state(ConnectionState::Connected);
        let status = state.snapshot();
        assert!(status.last_error.is_none());
        assert!(status.last_connected_at.is_some());
        assert_eq!(status.max_attempts, 3);
    }
}
