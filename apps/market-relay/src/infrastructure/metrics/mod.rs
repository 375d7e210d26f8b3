//! Prometheus Metrics Module
//!
//! Exposes relay metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Feed**: events received, decode errors, connection state, connect attempts
//! - **Fan-out**: serializations, deliveries and drops per channel
//! - **Clients**: connected clients and live subscriptions per kind
//! - **Refresh**: bulk load outcomes and durations per group
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! functions are no-ops until [`init_metrics`] installs the recorder, so unit
//! tests can call into instrumented code freely.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::market::{Channel, Group};
use crate::domain::subscription::SubscriptionKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Later calls return the first handle.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Feed
    describe_counter!(
        "market_relay_events_received_total",
        "Decoded events received from the upstream feed"
    );
    describe_counter!(
        "market_relay_decode_errors_total",
        "Upstream frames dropped because they failed to decode"
    );
    describe_gauge!(
        "market_relay_feed_state",
        "Feed connection state (0 disconnected, 1 connecting, 2 connected, 3 subscribed, 4 exhausted)"
    );
    describe_counter!(
        "market_relay_connect_attempts_total",
        "Upstream connection attempts, successful or not"
    );

    // Fan-out
    describe_counter!(
        "market_relay_serializations_total",
        "Events serialized for downstream delivery"
    );
    describe_counter!(
        "market_relay_messages_sent_total",
        "Messages queued to downstream clients"
    );
    describe_counter!(
        "market_relay_messages_dropped_total",
        "Messages dropped because a client queue was full or closed"
    );

    // Clients
    describe_gauge!("market_relay_clients", "Connected downstream clients");
    describe_gauge!(
        "market_relay_subscriptions",
        "Live (client, symbol) subscriptions per kind"
    );

    // Refresh
    describe_counter!(
        "market_relay_refresh_total",
        "Group bulk loads by outcome"
    );
    describe_histogram!(
        "market_relay_refresh_seconds",
        "Time to fetch and load one group"
    );
    describe_histogram!(
        "market_relay_event_processing_seconds",
        "Time from decoded event to fan-out complete"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Refresh outcome label.
#[derive(Debug, Clone, Copy)]
pub enum RefreshOutcome {
    /// Group loaded.
    Success,
    /// Fetch failed; the group kept its prior data.
    Failure,
}

impl RefreshOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Record an event received from the feed.
pub fn record_event_received(channel: Channel) {
    counter!(
        "market_relay_events_received_total",
        "channel" => channel.as_str()
    )
    .increment(1);
}

/// Record a frame that failed to decode.
pub fn record_decode_error(reason: &'static str) {
    counter!("market_relay_decode_errors_total", "reason" => reason).increment(1);
}

/// Update the feed state gauge.
pub fn set_feed_state(code: u8) {
    gauge!("market_relay_feed_state").set(f64::from(code));
}

/// Record an upstream connection attempt.
pub fn record_connect_attempt() {
    counter!("market_relay_connect_attempts_total").increment(1);
}

/// Record one serialization for fan-out.
pub fn record_serialization(channel: Channel) {
    counter!(
        "market_relay_serializations_total",
        "channel" => channel.as_str()
    )
    .increment(1);
}

/// Record messages queued to clients.
pub fn record_messages_sent(channel: Channel, count: u64) {
    counter!(
        "market_relay_messages_sent_total",
        "channel" => channel.as_str()
    )
    .increment(count);
}

/// Record messages dropped for slow or gone clients.
pub fn record_messages_dropped(channel: Channel, count: u64) {
    counter!(
        "market_relay_messages_dropped_total",
        "channel" => channel.as_str()
    )
    .increment(count);
}

/// Update the connected client count.
#[allow(clippy::cast_precision_loss)]
pub fn set_clients(count: usize) {
    gauge!("market_relay_clients").set(count as f64);
}

/// Update the subscription count for one kind.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscriptions(kind: SubscriptionKind, count: usize) {
    gauge!(
        "market_relay_subscriptions",
        "kind" => kind.as_str()
    )
    .set(count as f64);
}

/// Record a group refresh.
pub fn record_refresh(group: Group, outcome: RefreshOutcome, duration: Duration) {
    counter!(
        "market_relay_refresh_total",
        "group" => group.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
    histogram!(
        "market_relay_refresh_seconds",
        "group" => group.as_str()
    )
    .record(duration.as_secs_f64());
}

/// Record the time spent applying and fanning out one event.
pub fn record_processing_duration(channel: Channel, duration: Duration) {
    histogram!(
        "market_relay_event_processing_seconds",
        "channel" => channel.as_str()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_outcome_as_str() {
        assert_eq!(RefreshOutcome::Success.as_str(), "success");
        assert_eq!(RefreshOutcome::Failure.as_str(), "failure");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_event_received(Channel::MatchPrice);
        record_messages_sent(Channel::BidAsk, 3);
        set_clients(2);
        record_refresh(Group::Hose, RefreshOutcome::Success, Duration::from_millis(5));
    }
}
