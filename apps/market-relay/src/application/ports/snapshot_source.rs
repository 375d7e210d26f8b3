//! Snapshot Source Port (Driven Port)
//!
//! Bulk query collaborator used by the refresh service.

use async_trait::async_trait;

use crate::domain::market::{Group, MarketState};

/// Bulk query failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SnapshotSourceError {
    /// Request did not complete (connect, timeout).
    #[error("snapshot request failed: {0}")]
    Request(String),

    /// Upstream answered with a non-success status.
    #[error("snapshot API returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Response body did not match the market state schema.
    #[error("invalid snapshot payload: {0}")]
    Payload(String),
}

/// Fetches the full market state of one group.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Full states for every member of `group`, in membership order.
    async fn fetch_group(&self, group: Group) -> Result<Vec<MarketState>, SnapshotSourceError>;
}
