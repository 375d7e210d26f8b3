//! Snapshot Refresh Service
//!
//! Bulk-loads full market state from the snapshot API, one group at a time.
//!
//! Groups are fetched sequentially and each group is loaded as soon as its
//! response arrives, so during a refresh some groups already hold the new
//! generation while later ones still hold the old. A failure aborts the rest
//! of the current refresh only; groups already loaded keep their new data,
//! the remaining groups keep their prior data, and the next scheduled refresh
//! starts over from the first group.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{SnapshotSource, SnapshotSourceError};
use crate::domain::market::Group;
use crate::domain::snapshot::Snapshot;
use crate::infrastructure::metrics::{self, RefreshOutcome};

/// Refresh aborted on a group.
#[derive(Debug, thiserror::Error)]
#[error("refresh of {group} failed after {completed} group(s): {source}")]
pub struct RefreshError {
    /// Group whose fetch failed.
    pub group: Group,
    /// Groups loaded before the failure.
    pub completed: usize,
    /// Underlying source error.
    #[source]
    pub source: SnapshotSourceError,
}

/// Outcome of a completed refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Symbols loaded per group, in refresh order.
    pub groups: Vec<(Group, usize)>,
}

impl RefreshReport {
    /// Total symbols loaded.
    #[must_use]
    pub fn total_symbols(&self) -> usize {
        self.groups.iter().map(|(_, n)| n).sum()
    }
}

/// Runs bulk refreshes against a [`SnapshotSource`].
pub struct RefreshService {
    source: Arc<dyn SnapshotSource>,
    snapshot: Arc<Snapshot>,
    groups: Vec<Group>,
}

impl RefreshService {
    /// Refresh every [`Group`].
    #[must_use]
    pub fn new(source: Arc<dyn SnapshotSource>, snapshot: Arc<Snapshot>) -> Self {
        Self::with_groups(source, snapshot, Group::all().to_vec())
    }

    /// Refresh only `groups`, in the given order.
    #[must_use]
    pub fn with_groups(
        source: Arc<dyn SnapshotSource>,
        snapshot: Arc<Snapshot>,
        groups: Vec<Group>,
    ) -> Self {
        Self {
            source,
            snapshot,
            groups,
        }
    }

    /// Fetch and load every group in order.
    ///
    /// # Errors
    ///
    /// Returns the first group fetch failure. Groups before it stay loaded.
    pub async fn refresh_all(&self) -> Result<RefreshReport, RefreshError> {
        let mut report = RefreshReport::default();

        for group in &self.groups {
            let started = Instant::now();
            match self.source.fetch_group(*group).await {
                Ok(states) => {
                    let loaded = self.snapshot.bulk_load(*group, states);
                    metrics::record_refresh(*group, RefreshOutcome::Success, started.elapsed());
                    tracing::debug!(group = %group, symbols = loaded, "Group loaded");
                    report.groups.push((*group, loaded));
                }
                Err(source) => {
                    metrics::record_refresh(*group, RefreshOutcome::Failure, started.elapsed());
                    return Err(RefreshError {
                        group: *group,
                        completed: report.groups.len(),
                        source,
                    });
                }
            }
        }

        Ok(report)
    }

    /// Refresh every `interval` until cancelled. The first refresh runs one
    /// interval from now.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Refresh scheduler stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            match self.refresh_all().await {
                Ok(report) => tracing::info!(
                    groups = report.groups.len(),
                    symbols = report.total_symbols(),
                    "Scheduled refresh complete"
                ),
                Err(e) => tracing::warn!(error = %e, "Scheduled refresh aborted; keeping prior data"),
            }
        }
    }
}

impl std::fmt::Debug for RefreshService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshService")
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::MockSnapshotSource;
    use crate::domain::market::MarketState;

    fn state(symbol: &str, ref_price: i64) -> MarketState {
        MarketState {
            ref_price: Some(Decimal::from(ref_price)),
            ..MarketState::new(symbol)
        }
    }

    #[tokio::test]
    async fn refresh_loads_groups_in_order() {
        let mut source = MockSnapshotSource::new();
        let mut seq = mockall::Sequence::new();
        source
            .expect_fetch_group()
            .with(eq(Group::Hose))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![state("VIC", 100), state("VHM", 50)]));
        source
            .expect_fetch_group()
            .with(eq(Group::Hnx))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![state("SHS", 20)]));

        let snapshot = Arc::new(Snapshot::new());
        let service = RefreshService::with_groups(
            Arc::new(source),
            Arc::clone(&snapshot),
            vec![Group::Hose, Group::Hnx],
        );

        let report = service.refresh_all().await.unwrap();
        assert_eq!(report.groups, [(Group::Hose, 2), (Group::Hnx, 1)]);
        assert_eq!(report.total_symbols(), 3);
        assert_eq!(snapshot.get_by_group(Group::Hnx).len(), 1);
    }

    #[tokio::test]
    async fn failure_keeps_earlier_groups_and_prior_data() {
        let snapshot = Arc::new(Snapshot::new());
        snapshot.bulk_load(Group::Hnx, vec![state("SHS", 19)]);

        let mut source = MockSnapshotSource::new();
        source
            .expect_fetch_group()
            .with(eq(Group::Hose))
            .returning(|_| Ok(vec![state("VIC", 101)]));
        source
            .expect_fetch_group()
            .with(eq(Group::Hnx))
            .returning(|_| Err(SnapshotSourceError::Status { status: 503 }));
        source.expect_fetch_group().with(eq(Group::Upcom)).never();

        let service = RefreshService::with_groups(
            Arc::new(source),
            Arc::clone(&snapshot),
            vec![Group::Hose, Group::Hnx, Group::Upcom],
        );

        let err = service.refresh_all().await.unwrap_err();
        assert_eq!(err.group, Group::Hnx);
        assert_eq!(err.completed, 1);

        assert_eq!(snapshot.get("VIC").unwrap().ref_price, Some(Decimal::from(101)));
        assert_eq!(snapshot.get("SHS").unwrap().ref_price, Some(Decimal::from(19)));
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_refreshes_each_interval_until_cancelled() {
        let mut source = MockSnapshotSource::new();
        source
            .expect_fetch_group()
            .times(2)
            .returning(|_| Ok(vec![state("VIC", 100)]));

        let snapshot = Arc::new(Snapshot::new());
        let service = Arc::new(RefreshService::with_groups(
            Arc::new(source),
            Arc::clone(&snapshot),
            vec![Group::Hose],
        ));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&service).run(Duration::from_secs(60), cancel.clone()));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(snapshot.status().groups[0].bulk_loads, 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(snapshot.status().groups[0].bulk_loads, 2);

        cancel.cancel();
        task.await.unwrap();
    }
}
