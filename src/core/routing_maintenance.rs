//! Routing table and record maintenance logic.

use std::time::{Duration, Instant};

use crate::common::{Id, RoutingTable};

/// Default interval between bucket refreshes run by the actor.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);
/// Default window after which an untouched bucket is refreshed.
pub const DEFAULT_MEAN_REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);
const PURGE_RECORDS_INTERVAL: Duration = Duration::from_secs(60);

/// Routing table maintenance state
#[derive(Debug)]
pub struct RoutingMaintenance {
    refresh_interval: Option<Duration>,
    mean_refresh_interval: Duration,
    last_table_refresh: Instant,
    last_records_purge: Instant,
}

/// Decisions about routing table maintenance
#[derive(Debug, Default, PartialEq)]
pub struct MaintenanceDecisions {
    /// Random ids inside stale buckets, to FIND_NODE.
    pub refresh_targets: Vec<Id>,

    /// Whether to purge expired records from the local store.
    pub should_purge_records: bool,
}

impl RoutingMaintenance {
    /// Create new routing maintenance tracker, refreshing every `refresh_interval` if set,
    /// the buckets untouched within `mean_refresh_interval`.
    pub fn new(refresh_interval: Option<Duration>, mean_refresh_interval: Duration) -> Self {
        RoutingMaintenance {
            refresh_interval,
            mean_refresh_interval,
            last_table_refresh: Instant::now(),
            last_records_purge: Instant::now(),
        }
    }

    pub fn mean_refresh_interval(&self) -> Duration {
        self.mean_refresh_interval
    }

    /// Determine what maintenance operations should be performed.
    ///
    /// Computes decisions and resets internal timers when intervals elapse.
    /// Buckets chosen for a refresh are marked touched.
    pub fn periodic_maintenance_decisions(
        &mut self,
        routing_table: &mut RoutingTable,
    ) -> MaintenanceDecisions {
        self.periodic_maintenance_decisions_at(Instant::now(), routing_table)
    }

    fn periodic_maintenance_decisions_at(
        &mut self,
        now: Instant,
        routing_table: &mut RoutingTable,
    ) -> MaintenanceDecisions {
        let refresh_is_due = self.refresh_interval.is_some_and(|interval| {
            now.saturating_duration_since(self.last_table_refresh) >= interval
        });

        let refresh_targets = if refresh_is_due && !routing_table.is_empty() {
            self.last_table_refresh = now;
            routing_table.refresh_targets_at(now, self.mean_refresh_interval)
        } else {
            Vec::new()
        };

        let should_purge_records =
            now.saturating_duration_since(self.last_records_purge) >= PURGE_RECORDS_INTERVAL;

        if should_purge_records {
            self.last_records_purge = now;
        }

        MaintenanceDecisions {
            refresh_targets,
            should_purge_records,
        }
    }
}
