use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::booking::{BookingRepository, DirtyProperties, reconcile_property};
use crate::store::InMemoryStore;

/// How often housekeeping looks at the WAL append count and the change feed.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that retries reconciliation for properties whose
/// post-write pass failed.
pub async fn run_reconciler(repo: BookingRepository, dirty: Arc<DirtyProperties>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        reconcile_dirty(&repo, &dirty).await;
    }
}

/// One pass over the dirty set. Properties that fail again are re-marked.
/// Returns the number of properties reconciled.
pub async fn reconcile_dirty(repo: &BookingRepository, dirty: &DirtyProperties) -> usize {
    metrics::gauge!(crate::observability::RECONCILE_DIRTY_PROPERTIES).set(dirty.len() as f64);
    let mut done = 0;
    for property_id in dirty.drain() {
        match reconcile_property(repo, property_id).await {
            Ok(report) => {
                done += 1;
                if report.is_clean() {
                    debug!("property {property_id} already consistent");
                } else {
                    info!(
                        "reconciled property {property_id}: {} flagged, {} cleared",
                        report.flagged.len(),
                        report.cleared.len()
                    );
                }
            }
            Err(e) => {
                warn!("reconciliation of property {property_id} failed again: {e}");
                dirty.mark(property_id);
            }
        }
    }
    done
}

/// Background task that drops abandoned change-feed channels and compacts the
/// WAL once enough appends have piled up.
pub async fn run_housekeeping(store: Arc<InMemoryStore>, compact_threshold: u64) {
    let mut interval = tokio::time::interval(HOUSEKEEPING_INTERVAL);
    loop {
        interval.tick().await;
        store.feed().prune();
        compact_if_needed(&store, compact_threshold).await;
    }
}

/// Returns true when a compaction ran.
pub async fn compact_if_needed(store: &InMemoryStore, threshold: u64) -> bool {
    if !store.is_durable() {
        return false;
    }
    let appends = store.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match store.compact().await {
        Ok(()) => {
            info!("compacted WAL after {appends} appends ({} bookings)", store.booking_count());
            true
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}
