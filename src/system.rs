use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::booking::{BookingController, BookingRepository, BookingViews, DirtyProperties, reconcile_all};
use crate::config::Config;
use crate::directory::UserDirectory;
use crate::notifier::Notifier;
use crate::notify::ChangeFeed;
use crate::reconciler;
use crate::store::{InMemoryStore, StoreError};

/// Store, controller, views and background tasks wired from a [`Config`].
/// Dropping it stops the background tasks.
pub struct BookingSystem {
    controller: BookingController,
    views: BookingViews,
    store: Arc<InMemoryStore>,
    dirty: Arc<DirtyProperties>,
    tasks: Vec<JoinHandle<()>>,
}

impl BookingSystem {
    /// Open (or create) the store, sweep every property once, then spawn the
    /// reconciler and housekeeping tasks.
    pub async fn start(
        config: &Config,
        notifier: Arc<dyn Notifier>,
        directory: Arc<dyn UserDirectory>,
    ) -> Result<Self, StoreError> {
        let feed = Arc::new(ChangeFeed::new());
        let store = match config.wal_path() {
            Some(path) => {
                if let Some(dir) = path.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                Arc::new(InMemoryStore::open(&path, feed)?)
            }
            None => Arc::new(InMemoryStore::new(feed)),
        };

        let repo = BookingRepository::new(store.clone());
        let dirty = Arc::new(DirtyProperties::default());

        // Overlaps written by a previous run that never got reconciled.
        match reconcile_all(&repo).await {
            Ok(reports) if !reports.is_empty() => {
                info!("startup sweep updated flags on {} properties", reports.len())
            }
            Ok(_) => {}
            Err(e) => warn!("startup reconciliation sweep failed: {e}"),
        }

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(reconciler::run_reconciler(
            repo.clone(),
            dirty.clone(),
            config.reconcile_interval,
        )));
        tasks.push(tokio::spawn(reconciler::run_housekeeping(
            store.clone(),
            config.compact_threshold,
        )));

        info!(
            "booking system started: {} bookings, {}",
            store.booking_count(),
            match config.wal_path() {
                Some(p) => format!("wal {}", p.display()),
                None => "volatile".to_string(),
            }
        );

        Ok(Self {
            controller: BookingController::new(repo.clone(), notifier, dirty.clone()),
            views: BookingViews::new(repo, directory),
            store,
            dirty,
            tasks,
        })
    }

    pub fn controller(&self) -> &BookingController {
        &self.controller
    }

    pub fn views(&self) -> &BookingViews {
        &self.views
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    /// Per-property change events, for views that re-fetch on write.
    pub fn feed(&self) -> &Arc<ChangeFeed> {
        self.store.feed()
    }

    pub fn pending_reconciliations(&self) -> usize {
        self.dirty.len()
    }
}

impl Drop for BookingSystem {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StaticDirectory;
    use crate::model::*;
    use crate::notifier::TracingNotifier;
    use crate::store::DocumentStore;
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("lodgebook_test_system").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn durable(dir: PathBuf) -> Config {
        Config {
            data_dir: Some(dir),
            ..Config::default()
        }
    }

    async fn start(config: &Config) -> BookingSystem {
        BookingSystem::start(config, Arc::new(TracingNotifier), Arc::new(StaticDirectory::new()))
            .await
            .unwrap()
    }

    fn request(property_id: PropertyId, landlord_id: UserId) -> crate::booking::BookingRequest {
        let jan = |d| date_ms(NaiveDate::from_ymd_opt(2026, 1, d).unwrap());
        crate::booking::BookingRequest {
            property_id,
            tenant_id: Ulid::new(),
            landlord_id,
            check_in: Some(jan(5)),
            check_out: Some(jan(20)),
            lease_duration_months: 1,
            message: None,
        }
    }

    #[tokio::test]
    async fn volatile_system_books() {
        let sys = start(&Config::default()).await;
        assert!(!sys.store().is_durable());

        let pid = Ulid::new();
        let mut rx = sys.feed().subscribe(pid);
        let b = sys.controller().submit_booking_request(request(pid, Ulid::new())).await.unwrap();
        match rx.recv().await.unwrap() {
            Event::BookingInserted { booking } => assert_eq!(booking.id, b.id),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(sys.pending_reconciliations(), 0);
    }

    #[tokio::test]
    async fn bookings_survive_restart() {
        let dir = test_data_dir("restart");
        let cfg = durable(dir.clone());
        let pid = Ulid::new();
        let landlord = Ulid::new();

        let id = {
            let sys = start(&cfg).await;
            assert!(sys.store().is_durable());
            let b = sys.controller().submit_booking_request(request(pid, landlord)).await.unwrap();
            sys.controller()
                .set_booking_status(b.id, BookingStatus::Confirmed, landlord)
                .await
                .unwrap();
            b.id
        };
        assert!(dir.join("bookings.wal").exists());

        let sys = start(&cfg).await;
        let b = sys.controller().repository().get(id).await.unwrap();
        assert_eq!(b.status, BookingStatus::Confirmed);

        let err = sys
            .controller()
            .submit_booking_request(request(pid, landlord))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::booking::BookingError::DateRangeUnavailable { conflicting } if conflicting == id));
    }

    #[tokio::test]
    async fn startup_sweep_flags_unreconciled_overlap() {
        let dir = test_data_dir("sweep");
        let cfg = durable(dir);
        let pid = Ulid::new();

        // Two overlapping plain inserts left behind by a run that crashed
        // before reconciling.
        let (first, second) = {
            std::fs::create_dir_all(cfg.data_dir.as_ref().unwrap()).unwrap();
            let store = InMemoryStore::open(&cfg.wal_path().unwrap(), Arc::new(ChangeFeed::new())).unwrap();
            let doc = |start, end| NewBooking {
                property_id: pid,
                tenant_id: Ulid::new(),
                landlord_id: Ulid::new(),
                span: Span::new(start, end),
                lease_duration_months: 1,
                message: None,
            };
            let a = store.insert(doc(1_800_000_000_000, 1_800_100_000_000)).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(3)).await;
            let b = store.insert(doc(1_800_050_000_000, 1_800_200_000_000)).await.unwrap();
            (a, b)
        };

        let sys = start(&cfg).await;
        let repo = sys.controller().repository();
        assert_eq!(repo.get(first.id).await.unwrap().conflicts_with, None);
        assert_eq!(repo.get(second.id).await.unwrap().conflicts_with, Some(first.id));
    }
}
