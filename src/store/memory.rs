use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::limits::MAX_BOOKINGS_PER_PROPERTY;
use crate::model::*;
use crate::notify::ChangeFeed;
use crate::wal::Wal;

use super::{DocumentStore, GuardedInsert, StoreError};

/// All bookings of one property, sorted by `check_in`.
#[derive(Debug, Default)]
pub struct PropertyBookings {
    pub bookings: Vec<Booking>,
}

impl PropertyBookings {
    /// Insert maintaining sort order by check_in.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.check_in, |b| b.check_in)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn get(&self, id: BookingId) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    fn get_mut(&mut self, id: BookingId) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings of any status whose range overlaps `query`.
    /// Everything starting at or after `query.end` is skipped by binary search.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self.bookings.partition_point(|b| b.check_in < query.end);
        let start = query.start;
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.check_out > start)
    }

    pub fn first_active_overlap(&self, span: &Span) -> Option<BookingId> {
        self.overlapping(span)
            .find(|b| b.blocks_calendar())
            .map(|b| b.id)
    }
}

pub type SharedPropertyState = Arc<RwLock<PropertyBookings>>;

/// Apply a WAL event to a property's bookings (caller holds the lock).
fn apply_event(ps: &mut PropertyBookings, event: &Event, index: &DashMap<BookingId, PropertyId>) {
    match event {
        Event::BookingInserted { booking } => {
            index.insert(booking.id, booking.property_id);
            ps.insert_booking(booking.clone());
        }
        Event::BookingPatched {
            id,
            status,
            conflicts_with,
            at,
            ..
        } => {
            if let Some(b) = ps.get_mut(*id) {
                let patch = BookingPatch {
                    status: *status,
                    conflicts_with: *conflicts_with,
                    expect_status: None,
                };
                patch.apply(b, *at);
            }
        }
    }
}

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Rewrite {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends: block for the first
/// append, drain whatever else is already queued, then one fsync for the lot.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                for (_, tx) in batch {
                    let _ = tx.send(match &result {
                        Ok(()) => Ok(()),
                        Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
                    });
                }

                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so buffered bytes don't leak into the next batch.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Rewrite { events, response } => {
            let _ = response.send(wal.rewrite(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Reference `DocumentStore`: per-property locked booking lists, optionally
/// made durable by a write-ahead log.
///
/// Writes to one property are serialized by its `RwLock`, which is what makes
/// `insert_if_clear` atomic.
pub struct InMemoryStore {
    properties: DashMap<PropertyId, SharedPropertyState>,
    /// Reverse lookup: booking id → property id.
    booking_index: DashMap<BookingId, PropertyId>,
    wal_tx: Option<mpsc::Sender<WalCommand>>,
    /// Writers hold it shared; compaction holds it exclusively so no write
    /// lands between the snapshot and the log rewrite.
    compaction_gate: RwLock<()>,
    feed: Arc<ChangeFeed>,
}

impl InMemoryStore {
    /// Volatile store; contents are lost on drop.
    pub fn new(feed: Arc<ChangeFeed>) -> Self {
        Self {
            properties: DashMap::new(),
            booking_index: DashMap::new(),
            wal_tx: None,
            compaction_gate: RwLock::new(()),
            feed,
        }
    }

    /// Durable store: replays `wal_path`, then appends every write to it.
    /// Must be called inside a tokio runtime (spawns the WAL writer).
    pub fn open(wal_path: &Path, feed: Arc<ChangeFeed>) -> io::Result<Self> {
        let events = Wal::replay(wal_path)?;
        let wal = Wal::open(wal_path)?;

        let booking_index = DashMap::new();
        let mut replayed: HashMap<PropertyId, PropertyBookings> = HashMap::new();
        for event in &events {
            let ps = replayed.entry(event.property_id()).or_default();
            apply_event(ps, event, &booking_index);
        }
        tracing::info!(
            "replayed {} WAL events into {} properties from {}",
            events.len(),
            replayed.len(),
            wal_path.display()
        );

        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self {
            properties: replayed
                .into_iter()
                .map(|(pid, ps)| (pid, Arc::new(RwLock::new(ps))))
                .collect(),
            booking_index,
            wal_tx: Some(wal_tx),
            compaction_gate: RwLock::new(()),
            feed,
        })
    }

    pub fn is_durable(&self) -> bool {
        self.wal_tx.is_some()
    }

    pub fn feed(&self) -> &Arc<ChangeFeed> {
        &self.feed
    }

    pub fn booking_count(&self) -> usize {
        self.booking_index.len()
    }

    fn property(&self, id: PropertyId) -> SharedPropertyState {
        self.properties.entry(id).or_default().value().clone()
    }

    fn existing_property(&self, id: &PropertyId) -> Option<SharedPropertyState> {
        self.properties.get(id).map(|e| e.value().clone())
    }

    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let Some(wal_tx) = &self.wal_tx else {
            return Ok(());
        };
        let (tx, rx) = oneshot::channel();
        wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Unavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("WAL writer dropped response".into()))?
            .map_err(StoreError::from)
    }

    /// WAL-append + apply + publish.
    async fn commit(&self, ps: &mut PropertyBookings, event: &Event) -> Result<(), StoreError> {
        self.wal_append(event).await?;
        apply_event(ps, event, &self.booking_index);
        self.feed.send(event.property_id(), event);
        Ok(())
    }

    async fn insert_locked(&self, ps: &mut PropertyBookings, doc: NewBooking) -> Result<Booking, StoreError> {
        if ps.bookings.len() >= MAX_BOOKINGS_PER_PROPERTY {
            return Err(StoreError::LimitExceeded("too many bookings on property"));
        }
        let booking = doc.into_booking(Ulid::new(), now_ms());
        let event = Event::BookingInserted {
            booking: booking.clone(),
        };
        self.commit(ps, &event).await?;
        Ok(booking)
    }

    /// Rewrite the WAL with one insert per stored booking.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let Some(wal_tx) = &self.wal_tx else {
            return Ok(());
        };
        let _gate = self.compaction_gate.write().await;

        let shared: Vec<SharedPropertyState> =
            self.properties.iter().map(|e| e.value().clone()).collect();
        let mut events = Vec::with_capacity(self.booking_index.len());
        for ps in shared {
            let guard = ps.read().await;
            events.extend(guard.bookings.iter().map(|b| Event::BookingInserted { booking: b.clone() }));
        }

        let (tx, rx) = oneshot::channel();
        wal_tx
            .send(WalCommand::Rewrite { events, response: tx })
            .await
            .map_err(|_| StoreError::Unavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("WAL writer dropped response".into()))?
            .map_err(StoreError::from)
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let Some(wal_tx) = &self.wal_tx else {
            return 0;
        };
        let (tx, rx) = oneshot::channel();
        if wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert(&self, doc: NewBooking) -> Result<Booking, StoreError> {
        let _gate = self.compaction_gate.read().await;
        let ps = self.property(doc.property_id);
        let mut guard = ps.write().await;
        self.insert_locked(&mut guard, doc).await
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        let Some(pid) = self.booking_index.get(&id).map(|e| *e.value()) else {
            return Ok(None);
        };
        let Some(ps) = self.existing_property(&pid) else {
            return Ok(None);
        };
        let guard = ps.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn query(&self, filter: &BookingFilter) -> Result<Vec<Booking>, StoreError> {
        let shared: Vec<SharedPropertyState> = match filter.property_id {
            Some(pid) => self.existing_property(&pid).into_iter().collect(),
            None => self.properties.iter().map(|e| e.value().clone()).collect(),
        };

        let mut out = Vec::new();
        for ps in shared {
            let guard = ps.read().await;
            out.extend(guard.bookings.iter().filter(|b| filter.matches(b)).cloned());
        }
        out.sort_by_key(|b| (b.created_at, b.id));
        Ok(out)
    }

    async fn update(&self, id: BookingId, patch: BookingPatch) -> Result<Booking, StoreError> {
        let _gate = self.compaction_gate.read().await;
        let pid = self
            .booking_index
            .get(&id)
            .map(|e| *e.value())
            .ok_or(StoreError::NotFound(id))?;
        let ps = self.existing_property(&pid).ok_or(StoreError::NotFound(id))?;
        let mut guard = ps.write().await;

        let current = guard.get(id).ok_or(StoreError::NotFound(id))?.status;
        if let Some(expected) = patch.expect_status
            && expected != current
        {
            return Err(StoreError::PreconditionFailed { current });
        }

        let event = Event::BookingPatched {
            id,
            property_id: pid,
            status: patch.status,
            conflicts_with: patch.conflicts_with,
            at: now_ms(),
        };
        self.commit(&mut guard, &event).await?;
        guard.get(id).cloned().ok_or(StoreError::NotFound(id))
    }

    fn supports_guarded_insert(&self) -> bool {
        true
    }

    async fn insert_if_clear(&self, doc: NewBooking) -> Result<GuardedInsert, StoreError> {
        let _gate = self.compaction_gate.read().await;
        let ps = self.property(doc.property_id);
        let mut guard = ps.write().await;
        if let Some(existing) = guard.first_active_overlap(&doc.span) {
            return Ok(GuardedInsert::Conflict(existing));
        }
        self.insert_locked(&mut guard, doc)
            .await
            .map(GuardedInsert::Inserted)
    }
}
