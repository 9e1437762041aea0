//! Document store seam. The booking core only ever talks to a `DocumentStore`;
//! `InMemoryStore` is the reference implementation (volatile or WAL-backed).

mod error;
pub mod memory;

pub use error::StoreError;
pub use memory::InMemoryStore;

use async_trait::async_trait;

use crate::model::*;

/// Outcome of `DocumentStore::insert_if_clear`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardedInsert {
    Inserted(Booking),
    /// An active booking already overlaps the requested span.
    Conflict(BookingId),
}

/// Insert / query / partial-update over booking documents.
///
/// No cross-document transaction is assumed. Stores that can check overlap and
/// insert atomically advertise it through `supports_guarded_insert`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert with a store-generated id. The booking is stored as `pending`.
    async fn insert(&self, doc: NewBooking) -> Result<Booking, StoreError>;

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, StoreError>;

    /// Equality/membership query, ordered by `(created_at, id)`.
    async fn query(&self, filter: &BookingFilter) -> Result<Vec<Booking>, StoreError>;

    async fn update(&self, id: BookingId, patch: BookingPatch) -> Result<Booking, StoreError>;

    fn supports_guarded_insert(&self) -> bool {
        false
    }

    /// Insert only if no active booking on the same property overlaps `doc.span`,
    /// checked and written atomically.
    async fn insert_if_clear(&self, doc: NewBooking) -> Result<GuardedInsert, StoreError> {
        let _ = doc;
        Err(StoreError::Unsupported("guarded insert"))
    }
}
