use std::sync::Arc;

use tracing::debug;

use crate::model::*;
use crate::store::{DocumentStore, GuardedInsert, StoreError};

use super::BookingError;

/// Typed booking operations over a `DocumentStore`. Holds no cached state;
/// every call is a fresh store round-trip.
#[derive(Clone)]
pub struct BookingRepository {
    store: Arc<dyn DocumentStore>,
}

impl BookingRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn supports_guarded_insert(&self) -> bool {
        self.store.supports_guarded_insert()
    }

    /// Pending and confirmed bookings of a property. The status filter runs in
    /// the store only to cut transfer; callers still re-check status.
    pub async fn active_bookings(&self, property_id: PropertyId) -> Result<Vec<Booking>, BookingError> {
        let bookings = self
            .store
            .query(&BookingFilter::active_for_property(property_id))
            .await?;
        debug!("fetched {} active bookings for property {property_id}", bookings.len());
        Ok(bookings)
    }

    /// Every booking of a property, any status.
    pub async fn property_bookings(&self, property_id: PropertyId) -> Result<Vec<Booking>, BookingError> {
        let filter = BookingFilter {
            property_id: Some(property_id),
            ..BookingFilter::default()
        };
        Ok(self.store.query(&filter).await?)
    }

    pub async fn tenant_bookings(&self, tenant_id: UserId) -> Result<Vec<Booking>, BookingError> {
        let filter = BookingFilter {
            tenant_id: Some(tenant_id),
            ..BookingFilter::default()
        };
        Ok(self.store.query(&filter).await?)
    }

    /// Bookings waiting on the landlord, found through the denormalized `landlord_id`.
    pub async fn landlord_pending(&self, landlord_id: UserId) -> Result<Vec<Booking>, BookingError> {
        let filter = BookingFilter {
            landlord_id: Some(landlord_id),
            status_in: Some(vec![BookingStatus::Pending]),
            ..BookingFilter::default()
        };
        Ok(self.store.query(&filter).await?)
    }

    /// Active bookings across all properties.
    pub async fn all_active(&self) -> Result<Vec<Booking>, BookingError> {
        let filter = BookingFilter {
            status_in: Some(BookingStatus::ACTIVE.to_vec()),
            ..BookingFilter::default()
        };
        Ok(self.store.query(&filter).await?)
    }

    pub async fn get(&self, id: BookingId) -> Result<Booking, BookingError> {
        self.store.get(id).await?.ok_or(BookingError::NotFound(id))
    }

    pub async fn insert(&self, doc: NewBooking) -> Result<Booking, BookingError> {
        Ok(self.store.insert(doc).await?)
    }

    pub async fn insert_if_clear(&self, doc: NewBooking) -> Result<GuardedInsert, BookingError> {
        Ok(self.store.insert_if_clear(doc).await?)
    }

    /// Compare-and-set status change. Loses to any concurrent status change.
    pub async fn transition(
        &self,
        id: BookingId,
        from: BookingStatus,
        to: BookingStatus,
        clear_flag: bool,
    ) -> Result<Booking, BookingError> {
        let mut patch = BookingPatch::status(from, to);
        if clear_flag {
            patch.conflicts_with = Some(None);
        }
        self.store.update(id, patch).await.map_err(|e| match e {
            StoreError::PreconditionFailed { current } => BookingError::InvalidTransition { from: current, to },
            other => other.into(),
        })
    }

    pub async fn set_conflict_flag(
        &self,
        id: BookingId,
        conflicts_with: Option<BookingId>,
    ) -> Result<Booking, BookingError> {
        Ok(self.store.update(id, BookingPatch::flag(conflicts_with)).await?)
    }
}
