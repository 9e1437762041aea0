use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::warn;

use crate::directory::{UNKNOWN_USER, UserDirectory};
use crate::model::*;

use super::availability::{Availability, CalendarBlocks};
use super::{BookingError, BookingRepository};

/// One line of the landlord's booking table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandlordBookingRow {
    pub booking: Booking,
    pub tenant_name: String,
}

impl LandlordBookingRow {
    /// Overlaps another booking and waits for the landlord to pick one.
    pub fn needs_attention(&self) -> bool {
        self.booking.blocks_calendar() && self.booking.conflicts_with.is_some()
    }
}

/// Read-only projections for the tenant card, the landlord table and the date
/// picker. Each call re-fetches; nothing is kept between calls.
pub struct BookingViews {
    repo: BookingRepository,
    directory: Arc<dyn UserDirectory>,
}

impl BookingViews {
    pub fn new(repo: BookingRepository, directory: Arc<dyn UserDirectory>) -> Self {
        Self { repo, directory }
    }

    /// The tenant's newest non-cancelled booking on a property.
    pub async fn tenant_booking_for_property(
        &self,
        property_id: PropertyId,
        tenant_id: UserId,
    ) -> Result<Option<Booking>, BookingError> {
        let active = self.repo.active_bookings(property_id).await?;
        Ok(active
            .into_iter()
            .filter(|b| b.tenant_id == tenant_id && b.blocks_calendar())
            .max_by_key(|b| (b.created_at, b.id)))
    }

    /// Every booking on a property, newest first, with tenant display names.
    pub async fn landlord_bookings(&self, property_id: PropertyId) -> Result<Vec<LandlordBookingRow>, BookingError> {
        let mut bookings = self.repo.property_bookings(property_id).await?;
        bookings.sort_by_key(|b| std::cmp::Reverse((b.created_at, b.id)));

        let mut tenants: Vec<UserId> = bookings.iter().map(|b| b.tenant_id).collect();
        tenants.sort();
        tenants.dedup();
        let names: HashMap<UserId, String> = join_all(tenants.into_iter().map(|id| async move {
            let name = match self.directory.resolve_display_name(id).await {
                Ok(name) => name,
                Err(e) => {
                    warn!("display name for {id} unavailable: {e}");
                    UNKNOWN_USER.to_string()
                }
            };
            (id, name)
        }))
        .await
        .into_iter()
        .collect();

        Ok(bookings
            .into_iter()
            .map(|booking| {
                let tenant_name = names
                    .get(&booking.tenant_id)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_USER.to_string());
                LandlordBookingRow { booking, tenant_name }
            })
            .collect())
    }

    pub async fn disabled_dates_for_calendar(&self, property_id: PropertyId) -> Result<CalendarBlocks, BookingError> {
        Ok(self.availability(property_id).await?.calendar())
    }

    /// Fresh availability of a property.
    pub async fn availability(&self, property_id: PropertyId) -> Result<Availability, BookingError> {
        let active = self.repo.active_bookings(property_id).await?;
        Ok(Availability::from_bookings(property_id, &active))
    }

    /// All of a tenant's bookings across properties, newest first.
    pub async fn tenant_bookings(&self, tenant_id: UserId) -> Result<Vec<Booking>, BookingError> {
        let mut bookings = self.repo.tenant_bookings(tenant_id).await?;
        bookings.sort_by_key(|b| std::cmp::Reverse((b.created_at, b.id)));
        Ok(bookings)
    }

    /// Pending requests a landlord has to answer, oldest first.
    pub async fn landlord_inbox(&self, landlord_id: UserId) -> Result<Vec<Booking>, BookingError> {
        self.repo.landlord_pending(landlord_id).await
    }
}
