use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::limits::*;
use crate::model::*;
use crate::notifier::{Notification, NotificationKind, Notifier};
use crate::store::GuardedInsert;

use super::availability::Availability;
use super::reconcile::{DirtyProperties, reconcile_property};
use super::{BookingError, BookingRepository};

/// A tenant's request as it arrives from the booking form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub property_id: PropertyId,
    pub tenant_id: UserId,
    /// Owner of the property at request time; copied onto the booking.
    pub landlord_id: UserId,
    pub check_in: Option<Ms>,
    pub check_out: Option<Ms>,
    pub lease_duration_months: u32,
    pub message: Option<String>,
}

/// Drives bookings through `pending → confirmed | cancelled`, `confirmed → cancelled`.
///
/// Every validation re-reads the property's bookings. When the store offers a
/// guarded insert the overlap check is repeated atomically inside the store;
/// otherwise the property is reconciled straight after the write.
pub struct BookingController {
    repo: BookingRepository,
    notifier: Arc<dyn Notifier>,
    dirty: Arc<DirtyProperties>,
}

impl BookingController {
    pub fn new(repo: BookingRepository, notifier: Arc<dyn Notifier>, dirty: Arc<DirtyProperties>) -> Self {
        Self { repo, notifier, dirty }
    }

    pub fn repository(&self) -> &BookingRepository {
        &self.repo
    }

    pub async fn submit_booking_request(&self, req: BookingRequest) -> Result<Booking, BookingError> {
        let started = Instant::now();
        let result = self.submit(req).await;
        metrics::histogram!(crate::observability::SUBMIT_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        let outcome = match &result {
            Ok(_) => "created",
            Err(e) => e.kind().as_str(),
        };
        metrics::counter!(crate::observability::BOOKING_REQUESTS_TOTAL, "outcome" => outcome).increment(1);
        result
    }

    async fn submit(&self, req: BookingRequest) -> Result<Booking, BookingError> {
        let span = validate_request(&req)?;
        let property_id = req.property_id;

        let active = self.repo.active_bookings(property_id).await?;
        if let Some(conflicting) = Availability::from_bookings(property_id, &active).first_conflict(&span) {
            return Err(BookingError::DateRangeUnavailable { conflicting });
        }

        let doc = NewBooking {
            property_id,
            tenant_id: req.tenant_id,
            landlord_id: req.landlord_id,
            span,
            lease_duration_months: req.lease_duration_months,
            message: req.message,
        };

        let booking = if self.repo.supports_guarded_insert() {
            match self.repo.insert_if_clear(doc).await? {
                GuardedInsert::Inserted(b) => b,
                GuardedInsert::Conflict(conflicting) => {
                    // Someone else got in between our read and the write.
                    metrics::counter!(crate::observability::GUARDED_INSERT_CONFLICTS_TOTAL).increment(1);
                    return Err(BookingError::DateRangeUnavailable { conflicting });
                }
            }
        } else {
            let mut b = self.repo.insert(doc).await?;
            match reconcile_property(&self.repo, property_id).await {
                Ok(report) => {
                    if let Some(other) = report.flag_for(b.id) {
                        b.conflicts_with = Some(other);
                    }
                }
                Err(e) => {
                    warn!("post-insert reconciliation of property {property_id} failed: {e}");
                    self.dirty.mark(property_id);
                }
            }
            b
        };

        info!(
            "booking {} requested: property {} tenant {} [{}, {})",
            booking.id, property_id, booking.tenant_id, booking.check_in, booking.check_out
        );

        self.notify_best_effort(Notification {
            user_id: booking.landlord_id,
            kind: NotificationKind::BookingRequested,
            title: "New booking request".into(),
            body: format!(
                "A tenant requested your property for {} month(s).",
                booking.lease_duration_months
            ),
            link: format!("/properties/{property_id}/bookings"),
        });

        Ok(booking)
    }

    pub async fn set_booking_status(
        &self,
        booking_id: BookingId,
        new_status: BookingStatus,
        acting_user_id: UserId,
    ) -> Result<Booking, BookingError> {
        let result = self.transition(booking_id, new_status, acting_user_id).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind().as_str(),
        };
        metrics::counter!(
            crate::observability::STATUS_TRANSITIONS_TOTAL,
            "to" => new_status.as_str(),
            "outcome" => outcome
        )
        .increment(1);
        result
    }

    async fn transition(
        &self,
        booking_id: BookingId,
        to: BookingStatus,
        actor: UserId,
    ) -> Result<Booking, BookingError> {
        let booking = self.repo.get(booking_id).await?;
        let from = booking.status;

        let allowed = match to {
            BookingStatus::Confirmed => actor == booking.landlord_id,
            BookingStatus::Cancelled => booking.is_party(actor),
            BookingStatus::Pending => booking.is_party(actor),
        };
        if !allowed {
            return Err(BookingError::Unauthorized { user: actor });
        }
        if !from.can_transition_to(to) {
            return Err(BookingError::InvalidTransition { from, to });
        }

        // An unflagged pending booking already reserved its range at creation.
        // A flagged one was let through by a race and must win its range first.
        let flagged = booking.conflicts_with.is_some();
        if to == BookingStatus::Confirmed && flagged {
            let active = self.repo.active_bookings(booking.property_id).await?;
            let span = booking.span().ok_or(BookingError::InvalidDateRange)?;
            let availability = Availability::from_bookings(booking.property_id, &active);
            if let Some(conflicting) = availability.first_conflict_excluding(&span, booking.id) {
                return Err(BookingError::DateRangeUnavailable { conflicting });
            }
        }

        let updated = self.repo.transition(booking_id, from, to, flagged).await?;
        info!("booking {booking_id}: {from} -> {to} by {actor}");

        if to == BookingStatus::Cancelled {
            // Frees the range; bookings flagged against this one may now be clear.
            if let Err(e) = reconcile_property(&self.repo, updated.property_id).await {
                warn!("reconciliation after cancelling {booking_id} failed: {e}");
                self.dirty.mark(updated.property_id);
            }
        }

        self.notify_best_effort(counterparty_notice(&updated, from, actor));
        Ok(updated)
    }

    /// Delivery runs on its own task so a slow notifier never holds up the
    /// caller. Failures are logged and counted, never returned.
    fn notify_best_effort(&self, notification: Notification) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let user = notification.user_id;
            let kind = notification.kind;
            if let Err(e) = notifier.notify(notification).await {
                warn!("notification {kind:?} to {user} dropped: {e}");
                metrics::counter!(crate::observability::NOTIFY_FAILURES_TOTAL).increment(1);
            }
        });
    }
}

fn validate_request(req: &BookingRequest) -> Result<Span, BookingError> {
    let (Some(check_in), Some(check_out)) = (req.check_in, req.check_out) else {
        return Err(BookingError::InvalidDateRange);
    };
    let span = Span::try_new(check_in, check_out).ok_or(BookingError::InvalidDateRange)?;

    if req.tenant_id == req.landlord_id {
        return Err(BookingError::Unauthorized { user: req.tenant_id });
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(BookingError::LimitExceeded("date out of range"));
    }
    if span.duration_ms() > MAX_STAY_MS {
        return Err(BookingError::LimitExceeded("stay too long"));
    }
    if req.lease_duration_months > MAX_LEASE_MONTHS {
        return Err(BookingError::LimitExceeded("lease too long"));
    }
    if let Some(ref m) = req.message
        && m.len() > MAX_MESSAGE_LEN
    {
        return Err(BookingError::LimitExceeded("message too long"));
    }
    Ok(span)
}

/// Who hears about a transition, and how it is phrased.
fn counterparty_notice(booking: &Booking, from: BookingStatus, actor: UserId) -> Notification {
    let by_landlord = actor == booking.landlord_id;
    let (user_id, kind, title) = match (booking.status, by_landlord) {
        (BookingStatus::Confirmed, _) => (booking.tenant_id, NotificationKind::BookingConfirmed, "Booking confirmed"),
        (_, true) if from == BookingStatus::Pending => {
            (booking.tenant_id, NotificationKind::BookingRejected, "Booking request declined")
        }
        (_, true) => (booking.tenant_id, NotificationKind::BookingCancelled, "Booking cancelled by landlord"),
        (_, false) => (booking.landlord_id, NotificationKind::BookingCancelled, "Booking cancelled by tenant"),
    };
    Notification {
        user_id,
        kind,
        title: title.into(),
        body: format!("Booking {} is now {}.", booking.id, booking.status),
        link: format!("/bookings/{}", booking.id),
    }
}
