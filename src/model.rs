use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

pub type BookingId = Ulid;
pub type PropertyId = Ulid;
pub type UserId = Ulid;

pub const DAY_MS: Ms = 86_400_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Like `new`, but returns `None` for an empty or inverted range.
    pub fn try_new(start: Ms, end: Ms) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Check-in day through check-out day, both at UTC midnight.
    pub fn from_dates(check_in: NaiveDate, check_out: NaiveDate) -> Option<Self> {
        Self::try_new(date_ms(check_in), date_ms(check_out))
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// UTC midnight of `date` in Unix milliseconds.
pub fn date_ms(date: NaiveDate) -> Ms {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

pub(crate) fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

/// Merge sorted overlapping/adjacent spans into disjoint spans.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    /// Statuses that occupy the property's calendar.
    pub const ACTIVE: [BookingStatus; 2] = [BookingStatus::Pending, BookingStatus::Confirmed];

    pub fn is_active(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tenant's reservation of a property over `[check_in, check_out)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub property_id: PropertyId,
    pub tenant_id: UserId,
    /// Owner of the property when the booking was created. Not re-synced.
    pub landlord_id: UserId,
    pub check_in: Ms,
    pub check_out: Ms,
    pub lease_duration_months: u32,
    pub message: Option<String>,
    pub status: BookingStatus,
    /// Earlier booking this one was found overlapping during reconciliation.
    pub conflicts_with: Option<BookingId>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Booking {
    /// `None` for a stored document whose dates are empty or inverted.
    pub fn span(&self) -> Option<Span> {
        Span::try_new(self.check_in, self.check_out)
    }

    pub fn blocks_calendar(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_party(&self, user: UserId) -> bool {
        self.tenant_id == user || self.landlord_id == user
    }
}

/// A booking document before the store has assigned its id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub property_id: PropertyId,
    pub tenant_id: UserId,
    pub landlord_id: UserId,
    pub span: Span,
    pub lease_duration_months: u32,
    pub message: Option<String>,
}

impl NewBooking {
    pub(crate) fn into_booking(self, id: BookingId, now: Ms) -> Booking {
        Booking {
            id,
            property_id: self.property_id,
            tenant_id: self.tenant_id,
            landlord_id: self.landlord_id,
            check_in: self.span.start,
            check_out: self.span.end,
            lease_duration_months: self.lease_duration_months,
            message: self.message,
            status: BookingStatus::Pending,
            conflicts_with: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of a booking document. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingPatch {
    pub status: Option<BookingStatus>,
    /// `Some(None)` clears the flag.
    pub conflicts_with: Option<Option<BookingId>>,
    /// Reject the update unless the stored status still equals this.
    pub expect_status: Option<BookingStatus>,
}

impl BookingPatch {
    pub fn status(from: BookingStatus, to: BookingStatus) -> Self {
        Self {
            status: Some(to),
            conflicts_with: None,
            expect_status: Some(from),
        }
    }

    pub fn flag(conflicts_with: Option<BookingId>) -> Self {
        Self {
            status: None,
            conflicts_with: Some(conflicts_with),
            expect_status: None,
        }
    }

    pub(crate) fn apply(&self, booking: &mut Booking, now: Ms) {
        if let Some(status) = self.status {
            booking.status = status;
            booking.updated_at = now;
        }
        if let Some(flag) = self.conflicts_with {
            booking.conflicts_with = flag;
        }
    }
}

/// Equality and membership filter; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingFilter {
    pub property_id: Option<PropertyId>,
    pub tenant_id: Option<UserId>,
    pub landlord_id: Option<UserId>,
    pub status_in: Option<Vec<BookingStatus>>,
}

impl BookingFilter {
    pub fn active_for_property(property_id: PropertyId) -> Self {
        Self {
            property_id: Some(property_id),
            status_in: Some(BookingStatus::ACTIVE.to_vec()),
            ..Self::default()
        }
    }

    pub fn matches(&self, b: &Booking) -> bool {
        self.property_id.is_none_or(|p| p == b.property_id)
            && self.tenant_id.is_none_or(|t| t == b.tenant_id)
            && self.landlord_id.is_none_or(|l| l == b.landlord_id)
            && self
                .status_in
                .as_ref()
                .is_none_or(|set| set.contains(&b.status))
    }
}

/// The WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingInserted {
        booking: Booking,
    },
    BookingPatched {
        id: BookingId,
        property_id: PropertyId,
        status: Option<BookingStatus>,
        conflicts_with: Option<Option<BookingId>>,
        at: Ms,
    },
}

impl Event {
    pub fn property_id(&self) -> PropertyId {
        match self {
            Event::BookingInserted { booking } => booking.property_id,
            Event::BookingPatched { property_id, .. } => *property_id,
        }
    }
}
