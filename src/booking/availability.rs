use chrono::NaiveDate;
use tracing::warn;

use crate::model::*;

/// A date range a property cannot take new bookings for, and the booking holding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockedRange {
    pub booking_id: BookingId,
    pub span: Span,
    pub status: BookingStatus,
}

/// Blocked ranges of one property, computed from a booking list.
///
/// Pure and uncached: build it from a fresh fetch every time it is needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    pub property_id: PropertyId,
    /// Sorted by `span.start`.
    blocked: Vec<BlockedRange>,
}

impl Availability {
    /// Keeps only this property's pending/confirmed bookings, whatever filter
    /// the store applied. Documents with an empty or inverted range are skipped.
    pub fn from_bookings(property_id: PropertyId, bookings: &[Booking]) -> Self {
        let mut blocked: Vec<BlockedRange> = bookings
            .iter()
            .filter(|b| b.property_id == property_id && b.blocks_calendar())
            .filter_map(|b| match b.span() {
                Some(span) => Some(BlockedRange {
                    booking_id: b.id,
                    span,
                    status: b.status,
                }),
                None => {
                    warn!("booking {} has malformed range [{}, {}); ignored", b.id, b.check_in, b.check_out);
                    None
                }
            })
            .collect();
        blocked.sort_by_key(|r| (r.span.start, r.span.end));
        Self { property_id, blocked }
    }

    pub fn blocked(&self) -> &[BlockedRange] {
        &self.blocked
    }

    pub fn blocked_ranges(&self) -> Vec<Span> {
        self.blocked.iter().map(|r| r.span).collect()
    }

    pub fn is_fully_available(&self) -> bool {
        self.blocked.is_empty()
    }

    pub fn is_available(&self, candidate: &Span) -> bool {
        self.first_conflict(candidate).is_none()
    }

    pub fn first_conflict(&self, candidate: &Span) -> Option<BookingId> {
        self.blocked
            .iter()
            .find(|r| r.span.overlaps(candidate))
            .map(|r| r.booking_id)
    }

    /// Like `first_conflict`, ignoring one booking (typically the candidate's own).
    pub fn first_conflict_excluding(&self, candidate: &Span, exclude: BookingId) -> Option<BookingId> {
        self.blocked
            .iter()
            .find(|r| r.booking_id != exclude && r.span.overlaps(candidate))
            .map(|r| r.booking_id)
    }

    pub fn is_instant_blocked(&self, t: Ms) -> bool {
        self.blocked.iter().any(|r| r.span.contains_instant(t))
    }

    pub fn calendar(&self) -> CalendarBlocks {
        CalendarBlocks {
            property_id: self.property_id,
            ranges: merge_overlapping(&self.blocked_ranges()),
        }
    }
}

/// Disabled date ranges for a date picker, merged for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarBlocks {
    pub property_id: PropertyId,
    pub ranges: Vec<Span>,
}

impl CalendarBlocks {
    /// A day is disabled if any part of it is blocked. The check-out day of a
    /// midnight-to-midnight booking stays selectable.
    pub fn is_day_disabled(&self, day: NaiveDate) -> bool {
        let start = date_ms(day);
        let whole_day = Span::new(start, start + DAY_MS);
        self.ranges.iter().any(|r| r.overlaps(&whole_day))
    }
}
