//! After-the-fact detection of double bookings.
//!
//! Stores without a guarded insert can let two overlapping requests through
//! when their read-then-write sequences interleave. Reconciliation keeps the
//! booking with precedence (confirmed first, then earliest created) and flags
//! every later overlapping one with `conflicts_with` for the landlord to settle.
//! Flags are cleared again once the overlap is gone.

use std::collections::HashMap;

use dashmap::DashSet;
use tracing::warn;

use crate::model::*;

use super::{BookingError, BookingRepository};

/// Flag changes applied to one property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// `(flagged booking, booking it overlaps)`.
    pub flagged: Vec<(BookingId, BookingId)>,
    pub cleared: Vec<BookingId>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.flagged.is_empty() && self.cleared.is_empty()
    }

    pub fn flag_for(&self, id: BookingId) -> Option<BookingId> {
        self.flagged.iter().find(|(b, _)| *b == id).map(|(_, c)| *c)
    }
}

/// Desired `conflicts_with` per active booking, returned only where it differs
/// from the stored value.
/// Documents with an empty or inverted range neither win nor get flagged.
pub fn plan(bookings: &[Booking]) -> Vec<(BookingId, Option<BookingId>)> {
    let mut active: Vec<(&Booking, Span)> = bookings
        .iter()
        .filter(|b| b.blocks_calendar())
        .filter_map(|b| b.span().map(|span| (b, span)))
        .collect();
    active.sort_by_key(|(b, _)| (b.status != BookingStatus::Confirmed, b.created_at, b.id));

    let mut kept: Vec<(BookingId, Span)> = Vec::with_capacity(active.len());
    let mut changes = Vec::new();
    for (b, span) in active {
        let desired = kept.iter().find(|(_, k)| k.overlaps(&span)).map(|(id, _)| *id);
        if desired.is_none() {
            kept.push((b.id, span));
        }
        if desired != b.conflicts_with {
            changes.push((b.id, desired));
        }
    }
    changes
}

/// Re-read a property's active bookings and bring their flags up to date.
pub async fn reconcile_property(
    repo: &BookingRepository,
    property_id: PropertyId,
) -> Result<ReconcileReport, BookingError> {
    let active = repo.active_bookings(property_id).await?;
    let mut report = ReconcileReport::default();
    for (id, desired) in plan(&active) {
        match repo.set_conflict_flag(id, desired).await {
            Ok(_) => {}
            // Cancelled or removed since the read; nothing left to flag.
            Err(BookingError::NotFound(_)) => continue,
            Err(e) => return Err(e),
        }
        match desired {
            Some(other) => {
                warn!("booking {id} overlaps {other} on property {property_id}; flagged for landlord");
                metrics::counter!(crate::observability::RECONCILE_FLAGGED_TOTAL).increment(1);
                report.flagged.push((id, other));
            }
            None => report.cleared.push(id),
        }
    }
    Ok(report)
}

/// Reconcile every property that currently has active bookings.
pub async fn reconcile_all(
    repo: &BookingRepository,
) -> Result<HashMap<PropertyId, ReconcileReport>, BookingError> {
    let mut by_property: HashMap<PropertyId, Vec<Booking>> = HashMap::new();
    for b in repo.all_active().await? {
        by_property.entry(b.property_id).or_default().push(b);
    }

    let mut reports = HashMap::new();
    for (property_id, bookings) in by_property {
        if plan(&bookings).is_empty() {
            continue;
        }
        let report = reconcile_property(repo, property_id).await?;
        if !report.is_clean() {
            reports.insert(property_id, report);
        }
    }
    Ok(reports)
}

/// Properties whose post-write reconciliation did not complete.
#[derive(Debug, Default)]
pub struct DirtyProperties {
    set: DashSet<PropertyId>,
}

impl DirtyProperties {
    pub fn mark(&self, property_id: PropertyId) {
        self.set.insert(property_id);
    }

    pub fn drain(&self) -> Vec<PropertyId> {
        let ids: Vec<PropertyId> = self.set.iter().map(|e| *e.key()).collect();
        for id in &ids {
            self.set.remove(id);
        }
        ids
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}
