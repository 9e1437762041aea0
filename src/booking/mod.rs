mod availability;
mod error;
mod lifecycle;
mod reconcile;
mod repository;
mod views;

pub use availability::{Availability, BlockedRange, CalendarBlocks};
pub use error::{BookingError, ErrorKind};
pub use lifecycle::{BookingController, BookingRequest};
pub use reconcile::{DirtyProperties, ReconcileReport, plan, reconcile_all, reconcile_property};
pub use repository::BookingRepository;
pub use views::{BookingViews, LandlordBookingRow};
