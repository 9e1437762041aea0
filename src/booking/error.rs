use crate::model::{BookingId, BookingStatus, UserId};
use crate::store::StoreError;

/// Coarse classification for callers that only need to pick a message or a retry affordance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidDateRange,
    DateRangeUnavailable,
    Unauthorized,
    InvalidTransition,
    StoreUnavailable,
    NotFound,
    LimitExceeded,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidDateRange => "invalid_date_range",
            ErrorKind::DateRangeUnavailable => "date_range_unavailable",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::NotFound => "not_found",
            ErrorKind::LimitExceeded => "limit_exceeded",
        }
    }
}

#[derive(Debug)]
pub enum BookingError {
    /// Missing dates, or check-in not before check-out.
    InvalidDateRange,
    DateRangeUnavailable { conflicting: BookingId },
    Unauthorized { user: UserId },
    InvalidTransition { from: BookingStatus, to: BookingStatus },
    StoreUnavailable(String),
    NotFound(BookingId),
    LimitExceeded(&'static str),
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::InvalidDateRange => ErrorKind::InvalidDateRange,
            BookingError::DateRangeUnavailable { .. } => ErrorKind::DateRangeUnavailable,
            BookingError::Unauthorized { .. } => ErrorKind::Unauthorized,
            BookingError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            BookingError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            BookingError::NotFound(_) => ErrorKind::NotFound,
            BookingError::LimitExceeded(_) => ErrorKind::LimitExceeded,
        }
    }

    /// Only store outages are worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::StoreUnavailable(_))
    }
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::InvalidDateRange => {
                write!(f, "invalid date range: check-in must be before check-out")
            }
            BookingError::DateRangeUnavailable { conflicting } => {
                write!(f, "dates unavailable: overlaps booking {conflicting}")
            }
            BookingError::Unauthorized { user } => write!(f, "user {user} may not do this"),
            BookingError::InvalidTransition { from, to } => {
                write!(f, "cannot move booking from {from} to {to}")
            }
            BookingError::StoreUnavailable(e) => write!(f, "store unavailable: {e}"),
            BookingError::NotFound(id) => write!(f, "booking not found: {id}"),
            BookingError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for BookingError {}

impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => BookingError::NotFound(id),
            StoreError::LimitExceeded(msg) => BookingError::LimitExceeded(msg),
            // Status preconditions are mapped where the target status is known.
            other @ (StoreError::Unavailable(_)
            | StoreError::Unsupported(_)
            | StoreError::PreconditionFailed { .. }) => BookingError::StoreUnavailable(other.to_string()),
        }
    }
}
