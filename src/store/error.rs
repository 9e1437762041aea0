use crate::model::{BookingId, BookingStatus};

#[derive(Debug)]
pub enum StoreError {
    /// Read or write failed (outage, network, I/O). Retryable.
    Unavailable(String),
    NotFound(BookingId),
    /// `BookingPatch::expect_status` did not match the stored status.
    PreconditionFailed { current: BookingStatus },
    /// The store does not offer this capability.
    Unsupported(&'static str),
    LimitExceeded(&'static str),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(e) => write!(f, "store unavailable: {e}"),
            StoreError::NotFound(id) => write!(f, "not found: {id}"),
            StoreError::PreconditionFailed { current } => {
                write!(f, "precondition failed: booking is {current}")
            }
            StoreError::Unsupported(op) => write!(f, "unsupported by store: {op}"),
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}
