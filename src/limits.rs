use crate::model::{DAY_MS, Ms};

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// Longest stay a single booking may cover (five years).
pub const MAX_STAY_MS: Ms = 5 * 366 * DAY_MS;

pub const MAX_MESSAGE_LEN: usize = 2_000;
pub const MAX_LEASE_MONTHS: u32 = 60;

/// Bookings of any status kept per property.
pub const MAX_BOOKINGS_PER_PROPERTY: usize = 10_000;

/// Largest WAL record accepted on replay. A longer length prefix is treated as corruption.
pub const MAX_WAL_RECORD_BYTES: usize = 1 << 20;
