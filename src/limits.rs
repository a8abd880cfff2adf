//! Hard limits enforced on input. Everything here is a constant; nothing is configurable at runtime.

use crate::model::Ms;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A single record may not span more than 366 days.
pub const MAX_SPAN_DURATION_MS: Ms = 366 * 24 * 3_600_000;
/// Conflict windows are capped at 366 days as well.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 24 * 3_600_000;
/// Appointment durations above one week are rejected.
pub const MAX_DURATION_MINUTES: i64 = 7 * 24 * 60;

pub const MAX_ID_LEN: usize = 128;
pub const MAX_REASON_LEN: usize = 1024;
pub const MAX_STORES: usize = 100_000;
pub const MAX_RECORDS_PER_STORE: usize = 1_000_000;

pub const MAX_FLOW_NODES: usize = 500;
/// Node visits allowed within one `advance` before the executor gives up on a cycle.
pub const MAX_FLOW_STEPS: usize = 256;
