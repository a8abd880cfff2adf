use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unix milliseconds. The only time type inside the engine.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;

/// Appointments stored without a duration occupy one hour.
pub const DEFAULT_DURATION_MINUTES: i64 = 60;

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

    /// `None` unless `start < end`.
    pub fn checked(start: Ms, end: Ms) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Touching endpoints (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// End of an appointment: `scheduled_at + duration`, one hour when unset.
pub fn derive_commitment_end(start: Ms, duration_minutes: Option<i64>) -> Ms {
    start + duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES) * MINUTE_MS
}

// ── Timestamps at the boundary ───────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid timestamp {0:?}: expected RFC 3339 or unix milliseconds")]
    BadTimestamp(String),
    #[error("timestamp {0} out of range")]
    OutOfRange(Ms),
    #[error("unknown status: {0}")]
    UnknownStatus(String),
}

/// Parse an RFC 3339 timestamp (or a bare integer of unix milliseconds).
pub fn parse_timestamp(s: &str) -> Result<Ms, ModelError> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<i64>() {
        return Ok(ms);
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
        .map_err(|_| ModelError::BadTimestamp(s.to_string()))
}

pub fn format_timestamp(ms: Ms) -> Result<String, ModelError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        .ok_or(ModelError::OutOfRange(ms))
}

mod iso_ms {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{format_timestamp, parse_timestamp, Ms};

    pub fn serialize<S: Serializer>(ms: &Ms, s: S) -> Result<S::Ok, S::Error> {
        let text = format_timestamp(*ms).map_err(serde::ser::Error::custom)?;
        s.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Ms, D::Error> {
        let text = String::deserialize(d)?;
        parse_timestamp(&text).map_err(serde::de::Error::custom)
    }
}

// ── Schedule records ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Confirmed => "confirmed",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
            Status::Cancelled => "cancelled",
            Status::NoShow => "no_show",
        }
    }

    /// Appointments stop occupying time once cancelled or marked no-show.
    pub fn holds_appointment_slot(&self) -> bool {
        !matches!(self, Status::Cancelled | Status::NoShow)
    }

    /// Booking items only release their slot when cancelled.
    pub fn holds_item_slot(&self) -> bool {
        !matches!(self, Status::Cancelled)
    }
}

impl std::str::FromStr for Status {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Status::Pending),
            "confirmed" => Ok(Status::Confirmed),
            "in_progress" => Ok(Status::InProgress),
            "completed" => Ok(Status::Completed),
            "cancelled" | "canceled" => Ok(Status::Cancelled),
            "no_show" => Ok(Status::NoShow),
            other => Err(ModelError::UnknownStatus(other.to_string())),
        }
    }
}

/// Whose time is being checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    Staff(String),
    Resource(String),
}

impl Subject {
    pub fn id(&self) -> &str {
        match self {
            Subject::Staff(id) | Subject::Resource(id) => id,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Subject::Staff(_) => "staff",
            Subject::Resource(_) => "resource",
        }
    }

    /// Does a record assigned to `(staff_id, resource_id)` belong to this subject?
    pub fn matches(&self, staff_id: Option<&str>, resource_id: Option<&str>) -> bool {
        match self {
            Subject::Staff(id) => staff_id == Some(id.as_str()),
            Subject::Resource(id) => resource_id == Some(id.as_str()),
        }
    }
}

/// A scheduled appointment ("commitment").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appointment {
    pub id: String,
    pub store_id: String,
    pub staff_id: Option<String>,
    pub resource_id: Option<String>,
    pub scheduled_at: Ms,
    pub duration_minutes: Option<i64>,
    pub status: Status,
}

impl Appointment {
    pub fn end(&self) -> Ms {
        derive_commitment_end(self.scheduled_at, self.duration_minutes)
    }
}

/// Explicit unavailability (break, holiday, maintenance). Always active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: String,
    pub store_id: String,
    pub staff_id: Option<String>,
    pub resource_id: Option<String>,
    pub span: Span,
    pub reason: Option<String>,
}

/// One staff/resource assignment inside a multi-part booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingItem {
    pub id: String,
    pub store_id: String,
    pub appointment_id: String,
    pub staff_id: Option<String>,
    pub resource_id: Option<String>,
    pub span: Span,
    pub status: Status,
}

// ── Conflict check ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Appointment,
    Block,
    BookingItem,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::Appointment => "appointment",
            ConflictKind::Block => "block",
            ConflictKind::BookingItem => "booking_item",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictEntry {
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    pub id: String,
    #[serde(with = "iso_ms")]
    pub start_at: Ms,
    #[serde(with = "iso_ms")]
    pub end_at: Ms,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    pub has_conflict: bool,
    pub conflicts: Vec<ConflictEntry>,
}

impl ConflictReport {
    pub fn from_entries(conflicts: Vec<ConflictEntry>) -> Self {
        Self {
            has_conflict: !conflicts.is_empty(),
            conflicts,
        }
    }
}

/// Input to a conflict check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictQuery {
    pub store_id: String,
    pub staff_id: Option<String>,
    pub resource_id: Option<String>,
    pub window: Span,
    pub exclude_appointment_id: Option<String>,
}

impl ConflictQuery {
    pub fn new(store_id: impl Into<String>, window: Span) -> Self {
        Self {
            store_id: store_id.into(),
            staff_id: None,
            resource_id: None,
            window,
            exclude_appointment_id: None,
        }
    }

    pub fn staff(mut self, id: impl Into<String>) -> Self {
        self.staff_id = Some(id.into());
        self
    }

    pub fn resource(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn excluding(mut self, appointment_id: impl Into<String>) -> Self {
        self.exclude_appointment_id = Some(appointment_id.into());
        self
    }

    /// Subjects in check order: staff first, then resource.
    pub fn subjects(&self) -> Vec<Subject> {
        let mut subjects = Vec::with_capacity(2);
        if let Some(id) = &self.staff_id {
            subjects.push(Subject::Staff(id.clone()));
        }
        if let Some(id) = &self.resource_id {
            subjects.push(Subject::Resource(id.clone()));
        }
        subjects
    }
}
