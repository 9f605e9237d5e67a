use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::engine::EngineError;
use crate::limits::MINUTES_PER_DAY;

/// Minute of the club-local day. `1440` is only valid as an exclusive end.
pub type Minute = u32;

/// Backend integer id of a bookable resource (bay or conference room).
pub type ResourceId = i64;

/// Half-open minute-of-day window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MinuteSpan {
    pub start: Minute,
    pub end: Minute,
}

impl MinuteSpan {
    pub fn new(start: Minute, end: Minute) -> Self {
        debug_assert!(start < end, "MinuteSpan start must be before end");
        debug_assert!(end <= MINUTES_PER_DAY, "MinuteSpan must end within the day");
        Self { start, end }
    }

    /// Validating constructor for anything that came off the wire.
    pub fn try_new(start: Minute, end: Minute) -> Result<Self, EngineError> {
        if start >= end || end > MINUTES_PER_DAY {
            return Err(EngineError::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parse a `HH:MM[:SS]` pair.
    pub fn parse(start: &str, end: &str) -> Result<Self, EngineError> {
        Self::try_new(parse_clock(start)?, parse_clock(end)?)
    }

    pub const fn whole_day() -> Self {
        Self {
            start: 0,
            end: MINUTES_PER_DAY,
        }
    }

    pub fn duration(&self) -> Minute {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &MinuteSpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for MinuteSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", format_clock(self.start), format_clock(self.end))
    }
}

/// Parse `HH:MM` or `HH:MM:SS` into a minute of the day. Seconds are truncated.
/// `24:00` is accepted so that windows can run until midnight.
pub fn parse_clock(raw: &str) -> Result<Minute, EngineError> {
    let bad = || EngineError::InvalidTime(raw.to_string());
    let mut parts = raw.trim().split(':');

    let hours = parts
        .next()
        .filter(|p| (1..=2).contains(&p.len()) && p.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(bad)?;
    let minutes = parts
        .next()
        .filter(|p| p.len() == 2 && p.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(bad)?;
    if let Some(seconds) = parts.next() {
        let ok = seconds.len() == 2
            && seconds.bytes().all(|b| b.is_ascii_digit())
            && seconds < "60";
        if !ok {
            return Err(bad());
        }
    }
    if parts.next().is_some() {
        return Err(bad());
    }

    let hours: Minute = hours.parse().map_err(|_| bad())?;
    let minutes: Minute = minutes.parse().map_err(|_| bad())?;
    if minutes >= 60 || hours > 24 || (hours == 24 && minutes != 0) {
        return Err(bad());
    }
    Ok(hours * 60 + minutes)
}

pub fn format_clock(m: Minute) -> String {
    format!("{:02}:{:02}", m / 60, m % 60)
}

/// Parse a `YYYY-MM-DD` date. A trailing timestamp (`T00:00:00.000Z`) is ignored,
/// since the backend serialises some date columns as full timestamps.
pub fn parse_date(raw: &str) -> Result<NaiveDate, EngineError> {
    let raw = raw.trim();
    let day = match raw.as_bytes().get(10) {
        Some(b'T' | b' ') => &raw[..10],
        _ => raw,
    };
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|_| EngineError::InvalidDate(raw.to_string()))
}

/// A minute window on one calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeInterval {
    pub date: NaiveDate,
    pub span: MinuteSpan,
}

impl TimeInterval {
    pub fn new(date: NaiveDate, span: MinuteSpan) -> Self {
        Self { date, span }
    }

    pub fn parse(date: &str, start: &str, end: &str) -> Result<Self, EngineError> {
        Ok(Self {
            date: parse_date(date)?,
            span: MinuteSpan::parse(start, end)?,
        })
    }

    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.date == other.date && self.span.overlaps(&other.span)
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.span)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceKind {
    Simulator,
    ConferenceRoom,
    Other(String),
}

impl ResourceKind {
    pub fn from_backend(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "simulator" | "bay" => ResourceKind::Simulator,
            "conference_room" => ResourceKind::ConferenceRoom,
            other => ResourceKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ResourceKind::Simulator => "simulator",
            ResourceKind::ConferenceRoom => "conference_room",
            ResourceKind::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub name: Option<String>,
    pub kind: ResourceKind,
}

/// The known bookable resources plus the fixed conference-room id the
/// `conference_room` area keyword refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub resources: Vec<Resource>,
    pub conference_room_id: ResourceId,
}

impl Catalog {
    pub fn new(resources: Vec<Resource>, conference_room_id: ResourceId) -> Self {
        Self {
            resources,
            conference_room_id,
        }
    }

    pub fn all_ids(&self) -> BTreeSet<ResourceId> {
        self.resources.iter().map(|r| r.id).collect()
    }

    pub fn simulator_ids(&self) -> BTreeSet<ResourceId> {
        self.resources
            .iter()
            .filter(|r| r.kind == ResourceKind::Simulator)
            .map(|r| r.id)
            .collect()
    }

    pub fn get(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == id)
    }
}

/// An approved booking occupying one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub id: Option<i64>,
    pub resource_id: ResourceId,
    pub interval: TimeInterval,
}

/// A staff-entered block that takes one resource out of service for a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub id: Option<i64>,
    pub resource_id: ResourceId,
    pub interval: TimeInterval,
    pub block_type: String,
    pub notes: Option<String>,
}

/// Facility downtime over an inclusive date range. `window: None` means all day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureRecord {
    pub id: Option<i64>,
    pub title: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub window: Option<MinuteSpan>,
    pub affected: BTreeSet<ResourceId>,
}

impl ClosureRecord {
    pub fn covers_date(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    pub fn affects(&self, resource_id: ResourceId) -> bool {
        self.affected.contains(&resource_id)
    }
}

/// The tentative booking being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub resource_id: ResourceId,
    pub interval: TimeInterval,
    /// Booking id to ignore, so a request being re-approved never conflicts with itself.
    pub exclude_booking: Option<i64>,
}

impl Candidate {
    pub fn new(resource_id: ResourceId, interval: TimeInterval) -> Self {
        Self {
            resource_id,
            interval,
            exclude_booking: None,
        }
    }

    pub fn parse(resource_id: ResourceId, date: &str, start: &str, end: &str) -> Result<Self, EngineError> {
        Ok(Self::new(resource_id, TimeInterval::parse(date, start, end)?))
    }

    #[must_use]
    pub fn excluding(mut self, booking_id: i64) -> Self {
        self.exclude_booking = Some(booking_id);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictKind {
    Booking,
    Block,
    Closure,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::Booking => "booking",
            ConflictKind::Block => "block",
            ConflictKind::Closure => "closure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AvailabilityResult {
    Available,
    Conflict { kind: ConflictKind, reason: String },
}

impl AvailabilityResult {
    pub fn is_available(&self) -> bool {
        matches!(self, AvailabilityResult::Available)
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            AvailabilityResult::Available => "available",
            AvailabilityResult::Conflict { .. } => "conflict",
        }
    }

    pub fn kind(&self) -> Option<ConflictKind> {
        match self {
            AvailabilityResult::Available => None,
            AvailabilityResult::Conflict { kind, .. } => Some(*kind),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            AvailabilityResult::Available => None,
            AvailabilityResult::Conflict { reason, .. } => Some(reason),
        }
    }
}

/// One cell of the booking calendar grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub span: MinuteSpan,
    pub available: bool,
}
