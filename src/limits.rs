use std::time::Duration;

use crate::model::Minute;

/// Minutes in a calendar day; the exclusive upper bound of every window.
pub const MINUTES_PER_DAY: Minute = 24 * 60;

/// Raw `affectedAreas` descriptors longer than this resolve to nothing.
pub const MAX_AFFECTED_AREAS_LEN: usize = 4096;

/// Upper bound on tokens accepted from a list or JSON-array descriptor.
pub const MAX_AREA_TOKENS: usize = 256;

pub const DEFAULT_SLOT_DURATION: Minute = 60;
pub const MIN_SLOT_DURATION: Minute = 5;
pub const MAX_SLOT_DURATION: Minute = 600;

/// Spacing between consecutive slot start times.
pub const SLOT_INCREMENT: Minute = 5;

/// Widest date range a single sweep will fetch for pending requests.
pub const MAX_SWEEP_DAYS: i64 = 62;

/// Shortest pause between two sweeps.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Id the backend uses for the conference room when none is configured.
pub const DEFAULT_CONFERENCE_ROOM_ID: i64 = 11;
