use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};

use crate::limits::*;
use crate::model::*;

use super::{EngineError, Snapshot};

// ── Business hours ───────────────────────────────────────────────

/// Opening hours per weekday, in club-local minutes. `None` means closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessHours {
    days: [Option<MinuteSpan>; 7],
}

impl Default for BusinessHours {
    /// Monday closed; Tue-Thu 08:30-20:00; Fri-Sat 08:30-22:00; Sunday 08:30-18:00.
    fn default() -> Self {
        let open = 8 * 60 + 30;
        let weeknight = Some(MinuteSpan::new(open, 20 * 60));
        let weekend = Some(MinuteSpan::new(open, 22 * 60));
        Self {
            days: [
                None,
                weeknight,
                weeknight,
                weeknight,
                weekend,
                weekend,
                Some(MinuteSpan::new(open, 18 * 60)),
            ],
        }
    }
}

impl BusinessHours {
    pub fn closed() -> Self {
        Self { days: [None; 7] }
    }

    #[must_use]
    pub fn with_day(mut self, day: Weekday, hours: Option<MinuteSpan>) -> Self {
        self.days[day.num_days_from_monday() as usize] = hours;
        self
    }

    pub fn for_date(&self, date: NaiveDate) -> Option<MinuteSpan> {
        self.days[date.weekday().num_days_from_monday() as usize]
    }
}

// ── Slot grid ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotQuery {
    pub resource_id: ResourceId,
    pub date: NaiveDate,
    pub duration: Minute,
    /// Club-local "now". Slots on that date starting at or before it are omitted.
    pub now: Option<NaiveDateTime>,
}

impl SlotQuery {
    pub fn new(resource_id: ResourceId, date: NaiveDate) -> Self {
        Self {
            resource_id,
            date,
            duration: DEFAULT_SLOT_DURATION,
            now: None,
        }
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Minute) -> Self {
        self.duration = duration;
        self
    }

    #[must_use]
    pub fn at(mut self, now: NaiveDateTime) -> Self {
        self.now = Some(now);
        self
    }
}

/// Fixed-duration candidate slots every [`SLOT_INCREMENT`] minutes inside the
/// day's business hours, each flagged with whether it could be booked.
pub fn slot_grid(query: &SlotQuery, hours: &BusinessHours, snapshot: &Snapshot) -> Result<Vec<Slot>, EngineError> {
    if !(MIN_SLOT_DURATION..=MAX_SLOT_DURATION).contains(&query.duration) {
        return Err(EngineError::LimitExceeded("slot duration out of range"));
    }
    let Some(open) = hours.for_date(query.date) else {
        return Ok(Vec::new());
    };

    let cutoff = query
        .now
        .filter(|now| now.date() == query.date)
        .map(|now| now.hour() * 60 + now.minute());

    let mut slots = Vec::new();
    let mut start = open.start;
    while start + query.duration <= open.end {
        if cutoff.is_none_or(|c| start > c) {
            let span = MinuteSpan::new(start, start + query.duration);
            let candidate = Candidate::new(query.resource_id, TimeInterval::new(query.date, span));
            slots.push(Slot {
                span,
                available: snapshot.check(&candidate).is_available(),
            });
        }
        start += SLOT_INCREMENT;
    }
    Ok(slots)
}

// ── Free windows ─────────────────────────────────────────────────

/// Maximal free windows of a resource on a date: business hours minus every
/// booking, block and closure that applies to it.
pub fn free_windows(
    resource_id: ResourceId,
    date: NaiveDate,
    hours: &BusinessHours,
    snapshot: &Snapshot,
    min_duration: Option<Minute>,
) -> Vec<MinuteSpan> {
    let Some(open) = hours.for_date(date) else {
        return Vec::new();
    };
    let busy = merge_overlapping(&snapshot.occupied(resource_id, date));
    let mut free = subtract_intervals(&[open], &busy);
    if let Some(min) = min_duration {
        free.retain(|span| span.duration() >= min);
    }
    free
}

/// Merge sorted overlapping/adjacent spans into disjoint spans.
pub fn merge_overlapping(sorted: &[MinuteSpan]) -> Vec<MinuteSpan> {
    let mut merged: Vec<MinuteSpan> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// Remove sorted, disjoint `to_remove` spans from sorted, disjoint `base` spans.
pub fn subtract_intervals(base: &[MinuteSpan], to_remove: &[MinuteSpan]) -> Vec<MinuteSpan> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < b.end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(MinuteSpan::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < b.end {
            result.push(MinuteSpan::new(current_start, b.end));
        }
    }

    result
}
