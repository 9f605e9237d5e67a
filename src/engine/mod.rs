mod conflict;
mod error;
mod slots;

pub use conflict::{check, check_all};
pub use error::EngineError;
pub use slots::{BusinessHours, SlotQuery, free_windows, merge_overlapping, slot_grid, subtract_intervals};

use chrono::NaiveDate;

use crate::model::*;

/// Everything a check needs, as fetched from the backend for one date range.
///
/// Snapshots are built fresh for every check and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub bookings: Vec<BookingRecord>,
    pub blocks: Vec<BlockRecord>,
    pub closures: Vec<ClosureRecord>,
}

impl Snapshot {
    pub fn new(bookings: Vec<BookingRecord>, blocks: Vec<BlockRecord>, closures: Vec<ClosureRecord>) -> Self {
        Self {
            bookings,
            blocks,
            closures,
        }
    }

    pub fn check(&self, candidate: &Candidate) -> AvailabilityResult {
        check_all(candidate, &self.bookings, &self.blocks, &self.closures)
    }

    /// Every span on `date` during which `resource_id` is taken, sorted by start.
    pub fn occupied(&self, resource_id: ResourceId, date: NaiveDate) -> Vec<MinuteSpan> {
        let bookings = self
            .bookings
            .iter()
            .filter(|b| b.resource_id == resource_id && b.interval.date == date)
            .map(|b| b.interval.span);
        let blocks = self
            .blocks
            .iter()
            .filter(|b| b.resource_id == resource_id && b.interval.date == date)
            .map(|b| b.interval.span);
        let closures = self
            .closures
            .iter()
            .filter(|c| c.covers_date(date) && c.affects(resource_id))
            .map(|c| c.window.unwrap_or(MinuteSpan::whole_day()));

        let mut spans: Vec<MinuteSpan> = bookings.chain(blocks).chain(closures).collect();
        spans.sort_by_key(|s| s.start);
        spans
    }
}
