use crate::model::*;

/// Check a candidate against approved bookings and closures.
///
/// Bookings are scanned first, then closures; the first hit wins. Pure: the
/// same inputs always give the same result.
pub fn check(candidate: &Candidate, bookings: &[BookingRecord], closures: &[ClosureRecord]) -> AvailabilityResult {
    check_all(candidate, bookings, &[], closures)
}

/// Like [`check`], with availability blocks scanned between bookings and closures.
pub fn check_all(
    candidate: &Candidate,
    bookings: &[BookingRecord],
    blocks: &[BlockRecord],
    closures: &[ClosureRecord],
) -> AvailabilityResult {
    if let Some(booking) = booking_conflict(candidate, bookings) {
        return AvailabilityResult::Conflict {
            kind: ConflictKind::Booking,
            reason: format!("Conflicts with existing booking: {}", booking.interval.span),
        };
    }
    if let Some(block) = block_conflict(candidate, blocks) {
        return AvailabilityResult::Conflict {
            kind: ConflictKind::Block,
            reason: format!(
                "Conflicts with availability block ({}): {}",
                block.block_type, block.interval.span
            ),
        };
    }
    if let Some(closure) = closure_conflict(candidate, closures) {
        return AvailabilityResult::Conflict {
            kind: ConflictKind::Closure,
            reason: format!("Conflicts with closure: {}", closure.title),
        };
    }
    AvailabilityResult::Available
}

pub(crate) fn booking_conflict<'a>(candidate: &Candidate, bookings: &'a [BookingRecord]) -> Option<&'a BookingRecord> {
    bookings.iter().find(|b| {
        b.resource_id == candidate.resource_id
            && (candidate.exclude_booking.is_none() || b.id != candidate.exclude_booking)
            && b.interval.overlaps(&candidate.interval)
    })
}

pub(crate) fn block_conflict<'a>(candidate: &Candidate, blocks: &'a [BlockRecord]) -> Option<&'a BlockRecord> {
    blocks
        .iter()
        .find(|b| b.resource_id == candidate.resource_id && b.interval.overlaps(&candidate.interval))
}

pub(crate) fn closure_conflict<'a>(candidate: &Candidate, closures: &'a [ClosureRecord]) -> Option<&'a ClosureRecord> {
    let date = candidate.interval.date;
    closures
        .iter()
        .filter(|c| c.covers_date(date) && c.affects(candidate.resource_id))
        .find(|c| match &c.window {
            // No window: closed all day.
            None => true,
            Some(window) => window.overlaps(&candidate.interval.span),
        })
}
