use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate, NaiveDateTime};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::club::Club;
use crate::feed::{FeedError, PendingRequest};
use crate::limits::{MAX_SWEEP_DAYS, MIN_SWEEP_INTERVAL};
use crate::model::*;
use crate::observability::{PENDING_CONFLICTS, SWEEPS_TOTAL};

/// Outcome of checking one pending request during the last sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReview {
    pub request_id: i64,
    pub resource_id: ResourceId,
    pub interval: TimeInterval,
    pub requester: String,
    pub result: AvailabilityResult,
    pub checked_at: NaiveDateTime,
}

/// Results of the most recent successful sweep, keyed by request id.
#[derive(Debug, Default)]
pub struct ReviewBoard {
    entries: DashMap<i64, PendingReview>,
}

impl ReviewBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, request_id: i64) -> Option<PendingReview> {
        self.entries.get(&request_id).map(|e| e.value().clone())
    }

    /// All reviews ordered by date, start time, then request id.
    pub fn snapshot(&self) -> Vec<PendingReview> {
        let mut all: Vec<PendingReview> = self.entries.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|r| (r.interval.date, r.interval.span.start, r.request_id));
        all
    }

    /// Swap in a new set of reviews. Entries absent from `reviews` are dropped.
    pub fn replace(&self, reviews: Vec<PendingReview>) {
        let keep: HashSet<i64> = reviews.iter().map(|r| r.request_id).collect();
        for review in reviews {
            self.entries.insert(review.request_id, review);
        }
        self.entries.retain(|id, _| keep.contains(id));
    }
}

/// Check every pending request against current data and publish the results.
///
/// On a fetch failure the board is left as it was.
pub async fn sweep(club: &Club, board: &ReviewBoard) -> Result<usize, FeedError> {
    let mut requests = club.feed().pending_requests().await?;
    requests.sort_by_key(|r| r.interval.date);
    let checked_at = club.now();

    let mut reviews = Vec::with_capacity(requests.len());
    for chunk in date_chunks(&requests) {
        let (Some(first), Some(last)) = (chunk.first(), chunk.last()) else {
            continue;
        };
        let snapshot = club
            .snapshot(first.interval.date, last.interval.date, None)
            .await?;
        for request in chunk {
            let candidate = Candidate::new(request.resource_id, request.interval).excluding(request.id);
            reviews.push(PendingReview {
                request_id: request.id,
                resource_id: request.resource_id,
                interval: request.interval,
                requester: request.requester.clone(),
                result: snapshot.check(&candidate),
                checked_at,
            });
        }
    }

    let conflicts = reviews.iter().filter(|r| !r.result.is_available()).count();
    metrics::gauge!(PENDING_CONFLICTS).set(conflicts as f64);
    let count = reviews.len();
    board.replace(reviews);
    debug!(count, conflicts, "sweep complete");
    Ok(count)
}

/// Split date-sorted requests into runs spanning at most [`MAX_SWEEP_DAYS`].
fn date_chunks(sorted: &[PendingRequest]) -> Vec<&[PendingRequest]> {
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < sorted.len() {
        let limit = window_end(sorted[start].interval.date);
        let len = sorted[start..]
            .iter()
            .take_while(|r| limit.is_none_or(|l| r.interval.date <= l))
            .count();
        chunks.push(&sorted[start..start + len]);
        start += len;
    }
    chunks
}

fn window_end(from: NaiveDate) -> Option<NaiveDate> {
    from.checked_add_days(Days::new(MAX_SWEEP_DAYS as u64 - 1))
}

/// Background task that re-sweeps pending requests every `every`, but never
/// more often than [`MIN_SWEEP_INTERVAL`].
pub async fn run_sweeper(club: Arc<Club>, board: Arc<ReviewBoard>, every: Duration) {
    let mut interval = tokio::time::interval(every.max(MIN_SWEEP_INTERVAL));
    loop {
        interval.tick().await;
        match sweep(&club, &board).await {
            Ok(count) => {
                metrics::counter!(SWEEPS_TOTAL, "status" => "ok").increment(1);
                if count > 0 {
                    info!("reviewed {count} pending booking requests");
                }
            }
            Err(e) => {
                metrics::counter!(SWEEPS_TOTAL, "status" => "error").increment(1);
                warn!("pending request sweep failed, keeping previous results: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FixtureData, RawClosure, StaticFeed};

    fn interval(day: &str, start: &str, end: &str) -> TimeInterval {
        TimeInterval::parse(day, start, end).unwrap()
    }

    fn request(id: i64, resource_id: ResourceId, day: &str, start: &str, end: &str) -> PendingRequest {
        PendingRequest {
            id,
            resource_id,
            interval: interval(day, start, end),
            requester: format!("member{id}@club.test"),
        }
    }

    fn fixture() -> FixtureData {
        FixtureData {
            resources: vec![Resource {
                id: 1,
                name: None,
                kind: ResourceKind::Simulator,
            }],
            bookings: vec![
                // The request itself, already approved once and being re-reviewed.
                BookingRecord {
                    id: Some(10),
                    resource_id: 1,
                    interval: interval("2024-06-01", "09:00", "10:00"),
                },
                BookingRecord {
                    id: Some(50),
                    resource_id: 1,
                    interval: interval("2024-06-01", "12:00", "13:00"),
                },
            ],
            closures: vec![RawClosure {
                id: Some(1),
                title: "Holiday".into(),
                start_date: parse_date("2024-09-02").unwrap(),
                end_date: parse_date("2024-09-02").unwrap(),
                window: None,
                affected_areas: "entire_facility".into(),
            }],
            requests: vec![
                request(10, 1, "2024-06-01", "09:00", "10:00"),
                request(11, 1, "2024-06-01", "12:30", "13:30"),
                request(12, 1, "2024-09-02", "10:00", "11:00"),
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn sweep_checks_each_request_excluding_itself() {
        let feed = Arc::new(StaticFeed::new(fixture()));
        let club = Club::new(feed);
        let board = ReviewBoard::new();

        assert_eq!(sweep(&club, &board).await.unwrap(), 3);
        assert!(board.get(10).unwrap().result.is_available());
        assert_eq!(
            board.get(11).unwrap().result.reason(),
            Some("Conflicts with existing booking: 12:00-13:00")
        );
        assert_eq!(board.get(12).unwrap().result.kind(), Some(ConflictKind::Closure));

        let ordered: Vec<i64> = board.snapshot().iter().map(|r| r.request_id).collect();
        assert_eq!(ordered, vec![10, 11, 12]);
    }

    #[tokio::test]
    async fn failed_sweep_keeps_previous_board() {
        let feed = Arc::new(StaticFeed::new(fixture()));
        let club = Club::new(feed.clone());
        let board = ReviewBoard::new();
        sweep(&club, &board).await.unwrap();

        feed.set_failing(true);
        assert!(sweep(&club, &board).await.is_err());
        assert_eq!(board.len(), 3);
    }

    #[tokio::test]
    async fn resolved_requests_leave_the_board() {
        let feed = Arc::new(StaticFeed::new(fixture()));
        let club = Club::new(feed.clone());
        let board = ReviewBoard::new();
        sweep(&club, &board).await.unwrap();

        let mut next = fixture();
        next.requests.retain(|r| r.id == 11);
        feed.replace(next).await;
        assert_eq!(sweep(&club, &board).await.unwrap(), 1);
        assert!(board.get(10).is_none());
        assert!(board.get(11).is_some());

        feed.replace(FixtureData::default()).await;
        assert_eq!(sweep(&club, &board).await.unwrap(), 0);
        assert!(board.is_empty());
    }

    #[test]
    fn requests_far_apart_are_fetched_in_separate_windows() {
        let requests = vec![
            request(1, 1, "2024-06-01", "09:00", "10:00"),
            request(2, 1, "2024-07-15", "09:00", "10:00"),
            request(3, 1, "2024-08-15", "09:00", "10:00"),
        ];
        let chunks = date_chunks(&requests);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![2, 1]);
        assert!(date_chunks(&[]).is_empty());
    }

    #[tokio::test]
    async fn zero_interval_sweeper_keeps_running() {
        let feed = Arc::new(StaticFeed::new(fixture()));
        let club = Arc::new(Club::new(feed));
        let board = Arc::new(ReviewBoard::new());

        let task = tokio::spawn(run_sweeper(club, board.clone(), Duration::ZERO));
        for _ in 0..100 {
            if board.len() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(board.len(), 3);
        assert!(!task.is_finished());
        task.abort();
    }
}
