//! Live availability status for the candidate a reviewer is looking at.
//!
//! Every [`Probe::run`] takes a generation number before it fetches. Only the
//! run holding the newest generation may publish its outcome, so a slow check
//! for a candidate the reviewer has already changed can never overwrite the
//! status of the current one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::club::Club;
use crate::model::*;
use crate::observability::STALE_CHECKS_TOTAL;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Idle,
    Checking,
    Available,
    Conflict(String),
    /// The inputs could not be fetched; the answer is indeterminate.
    Unknown,
}

impl CheckStatus {
    /// Unknown fails open: only an in-flight check or a known conflict blocks.
    pub fn blocks_approval(&self) -> bool {
        matches!(self, CheckStatus::Checking | CheckStatus::Conflict(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            CheckStatus::Idle => "idle",
            CheckStatus::Checking => "checking",
            CheckStatus::Available => "available",
            CheckStatus::Conflict(_) => "conflict",
            CheckStatus::Unknown => "unknown",
        }
    }
}

impl From<AvailabilityResult> for CheckStatus {
    fn from(result: AvailabilityResult) -> Self {
        match result {
            AvailabilityResult::Available => CheckStatus::Available,
            AvailabilityResult::Conflict { reason, .. } => CheckStatus::Conflict(reason),
        }
    }
}

/// One reviewer's view of a single candidate booking.
///
/// Library API for staff tools that embed baycheck; the SQL surface answers
/// one-shot `availability` queries and keeps no per-reviewer state.
pub struct Probe {
    club: Arc<Club>,
    generation: AtomicU64,
    status: watch::Sender<CheckStatus>,
}

impl Probe {
    pub fn new(club: Arc<Club>) -> Self {
        let (status, _) = watch::channel(CheckStatus::Idle);
        Self {
            club,
            generation: AtomicU64::new(0),
            status,
        }
    }

    pub fn status(&self) -> CheckStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CheckStatus> {
        self.status.subscribe()
    }

    /// Check `candidate` and publish the outcome.
    ///
    /// Returns the published status, or `None` when a newer run started while
    /// this one was fetching and the outcome was discarded.
    pub async fn run(&self, candidate: Candidate) -> Option<CheckStatus> {
        // Taking the generation under the channel lock orders it with every
        // publish, so `Checking` can never land on top of a newer outcome.
        let mut generation = 0;
        self.status.send_modify(|current| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *current = CheckStatus::Checking;
        });

        let outcome = match self.club.check(&candidate).await {
            Ok(result) => CheckStatus::from(result),
            Err(e) => {
                warn!(resource_id = candidate.resource_id, "availability check indeterminate: {e}");
                CheckStatus::Unknown
            }
        };

        let mut published = None;
        self.status.send_if_modified(|current| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *current = outcome.clone();
            published = Some(outcome.clone());
            true
        });

        if published.is_none() {
            debug!(generation, "discarding stale availability check");
            metrics::counter!(STALE_CHECKS_TOTAL).increment(1);
        }
        published
    }

    /// Forget the current candidate. Any in-flight run becomes stale.
    pub fn reset(&self) {
        self.status.send_modify(|current| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            *current = CheckStatus::Idle;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use tokio::sync::{Mutex, oneshot};

    use crate::feed::{BookingFeed, FeedError, FixtureData, PendingRequest, RawClosure, StaticFeed};

    /// Delegates to a [`StaticFeed`], but holds the next `resources` call
    /// until the test releases it.
    struct GatedFeed {
        inner: StaticFeed,
        gate: Mutex<Option<oneshot::Receiver<()>>>,
    }

    #[async_trait]
    impl BookingFeed for GatedFeed {
        async fn resources(&self) -> Result<Vec<Resource>, FeedError> {
            let gate = self.gate.lock().await.take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            self.inner.resources().await
        }

        async fn approved_bookings(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<BookingRecord>, FeedError> {
            self.inner.approved_bookings(from, to).await
        }

        async fn closures(&self) -> Result<Vec<RawClosure>, FeedError> {
            self.inner.closures().await
        }

        async fn availability_blocks(
            &self,
            from: NaiveDate,
            to: NaiveDate,
            resource_id: Option<ResourceId>,
        ) -> Result<Vec<BlockRecord>, FeedError> {
            self.inner.availability_blocks(from, to, resource_id).await
        }

        async fn pending_requests(&self) -> Result<Vec<PendingRequest>, FeedError> {
            self.inner.pending_requests().await
        }
    }

    fn data() -> FixtureData {
        FixtureData {
            bookings: vec![BookingRecord {
                id: Some(1),
                resource_id: 2,
                interval: TimeInterval::parse("2024-06-01", "10:30", "11:30").unwrap(),
            }],
            ..Default::default()
        }
    }

    fn conflicting() -> Candidate {
        Candidate::parse(2, "2024-06-01", "10:00", "11:00").unwrap()
    }

    fn clear() -> Candidate {
        Candidate::parse(3, "2024-06-01", "10:00", "11:00").unwrap()
    }

    #[test]
    fn only_checking_and_conflict_block_approval() {
        assert!(CheckStatus::Checking.blocks_approval());
        assert!(CheckStatus::Conflict("x".into()).blocks_approval());
        assert!(!CheckStatus::Available.blocks_approval());
        assert!(!CheckStatus::Unknown.blocks_approval());
        assert!(!CheckStatus::Idle.blocks_approval());
    }

    #[tokio::test]
    async fn run_publishes_outcome() {
        let probe = Probe::new(Arc::new(Club::new(Arc::new(StaticFeed::new(data())))));
        assert_eq!(probe.status(), CheckStatus::Idle);

        let status = probe.run(conflicting()).await.unwrap();
        assert_eq!(
            status,
            CheckStatus::Conflict("Conflicts with existing booking: 10:30-11:30".into())
        );
        assert_eq!(probe.status(), status);

        assert_eq!(probe.run(clear()).await, Some(CheckStatus::Available));
        assert_eq!(probe.status(), CheckStatus::Available);
    }

    #[tokio::test]
    async fn feed_failure_is_unknown_and_does_not_block() {
        let feed = Arc::new(StaticFeed::new(data()));
        feed.set_failing(true);
        let probe = Probe::new(Arc::new(Club::new(feed)));
        let status = probe.run(conflicting()).await.unwrap();
        assert_eq!(status, CheckStatus::Unknown);
        assert!(!probe.status().blocks_approval());
    }

    #[tokio::test]
    async fn superseded_run_never_overwrites_newer_status() {
        let (release, gate) = oneshot::channel();
        let feed = Arc::new(GatedFeed {
            inner: StaticFeed::new(data()),
            gate: Mutex::new(Some(gate)),
        });
        let probe = Arc::new(Probe::new(Arc::new(Club::new(feed))));
        let mut watcher = probe.subscribe();

        // The slow run takes the gate and parks on it.
        let slow = tokio::spawn({
            let probe = probe.clone();
            async move { probe.run(conflicting()).await }
        });
        watcher.changed().await.unwrap();
        assert_eq!(*watcher.borrow_and_update(), CheckStatus::Checking);

        // A newer run for a different candidate finishes first.
        assert_eq!(probe.run(clear()).await, Some(CheckStatus::Available));

        release.send(()).unwrap();
        assert_eq!(slow.await.unwrap(), None);
        assert_eq!(probe.status(), CheckStatus::Available);
    }

    #[tokio::test]
    async fn reset_makes_in_flight_run_stale() {
        let (release, gate) = oneshot::channel();
        let feed = Arc::new(GatedFeed {
            inner: StaticFeed::new(data()),
            gate: Mutex::new(Some(gate)),
        });
        let probe = Arc::new(Probe::new(Arc::new(Club::new(feed))));
        let mut watcher = probe.subscribe();

        let pending = tokio::spawn({
            let probe = probe.clone();
            async move { probe.run(conflicting()).await }
        });
        watcher.changed().await.unwrap();
        probe.reset();
        release.send(()).unwrap();

        assert_eq!(pending.await.unwrap(), None);
        assert_eq!(probe.status(), CheckStatus::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_runs_settle_on_a_final_outcome() {
        let probe = Arc::new(Probe::new(Arc::new(Club::new(Arc::new(StaticFeed::new(data()))))));
        let runs: Vec<_> = (0..64)
            .map(|i| {
                let probe = probe.clone();
                tokio::spawn(async move {
                    let candidate = Candidate::parse(3 + i % 2, "2024-06-01", "10:00", "11:00").unwrap();
                    probe.run(candidate).await
                })
            })
            .collect();
        let mut published = 0;
        for run in runs {
            if run.await.unwrap().is_some() {
                published += 1;
            }
        }
        assert!(published >= 1);
        assert_eq!(probe.status(), CheckStatus::Available);
    }
}
