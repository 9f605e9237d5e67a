//! The club context: where backend data meets the pure checker.
//!
//! Every call fetches fresh inputs through the [`BookingFeed`], builds a
//! [`Snapshot`] and hands it to the engine. Nothing is cached between calls.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::areas::resolve_affected_areas;
use crate::engine::{self, BusinessHours, EngineError, SlotQuery, Snapshot};
use crate::feed::{BookingFeed, FeedError, RawClosure};
use crate::limits::DEFAULT_CONFERENCE_ROOM_ID;
use crate::model::*;
use crate::observability::{CHECKS_TOTAL, CHECK_DURATION_SECONDS};

#[derive(Debug)]
pub enum ClubError {
    Engine(EngineError),
    Feed(FeedError),
}

impl std::fmt::Display for ClubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClubError::Engine(e) => write!(f, "{e}"),
            ClubError::Feed(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ClubError {}

impl From<EngineError> for ClubError {
    fn from(e: EngineError) -> Self {
        ClubError::Engine(e)
    }
}

impl From<FeedError> for ClubError {
    fn from(e: FeedError) -> Self {
        ClubError::Feed(e)
    }
}

pub struct Club {
    feed: Arc<dyn BookingFeed>,
    conference_room_id: ResourceId,
    hours: BusinessHours,
    /// Fixed "now" for tests; `None` reads the process-local clock.
    clock: Option<NaiveDateTime>,
}

impl Club {
    pub fn new(feed: Arc<dyn BookingFeed>) -> Self {
        Self {
            feed,
            conference_room_id: DEFAULT_CONFERENCE_ROOM_ID,
            hours: BusinessHours::default(),
            clock: None,
        }
    }

    #[must_use]
    pub fn with_conference_room(mut self, id: ResourceId) -> Self {
        self.conference_room_id = id;
        self
    }

    #[must_use]
    pub fn with_hours(mut self, hours: BusinessHours) -> Self {
        self.hours = hours;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, now: NaiveDateTime) -> Self {
        self.clock = Some(now);
        self
    }

    pub fn feed(&self) -> &Arc<dyn BookingFeed> {
        &self.feed
    }

    pub fn hours(&self) -> &BusinessHours {
        &self.hours
    }

    /// Club-local wall-clock time.
    pub fn now(&self) -> NaiveDateTime {
        self.clock.unwrap_or_else(|| Local::now().naive_local())
    }

    pub async fn catalog(&self) -> Result<Catalog, FeedError> {
        let resources = self.feed.resources().await?;
        Ok(Catalog::new(resources, self.conference_room_id))
    }

    /// Fetch every input covering `from..=to`, concurrently.
    ///
    /// `resource` narrows the availability-block request only; bookings and
    /// closures are always fetched in full for the range.
    pub async fn snapshot(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        resource: Option<ResourceId>,
    ) -> Result<Snapshot, FeedError> {
        let (resources, bookings, blocks, raw_closures) = tokio::try_join!(
            self.feed.resources(),
            self.feed.approved_bookings(from, to),
            self.feed.availability_blocks(from, to, resource),
            self.feed.closures(),
        )?;
        let catalog = Catalog::new(resources, self.conference_room_id);
        let closures = raw_closures
            .into_iter()
            .filter(|c| c.start_date <= to && from <= c.end_date)
            .map(|c| resolve_closure(c, &catalog))
            .collect();
        debug!(%from, %to, "snapshot fetched");
        Ok(Snapshot::new(bookings, blocks, closures))
    }

    /// Fetch, then check one candidate.
    pub async fn check(&self, candidate: &Candidate) -> Result<AvailabilityResult, FeedError> {
        let start = std::time::Instant::now();
        let date = candidate.interval.date;
        let result = self
            .snapshot(date, date, Some(candidate.resource_id))
            .await
            .map(|snapshot| snapshot.check(candidate));

        let outcome = match &result {
            Ok(AvailabilityResult::Available) => "available",
            Ok(AvailabilityResult::Conflict { kind, .. }) => kind.as_str(),
            Err(_) => "unknown",
        };
        metrics::counter!(CHECKS_TOTAL, "outcome" => outcome).increment(1);
        metrics::histogram!(CHECK_DURATION_SECONDS).record(start.elapsed().as_secs_f64());
        result
    }

    pub async fn slots(&self, resource_id: ResourceId, date: NaiveDate, duration: Minute) -> Result<Vec<Slot>, ClubError> {
        let query = SlotQuery::new(resource_id, date)
            .with_duration(duration)
            .at(self.now());
        let snapshot = self.snapshot(date, date, Some(resource_id)).await?;
        Ok(engine::slot_grid(&query, &self.hours, &snapshot)?)
    }

    pub async fn free_windows(
        &self,
        resource_id: ResourceId,
        date: NaiveDate,
        min_duration: Option<Minute>,
    ) -> Result<Vec<MinuteSpan>, FeedError> {
        let snapshot = self.snapshot(date, date, Some(resource_id)).await?;
        Ok(engine::free_windows(resource_id, date, &self.hours, &snapshot, min_duration))
    }

    /// Active closures with their affected areas resolved; only those covering
    /// `date` when one is given.
    pub async fn closures_on(&self, date: Option<NaiveDate>) -> Result<Vec<ClosureRecord>, FeedError> {
        let (catalog, raw) = tokio::try_join!(self.catalog(), self.feed.closures())?;
        Ok(raw
            .into_iter()
            .map(|c| resolve_closure(c, &catalog))
            .filter(|c| date.is_none_or(|d| c.covers_date(d)))
            .collect())
    }

    pub async fn resources(&self) -> Result<Vec<Resource>, FeedError> {
        self.feed.resources().await
    }

    pub async fn resolve_areas(&self, raw: &str) -> Result<BTreeSet<ResourceId>, FeedError> {
        let catalog = self.catalog().await?;
        Ok(resolve_affected_areas(raw, &catalog))
    }
}

fn resolve_closure(raw: RawClosure, catalog: &Catalog) -> ClosureRecord {
    ClosureRecord {
        affected: resolve_affected_areas(&raw.affected_areas, catalog),
        id: raw.id,
        title: raw.title,
        start_date: raw.start_date,
        end_date: raw.end_date,
        window: raw.window,
    }
}
