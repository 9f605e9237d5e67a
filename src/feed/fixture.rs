use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::model::*;

use super::rows::{BlockRow, BookingRow, ClosureRow, RequestRow, ResourceRow, decode_rows};
use super::{BookingFeed, FeedError, PendingRequest, RawClosure};

/// Everything a [`StaticFeed`] serves.
#[derive(Debug, Clone, Default)]
pub struct FixtureData {
    pub resources: Vec<Resource>,
    pub bookings: Vec<BookingRecord>,
    pub blocks: Vec<BlockRecord>,
    pub closures: Vec<RawClosure>,
    pub requests: Vec<PendingRequest>,
}

/// On-disk fixture layout: the backend's own row shapes, one array per endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FixtureFile {
    resources: Vec<Value>,
    bookings: Vec<Value>,
    blocks: Vec<Value>,
    closures: Vec<Value>,
    requests: Vec<Value>,
}

impl From<FixtureFile> for FixtureData {
    fn from(file: FixtureFile) -> Self {
        FixtureData {
            resources: decode_rows::<ResourceRow>("resource", file.resources)
                .into_iter()
                .map(Resource::from)
                .collect(),
            bookings: decode_rows::<BookingRow>("booking", file.bookings)
                .into_iter()
                .filter_map(BookingRow::into_record)
                .collect(),
            blocks: decode_rows::<BlockRow>("availability block", file.blocks)
                .into_iter()
                .filter_map(BlockRow::into_record)
                .collect(),
            closures: decode_rows::<ClosureRow>("closure", file.closures)
                .into_iter()
                .filter_map(ClosureRow::into_raw)
                .collect(),
            requests: decode_rows::<RequestRow>("booking request", file.requests)
                .into_iter()
                .filter_map(RequestRow::into_pending)
                .collect(),
        }
    }
}

/// In-memory [`BookingFeed`]. Applies the same date and resource filters the
/// backend does, and can be switched into a failing mode to simulate outages.
#[derive(Debug, Default)]
pub struct StaticFeed {
    data: RwLock<FixtureData>,
    failing: AtomicBool,
}

impl StaticFeed {
    pub fn new(data: FixtureData) -> Self {
        Self {
            data: RwLock::new(data),
            failing: AtomicBool::new(false),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, FeedError> {
        let file: FixtureFile = serde_json::from_str(json)?;
        Ok(Self::new(file.into()))
    }

    pub fn load(path: &Path) -> Result<Self, FeedError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub async fn replace(&self, data: FixtureData) {
        *self.data.write().await = data;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn guard(&self, endpoint: &'static str) -> Result<(), FeedError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(FeedError::Status { endpoint, status: 503 });
        }
        Ok(())
    }
}

#[async_trait]
impl BookingFeed for StaticFeed {
    async fn resources(&self) -> Result<Vec<Resource>, FeedError> {
        self.guard("/api/resources")?;
        Ok(self.data.read().await.resources.clone())
    }

    async fn approved_bookings(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<BookingRecord>, FeedError> {
        self.guard("/api/approved-bookings")?;
        let data = self.data.read().await;
        Ok(data
            .bookings
            .iter()
            .filter(|b| from <= b.interval.date && b.interval.date <= to)
            .cloned()
            .collect())
    }

    async fn closures(&self) -> Result<Vec<RawClosure>, FeedError> {
        self.guard("/api/closures")?;
        Ok(self.data.read().await.closures.clone())
    }

    async fn availability_blocks(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        resource_id: Option<ResourceId>,
    ) -> Result<Vec<BlockRecord>, FeedError> {
        self.guard("/api/availability-blocks")?;
        let data = self.data.read().await;
        Ok(data
            .blocks
            .iter()
            .filter(|b| from <= b.interval.date && b.interval.date <= to)
            .filter(|b| resource_id.is_none_or(|id| b.resource_id == id))
            .cloned()
            .collect())
    }

    async fn pending_requests(&self) -> Result<Vec<PendingRequest>, FeedError> {
        self.guard("/api/booking-requests")?;
        Ok(self.data.read().await.requests.clone())
    }
}
