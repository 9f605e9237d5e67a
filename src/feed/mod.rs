//! The seam to the club backend.
//!
//! Every input a check needs is fetched through [`BookingFeed`]. The HTTP
//! implementation talks to the backend's REST API; [`StaticFeed`] serves
//! fixed data for tests, benches and offline runs.

mod fixture;
mod http;
mod rows;

pub use fixture::{FixtureData, StaticFeed};
pub use http::HttpFeed;
pub use rows::{BlockRow, BookingRow, ClosureRow, RequestRow, ResourceRow};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::*;

/// A booking request still waiting for staff review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub id: i64,
    pub resource_id: ResourceId,
    pub interval: TimeInterval,
    pub requester: String,
}

/// A closure as the backend stores it, before its areas are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawClosure {
    pub id: Option<i64>,
    pub title: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub window: Option<MinuteSpan>,
    pub affected_areas: String,
}

#[async_trait]
pub trait BookingFeed: Send + Sync {
    async fn resources(&self) -> Result<Vec<Resource>, FeedError>;

    /// Approved bookings with `from <= date <= to`.
    async fn approved_bookings(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<BookingRecord>, FeedError>;

    /// Active closures only.
    async fn closures(&self) -> Result<Vec<RawClosure>, FeedError>;

    async fn availability_blocks(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        resource_id: Option<ResourceId>,
    ) -> Result<Vec<BlockRecord>, FeedError>;

    /// Pending requests that have a resource assigned and valid times.
    async fn pending_requests(&self) -> Result<Vec<PendingRequest>, FeedError>;
}

#[derive(Debug)]
pub enum FeedError {
    /// Transport failure or timeout.
    Http(String),
    /// The backend answered with a non-success status.
    Status { endpoint: &'static str, status: u16 },
    /// The body was not the JSON shape we expect.
    Decode(String),
    Io(std::io::Error),
}

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedError::Http(e) => write!(f, "backend request failed: {e}"),
            FeedError::Status { endpoint, status } => write!(f, "backend {endpoint} returned HTTP {status}"),
            FeedError::Decode(e) => write!(f, "backend response could not be decoded: {e}"),
            FeedError::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl std::error::Error for FeedError {}

impl From<std::io::Error> for FeedError {
    fn from(e: std::io::Error) -> Self {
        FeedError::Io(e)
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::Decode(e.to_string())
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FeedError::Decode(e.to_string())
        } else {
            FeedError::Http(e.to_string())
        }
    }
}
