use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::model::*;
use crate::observability::FEED_FAILURES_TOTAL;

use super::rows::{BlockRow, BookingRow, ClosureRow, RequestRow, ResourceRow, decode_rows};
use super::{BookingFeed, FeedError, PendingRequest, RawClosure};

/// [`BookingFeed`] backed by the club backend's REST API.
pub struct HttpFeed {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpFeed {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, FeedError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Fetch a JSON array and decode its rows one by one.
    async fn get<T: DeserializeOwned>(
        &self,
        kind: &'static str,
        endpoint: &'static str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, FeedError> {
        match self.fetch(endpoint, query).await {
            Ok(values) => Ok(decode_rows(kind, values)),
            Err(e) => {
                metrics::counter!(FEED_FAILURES_TOTAL, "endpoint" => endpoint).increment(1);
                Err(e)
            }
        }
    }

    async fn fetch(&self, endpoint: &'static str, query: &[(&str, String)]) -> Result<Vec<Value>, FeedError> {
        debug!(endpoint, "fetching from backend");
        let mut request = self.client.get(format!("{}{endpoint}", self.base_url)).query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }
        Ok(response.json::<Vec<Value>>().await?)
    }
}

fn date_range(from: NaiveDate, to: NaiveDate) -> Vec<(&'static str, String)> {
    vec![("start_date", from.to_string()), ("end_date", to.to_string())]
}

#[async_trait]
impl BookingFeed for HttpFeed {
    async fn resources(&self) -> Result<Vec<Resource>, FeedError> {
        let rows: Vec<ResourceRow> = self.get("resource", "/api/resources", &[]).await?;
        Ok(rows.into_iter().map(Resource::from).collect())
    }

    async fn approved_bookings(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<BookingRecord>, FeedError> {
        let rows: Vec<BookingRow> = self.get("booking", "/api/approved-bookings", &date_range(from, to)).await?;
        Ok(rows.into_iter().filter_map(BookingRow::into_record).collect())
    }

    async fn closures(&self) -> Result<Vec<RawClosure>, FeedError> {
        let rows: Vec<ClosureRow> = self.get("closure", "/api/closures", &[]).await?;
        Ok(rows.into_iter().filter_map(ClosureRow::into_raw).collect())
    }

    async fn availability_blocks(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        resource_id: Option<ResourceId>,
    ) -> Result<Vec<BlockRecord>, FeedError> {
        let mut query = date_range(from, to);
        if let Some(id) = resource_id {
            query.push(("bay_id", id.to_string()));
        }
        let rows: Vec<BlockRow> = self.get("availability block", "/api/availability-blocks", &query).await?;
        Ok(rows.into_iter().filter_map(BlockRow::into_record).collect())
    }

    async fn pending_requests(&self) -> Result<Vec<PendingRequest>, FeedError> {
        let query = [("status", "pending".to_string()), ("include_all", "true".to_string())];
        let rows: Vec<RequestRow> = self.get("booking request", "/api/booking-requests", &query).await?;
        Ok(rows.into_iter().filter_map(RequestRow::into_pending).collect())
    }
}
