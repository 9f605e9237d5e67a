//! JSON rows as the backend serves them, and their conversion into records.
//!
//! Conversion is per row and lossy on purpose: a row that does not parse is
//! logged and dropped so one bad record never fails a whole check.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::limits::MINUTES_PER_DAY;
use crate::model::*;

use super::{PendingRequest, RawClosure};

const DEFAULT_CLOSURE_TITLE: &str = "Facility Closure";

/// Decode each element of a JSON array on its own, skipping the ones whose
/// shape does not match `T`.
pub fn decode_rows<T: DeserializeOwned>(kind: &'static str, values: Vec<Value>) -> Vec<T> {
    values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(row) => Some(row),
            Err(e) => {
                warn!(index, "skipping malformed {kind} row: {e}");
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRow {
    pub id: ResourceId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl From<ResourceRow> for Resource {
    fn from(row: ResourceRow) -> Self {
        Resource {
            id: row.id,
            name: row.name,
            kind: ResourceKind::from_backend(row.kind.as_deref().unwrap_or("")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRow {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub bay_id: Option<ResourceId>,
    pub request_date: String,
    pub start_time: String,
    pub end_time: String,
}

impl BookingRow {
    pub fn into_record(self) -> Option<BookingRecord> {
        let Some(resource_id) = self.bay_id else {
            return None;
        };
        match TimeInterval::parse(&self.request_date, &self.start_time, &self.end_time) {
            Ok(interval) => Some(BookingRecord {
                id: self.id,
                resource_id,
                interval,
            }),
            Err(e) => {
                warn!(id = ?self.id, "skipping booking row: {e}");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRow {
    #[serde(default)]
    pub id: Option<i64>,
    pub bay_id: ResourceId,
    pub block_date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub block_type: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl BlockRow {
    pub fn into_record(self) -> Option<BlockRecord> {
        match TimeInterval::parse(&self.block_date, &self.start_time, &self.end_time) {
            Ok(interval) => Some(BlockRecord {
                id: self.id,
                resource_id: self.bay_id,
                interval,
                block_type: self.block_type.unwrap_or_else(|| "blocked".into()),
                notes: self.notes,
            }),
            Err(e) => {
                warn!(id = ?self.id, "skipping availability block row: {e}");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosureRow {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    pub start_date: String,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub affected_areas: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl ClosureRow {
    /// `None` for inactive or malformed rows.
    pub fn into_raw(self) -> Option<RawClosure> {
        if !self.is_active {
            return None;
        }
        let converted = (|| {
            let start_date = parse_date(&self.start_date)?;
            let end_date = match self.end_date.as_deref() {
                Some(raw) => parse_date(raw)?,
                None => start_date,
            };
            let window = match (self.start_time.as_deref(), self.end_time.as_deref()) {
                (None, None) => None,
                (start, end) => {
                    let start = start.map(parse_clock).transpose()?.unwrap_or(0);
                    let end = end.map(parse_clock).transpose()?.unwrap_or(MINUTES_PER_DAY);
                    Some(MinuteSpan::try_new(start, end)?)
                }
            };
            Ok::<_, crate::engine::EngineError>((start_date, end_date, window))
        })();

        match converted {
            Ok((start_date, end_date, window)) => Some(RawClosure {
                id: self.id,
                title: self
                    .title
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_CLOSURE_TITLE.into()),
                start_date,
                end_date,
                window,
                affected_areas: self.affected_areas.unwrap_or_default(),
            }),
            Err(e) => {
                warn!(id = ?self.id, "skipping closure row: {e}");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRow {
    pub id: i64,
    #[serde(default)]
    pub bay_id: Option<ResourceId>,
    pub request_date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl RequestRow {
    /// Only pending requests with an assigned bay and valid times survive.
    pub fn into_pending(self) -> Option<PendingRequest> {
        if self.status.as_deref().is_some_and(|s| s != "pending") {
            return None;
        }
        let resource_id = self.bay_id?;
        let interval = match TimeInterval::parse(&self.request_date, &self.start_time, &self.end_time) {
            Ok(interval) => interval,
            Err(e) => {
                warn!(id = self.id, "skipping booking request: {e}");
                return None;
            }
        };
        let requester = self
            .user_name
            .filter(|n| !n.trim().is_empty())
            .or(self.user_email)
            .unwrap_or_default();
        Some(PendingRequest {
            id: self.id,
            resource_id,
            interval,
            requester,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closure_row(json: &str) -> ClosureRow {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn booking_row_with_seconds_and_timestamp_date() {
        let row: BookingRow = serde_json::from_str(
            r#"{"id": 4, "bay_id": 2, "request_date": "2024-06-01T00:00:00.000Z",
                "start_time": "10:30:00", "end_time": "11:30:00", "user_name": "Sam"}"#,
        )
        .unwrap();
        let record = row.into_record().unwrap();
        assert_eq!(record.id, Some(4));
        assert_eq!(record.resource_id, 2);
        assert_eq!(record.interval.to_string(), "2024-06-01 10:30-11:30");
    }

    #[test]
    fn booking_row_without_bay_or_with_bad_times_is_dropped() {
        let no_bay: BookingRow = serde_json::from_str(
            r#"{"bay_id": null, "request_date": "2024-06-01", "start_time": "10:00", "end_time": "11:00"}"#,
        )
        .unwrap();
        assert!(no_bay.into_record().is_none());

        let inverted: BookingRow = serde_json::from_str(
            r#"{"bay_id": 1, "request_date": "2024-06-01", "start_time": "11:00", "end_time": "10:00"}"#,
        )
        .unwrap();
        assert!(inverted.into_record().is_none());
    }

    #[test]
    fn closure_row_defaults() {
        let raw = closure_row(r#"{"id": 1, "startDate": "2024-07-04", "affectedAreas": "all_bays"}"#)
            .into_raw()
            .unwrap();
        assert_eq!(raw.title, "Facility Closure");
        assert_eq!(raw.end_date, raw.start_date);
        assert_eq!(raw.window, None);
        assert_eq!(raw.affected_areas, "all_bays");
    }

    #[test]
    fn closure_row_with_one_bound_fills_the_other() {
        let raw = closure_row(r#"{"title": "Late event", "startDate": "2024-07-04", "startTime": "18:00:00"}"#)
            .into_raw()
            .unwrap();
        assert_eq!(raw.window, Some(MinuteSpan::new(18 * 60, MINUTES_PER_DAY)));

        let raw = closure_row(r#"{"title": "Early", "startDate": "2024-07-04", "endTime": "09:00"}"#)
            .into_raw()
            .unwrap();
        assert_eq!(raw.window, Some(MinuteSpan::new(0, 9 * 60)));
    }

    #[test]
    fn inactive_closure_is_dropped() {
        let row = closure_row(r#"{"startDate": "2024-07-04", "isActive": false}"#);
        assert!(row.into_raw().is_none());
    }

    #[test]
    fn request_row_requires_bay_and_pending_status() {
        let row: RequestRow = serde_json::from_str(
            r#"{"id": 9, "bay_id": 3, "request_date": "2024-06-01", "start_time": "09:00",
                "end_time": "10:00", "user_name": "", "user_email": "a@club.test", "status": "pending"}"#,
        )
        .unwrap();
        let pending = row.into_pending().unwrap();
        assert_eq!(pending.requester, "a@club.test");
        assert_eq!(pending.resource_id, 3);

        let approved: RequestRow = serde_json::from_str(
            r#"{"id": 10, "bay_id": 3, "request_date": "2024-06-01", "start_time": "09:00",
                "end_time": "10:00", "status": "approved"}"#,
        )
        .unwrap();
        assert!(approved.into_pending().is_none());

        let unassigned: RequestRow = serde_json::from_str(
            r#"{"id": 11, "request_date": "2024-06-01", "start_time": "09:00", "end_time": "10:00"}"#,
        )
        .unwrap();
        assert!(unassigned.into_pending().is_none());
    }

    #[test]
    fn malformed_row_does_not_sink_its_neighbours() {
        let values: Vec<Value> = serde_json::from_str(
            r#"[
                {"id": 1, "bay_id": 2, "request_date": "2024-06-01", "start_time": "10:00", "end_time": "11:00"},
                {"id": 2, "bay_id": 2, "request_date": "2024-06-01", "start_time": null, "end_time": "12:00"},
                {"id": 3, "bay_id": "two", "request_date": "2024-06-01", "start_time": "13:00", "end_time": "14:00"}
            ]"#,
        )
        .unwrap();
        let rows: Vec<BookingRow> = decode_rows("booking", values);
        assert_eq!(rows.len(), 1);
        let record = rows.into_iter().next().and_then(BookingRow::into_record).unwrap();
        assert_eq!(record.id, Some(1));
    }
}
