//! Decoding of a closure's `affectedAreas` descriptor.
//!
//! The backend stores the affected-resource set of a closure as a string in
//! one of six shapes. They are all decoded here into [`AffectedAreas`] and
//! resolved against a [`Catalog`]; nothing else in the crate looks at the raw
//! string. Decoding never fails: anything unrecognised resolves to the empty
//! set, so an unreadable closure never blocks a booking.

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::str::FromStr;

use serde_json::Value;

use crate::limits::{MAX_AFFECTED_AREAS_LEN, MAX_AREA_TOKENS};
use crate::model::{Catalog, ResourceId};

const ENTIRE_FACILITY: &str = "entire_facility";
const ALL_BAYS: &str = "all_bays";
const CONFERENCE_ROOM: &str = "conference_room";
const BAY_PREFIX: &str = "bay_";

/// One element of a list or JSON-array descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaToken {
    Resource(ResourceId),
    ConferenceRoom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AffectedAreas {
    /// `entire_facility`
    EntireFacility,
    /// `all_bays`: every simulator.
    AllBays,
    /// `conference_room`
    ConferenceRoom,
    /// `bay_<id>`
    Bay(ResourceId),
    /// `bay_1,bay_2,conference_room,7`
    List(Vec<AreaToken>),
    /// `[1, "bay_2", "conference_room"]`
    Json(Vec<AreaToken>),
    /// Anything else. Resolves to no resources.
    Unrecognized,
}

impl AffectedAreas {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.len() > MAX_AFFECTED_AREAS_LEN {
            return AffectedAreas::Unrecognized;
        }

        match raw {
            ENTIRE_FACILITY => return AffectedAreas::EntireFacility,
            ALL_BAYS => return AffectedAreas::AllBays,
            CONFERENCE_ROOM => return AffectedAreas::ConferenceRoom,
            _ => {}
        }

        if raw.starts_with('[') {
            return parse_json_array(raw);
        }

        if raw.contains(',') {
            let tokens: Vec<AreaToken> = raw
                .split(',')
                .take(MAX_AREA_TOKENS)
                .filter_map(parse_token)
                .collect();
            return AffectedAreas::List(tokens);
        }

        match parse_bay(raw) {
            Some(id) => AffectedAreas::Bay(id),
            None => AffectedAreas::Unrecognized,
        }
    }

    /// Resolve to concrete resource ids. Ids in explicit lists are taken as-is,
    /// even when the catalog does not know them.
    pub fn resolve(&self, catalog: &Catalog) -> BTreeSet<ResourceId> {
        match self {
            AffectedAreas::EntireFacility => catalog.all_ids(),
            AffectedAreas::AllBays => catalog.simulator_ids(),
            AffectedAreas::ConferenceRoom => BTreeSet::from([catalog.conference_room_id]),
            AffectedAreas::Bay(id) => BTreeSet::from([*id]),
            AffectedAreas::List(tokens) | AffectedAreas::Json(tokens) => tokens
                .iter()
                .map(|token| match token {
                    AreaToken::Resource(id) => *id,
                    AreaToken::ConferenceRoom => catalog.conference_room_id,
                })
                .collect(),
            AffectedAreas::Unrecognized => BTreeSet::new(),
        }
    }
}

impl FromStr for AffectedAreas {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Shorthand for `AffectedAreas::parse(raw).resolve(catalog)`.
pub fn resolve_affected_areas(raw: &str, catalog: &Catalog) -> BTreeSet<ResourceId> {
    AffectedAreas::parse(raw).resolve(catalog)
}

fn parse_json_array(raw: &str) -> AffectedAreas {
    let Ok(Value::Array(items)) = serde_json::from_str::<Value>(raw) else {
        return AffectedAreas::Unrecognized;
    };
    let tokens = items
        .iter()
        .take(MAX_AREA_TOKENS)
        .filter_map(|item| match item {
            Value::Number(n) => n.as_i64().map(AreaToken::Resource),
            Value::String(s) => parse_token(s),
            _ => None,
        })
        .collect();
    AffectedAreas::Json(tokens)
}

fn parse_token(raw: &str) -> Option<AreaToken> {
    let raw = raw.trim();
    if raw == CONFERENCE_ROOM {
        return Some(AreaToken::ConferenceRoom);
    }
    parse_bay(raw)
        .or_else(|| raw.parse().ok())
        .map(AreaToken::Resource)
}

fn parse_bay(raw: &str) -> Option<ResourceId> {
    raw.strip_prefix(BAY_PREFIX)?.trim().parse().ok()
}
