//! # Flow Query Parameters
//!
//! Extracts what the query builder needs from the inbound query string.
//! Empty parameter values are treated as absent.

use crate::filters::{parse_filters, FilterGroup};
use crate::FlowError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub const START_TIME_KEY: &str = "startTime";
pub const END_TIME_KEY: &str = "endTime";
pub const TIME_RANGE_KEY: &str = "timeRange";
pub const LIMIT_KEY: &str = "limit";
pub const REPORTER_KEY: &str = "reporter";
pub const FILTERS_KEY: &str = "filters";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowParams {
    /// Unix seconds, or empty when unbounded.
    pub start: String,
    pub end: String,
    /// Limit as received, embedded verbatim in the Loki query.
    pub limit: String,
    /// Limit enforced by the merger (0 = unbounded).
    pub limit_count: usize,
    pub reporter: String,
    pub filter_groups: Vec<FilterGroup>,
}

impl FlowParams {
    pub fn from_query(
        params: &HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<Self, FlowError> {
        let start = start_time(params, now)?;
        let (limit, limit_count) = limit(params)?;
        let filter_groups = parse_filters(get(params, FILTERS_KEY).unwrap_or_default())?;

        Ok(Self {
            start,
            end: get(params, END_TIME_KEY).unwrap_or_default().to_string(),
            limit,
            limit_count,
            reporter: get(params, REPORTER_KEY).unwrap_or_default().to_string(),
            filter_groups,
        })
    }
}

/// `startTime` wins; otherwise `now - timeRange` when a range is given.
pub fn start_time(params: &HashMap<String, String>, now: DateTime<Utc>) -> Result<String, FlowError> {
    if let Some(start) = get(params, START_TIME_KEY) {
        return Ok(start.to_string());
    }
    match get(params, TIME_RANGE_KEY) {
        Some(range) => {
            let seconds: i64 = range
                .parse()
                .map_err(|e| FlowError::Parse(format!("Could not parse time range: {e}")))?;
            now.timestamp()
                .checked_sub(seconds)
                .map(|start| start.to_string())
                .ok_or_else(|| FlowError::Parse("Could not parse time range: out of range".into()))
        }
        None => Ok(String::new()),
    }
}

/// Returns the limit as received and as a count for the merger.
pub fn limit(params: &HashMap<String, String>) -> Result<(String, usize), FlowError> {
    match get(params, LIMIT_KEY) {
        Some(raw) => {
            let count: usize = raw
                .parse()
                .map_err(|e| FlowError::Parse(format!("Could not parse limit: {e}")))?;
            Ok((raw.to_string(), count))
        }
        None => Ok((String::new(), 0)),
    }
}

fn get<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}
