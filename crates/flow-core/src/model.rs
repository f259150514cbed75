//! # Loki Result Model
//!
//! The subset of Loki's `query_range` response that flow queries produce
//! (`resultType: "streams"`), plus the aggregated envelope handed back to
//! callers of the hub.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const RESULT_TYPE_STREAMS: &str = "streams";

/// A single log line. On the wire: `["<unix ns>", "<line>"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct Entry {
    pub timestamp: String,
    pub line: String,
}

impl Entry {
    pub fn new(timestamp: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            line: line.into(),
        }
    }
}

impl From<(String, String)> for Entry {
    fn from((timestamp, line): (String, String)) -> Self {
        Self { timestamp, line }
    }
}

impl From<Entry> for (String, String) {
    fn from(entry: Entry) -> Self {
        (entry.timestamp, entry.line)
    }
}

/// One Loki stream: a label set and its entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    #[serde(rename = "stream", default)]
    pub labels: BTreeMap<String, String>,
    #[serde(rename = "values", default)]
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponseData {
    #[serde(default = "default_result_type")]
    pub result_type: String,
    #[serde(default)]
    pub result: Vec<Stream>,
}

impl QueryResponseData {
    pub fn streams(result: Vec<Stream>) -> Self {
        Self {
            result_type: default_result_type(),
            result,
        }
    }
}

/// Raw body returned by Loki's `/loki/api/v1/query_range`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub status: String,
    pub data: QueryResponseData,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedStats {
    /// Number of Loki results merged into the response.
    pub num_queries: usize,
    /// Whether the entry cap stopped the merge.
    pub limit_reached: bool,
    pub total_entries: usize,
}

/// What the flows endpoint returns: merged streams plus merge statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedQueryResponse {
    pub result_type: String,
    pub result: Vec<Stream>,
    pub stats: AggregatedStats,
}

fn default_result_type() -> String {
    RESULT_TYPE_STREAMS.to_string()
}
