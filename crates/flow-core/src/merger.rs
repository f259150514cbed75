//! # Stream Merger
//!
//! Folds Loki results into one capped response. Streams are keyed by their
//! label set and entries are de-duplicated on `(labels, timestamp, line)`,
//! so OR-groups that overlap never count a flow twice.
//!
//! Ordering is best-effort: the merged result holds the first N entries in
//! the order batches were added, which under fan-out is completion order.
//! Nothing is sorted by timestamp.

use crate::model::{AggregatedQueryResponse, AggregatedStats, QueryResponseData, Stream, RESULT_TYPE_STREAMS};
use std::collections::{BTreeMap, HashMap, HashSet};

type Labels = BTreeMap<String, String>;

pub struct StreamMerger {
    /// Maximum merged entries (0 = unbounded).
    limit: usize,
    /// Label set -> position in `merged`.
    index: HashMap<Labels, usize>,
    seen: HashSet<(Labels, String, String)>,
    merged: Vec<Stream>,
    total_entries: usize,
    num_queries: usize,
}

impl StreamMerger {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            index: HashMap::new(),
            seen: HashSet::new(),
            merged: Vec::new(),
            total_entries: 0,
            num_queries: 0,
        }
    }

    /// Merge one batch. Returns `true` once the cap is reached; entries past
    /// the cap are discarded.
    pub fn add(&mut self, data: QueryResponseData) -> bool {
        self.num_queries += 1;

        'streams: for stream in data.result {
            let Stream { labels, entries } = stream;

            for entry in entries {
                if self.limit_reached() {
                    break 'streams;
                }
                if !self
                    .seen
                    .insert((labels.clone(), entry.timestamp.clone(), entry.line.clone()))
                {
                    continue;
                }

                let pos = match self.index.get(&labels) {
                    Some(pos) => *pos,
                    None => {
                        self.merged.push(Stream {
                            labels: labels.clone(),
                            entries: Vec::new(),
                        });
                        self.index.insert(labels.clone(), self.merged.len() - 1);
                        self.merged.len() - 1
                    }
                };
                self.merged[pos].entries.push(entry);
                self.total_entries += 1;
            }
        }

        self.limit_reached()
    }

    pub fn limit_reached(&self) -> bool {
        self.limit > 0 && self.total_entries >= self.limit
    }

    /// Number of merged entries so far.
    pub fn len(&self) -> usize {
        self.total_entries
    }

    pub fn is_empty(&self) -> bool {
        self.total_entries == 0
    }

    pub fn get(&self) -> AggregatedQueryResponse {
        AggregatedQueryResponse {
            result_type: RESULT_TYPE_STREAMS.to_string(),
            result: self.merged.clone(),
            stats: AggregatedStats {
                num_queries: self.num_queries,
                limit_reached: self.limit_reached(),
                total_entries: self.total_entries,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Entry;
    use std::collections::BTreeMap;

    fn stream(direction: &str, entries: &[(&str, &str)]) -> Stream {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "netobserv-flowcollector".to_string());
        labels.insert("FlowDirection".to_string(), direction.to_string());
        Stream {
            labels,
            entries: entries.iter().map(|(ts, line)| Entry::new(*ts, *line)).collect(),
        }
    }

    fn batch(offset: usize, count: usize) -> QueryResponseData {
        let entries: Vec<(String, String)> = (offset..offset + count)
            .map(|i| (i.to_string(), format!("flow-{i}")))
            .collect();
        let refs: Vec<(&str, &str)> = entries
            .iter()
            .map(|(ts, line)| (ts.as_str(), line.as_str()))
            .collect();
        QueryResponseData::streams(vec![stream("1", &refs)])
    }

    #[test]
    fn test_cap_holds_across_batches() {
        let mut merger = StreamMerger::new(10);
        assert!(!merger.add(batch(0, 5)));
        assert!(merger.add(batch(5, 5)));
        assert!(merger.add(batch(10, 5)));

        let response = merger.get();
        assert_eq!(response.stats.total_entries, 10);
        assert!(response.stats.limit_reached);
        assert_eq!(response.stats.num_queries, 3);
        let total: usize = response.result.iter().map(|s| s.entries.len()).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn test_cap_applies_inside_a_single_batch() {
        let mut merger = StreamMerger::new(3);
        assert!(merger.add(batch(0, 8)));
        assert_eq!(merger.len(), 3);
        assert_eq!(
            merger.get().result[0].entries.last(),
            Some(&Entry::new("2", "flow-2"))
        );
    }

    #[test]
    fn test_zero_limit_is_unbounded() {
        let mut merger = StreamMerger::new(0);
        merger.add(batch(0, 500));
        merger.add(batch(500, 500));
        assert_eq!(merger.len(), 1000);
        assert!(!merger.get().stats.limit_reached);
    }

    #[test]
    fn test_duplicates_across_groups_are_merged_once() {
        let mut merger = StreamMerger::new(0);
        merger.add(QueryResponseData::streams(vec![stream(
            "1",
            &[("1", "a"), ("2", "b")],
        )]));
        merger.add(QueryResponseData::streams(vec![stream(
            "1",
            &[("2", "b"), ("3", "c")],
        )]));

        let response = merger.get();
        assert_eq!(response.result.len(), 1);
        assert_eq!(
            response.result[0].entries,
            vec![Entry::new("1", "a"), Entry::new("2", "b"), Entry::new("3", "c")]
        );
    }

    #[test]
    fn test_same_line_in_other_stream_is_kept() {
        let mut merger = StreamMerger::new(0);
        merger.add(QueryResponseData::streams(vec![
            stream("1", &[("1", "a")]),
            stream("0", &[("1", "a")]),
        ]));
        let response = merger.get();
        assert_eq!(response.result.len(), 2);
        assert_eq!(response.stats.total_entries, 2);
    }

    #[test]
    fn test_label_values_with_separators_stay_distinct() {
        let labels = |pairs: &[(&str, &str)]| -> Labels {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };
        let mut merger = StreamMerger::new(0);
        merger.add(QueryResponseData::streams(vec![
            Stream {
                labels: labels(&[("a", "1,b=2")]),
                entries: vec![Entry::new("1", "x")],
            },
            Stream {
                labels: labels(&[("a", "1"), ("b", "2")]),
                entries: vec![Entry::new("1", "x")],
            },
        ]));

        let response = merger.get();
        assert_eq!(response.result.len(), 2);
        assert_eq!(response.stats.total_entries, 2);
        assert_eq!(response.result[0].labels, labels(&[("a", "1,b=2")]));
        assert_eq!(response.result[1].labels, labels(&[("a", "1"), ("b", "2")]));
    }

    #[test]
    fn test_arrival_order_is_preserved() {
        let mut merger = StreamMerger::new(0);
        merger.add(QueryResponseData::streams(vec![stream("0", &[("9", "late")])]));
        merger.add(QueryResponseData::streams(vec![stream("1", &[("1", "early")])]));
        let response = merger.get();
        assert_eq!(response.result[0].labels["FlowDirection"], "0");
        assert_eq!(response.result[1].labels["FlowDirection"], "1");
    }

    #[test]
    fn test_no_empty_streams_after_cap() {
        let mut merger = StreamMerger::new(1);
        merger.add(QueryResponseData::streams(vec![
            stream("1", &[("1", "a")]),
            stream("0", &[("2", "b")]),
        ]));
        assert_eq!(merger.get().result.len(), 1);
    }

    #[test]
    fn test_empty_merger() {
        let merger = StreamMerger::new(5);
        assert!(merger.is_empty());
        let response = merger.get();
        assert_eq!(response.result_type, "streams");
        assert!(response.result.is_empty());
        assert_eq!(response.stats, AggregatedStats::default());
    }
}
