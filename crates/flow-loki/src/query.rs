//! # Flow Query Builder
//!
//! Builds one Loki `query_range` URL for one AND-group of filters.
//!
//! ```text
//! {app="netobserv-flowcollector",FlowDirection="1",SrcK8S_Namespace=~`(?i:.*prod.*)`}
//!   |~`"DstPort":(?:80|443)[,}]`
//!   |json|DstAddr=ip("10.0.0.1")
//! ```
//!
//! Filter values are comma-separated alternatives. A value wrapped in double
//! quotes matches exactly; anything else is a case-insensitive substring
//! match where `*` is a wildcard.

use crate::config::LokiConfig;
use flow_core::{Filter, FlowError, FlowParams};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

const APP_LABEL: &str = "app";
const APP_LABEL_VALUE: &str = "netobserv-flowcollector";
const FLOW_DIRECTION: &str = "FlowDirection";
const QUERY_RANGE_PATH: &str = "loki/api/v1/query_range";

pub const REPORTER_SOURCE: &str = "source";
pub const REPORTER_DESTINATION: &str = "destination";

const IP_FIELDS: &[&str] = &["SrcAddr", "DstAddr", "SrcHostIP", "DstHostIP"];
const NUMERIC_FIELDS: &[&str] = &["SrcPort", "DstPort", "Proto", "FlowDirection", "Packets", "Bytes"];

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("key pattern compiles"))
}

fn value_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"^[\w\-.,"*:/'()]+$"#).expect("value pattern compiles"))
}

/// Stream selector matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LabelMatcher {
    Exact { key: String, value: String },
    Regex { key: String, pattern: String },
}

impl fmt::Display for LabelMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact { key, value } => write!(f, "{key}=\"{value}\""),
            Self::Regex { key, pattern } => write!(f, "{key}=~`{pattern}`"),
        }
    }
}

/// One filter alternative, quotes already stripped. Quotes are only legal
/// as a wrapping pair.
enum Alternative<'v> {
    Exact(&'v str),
    Fuzzy(&'v str),
}

impl<'v> Alternative<'v> {
    fn parse(raw: &'v str) -> Result<Self, FlowError> {
        let alternative = match raw.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
            Some(inner) => Self::Exact(inner),
            None => Self::Fuzzy(raw),
        };
        if alternative.value().contains('"') {
            return Err(FlowError::QueryBuild(format!(
                "misplaced quote in filter value: {raw}"
            )));
        }
        Ok(alternative)
    }

    fn value(&self) -> &'v str {
        match self {
            Self::Exact(v) | Self::Fuzzy(v) => *v,
        }
    }
}

pub struct FlowQueryBuilder<'a> {
    config: &'a LokiConfig,
    start: String,
    end: String,
    limit: String,
    labels: Vec<LabelMatcher>,
    line_filters: Vec<String>,
    ip_filters: Vec<String>,
}

impl<'a> FlowQueryBuilder<'a> {
    /// Base query for the time range, limit and reporter in `params`; filter
    /// groups are added separately through [`FlowQueryBuilder::filters`].
    pub fn new(config: &'a LokiConfig, params: &FlowParams) -> Self {
        let mut labels = vec![LabelMatcher::Exact {
            key: APP_LABEL.into(),
            value: APP_LABEL_VALUE.into(),
        }];
        let direction = match params.reporter.as_str() {
            REPORTER_SOURCE => Some("1"),
            REPORTER_DESTINATION => Some("0"),
            _ => None,
        };
        if let Some(direction) = direction {
            labels.push(LabelMatcher::Exact {
                key: FLOW_DIRECTION.into(),
                value: direction.into(),
            });
        }

        Self {
            config,
            start: params.start.clone(),
            end: params.end.clone(),
            limit: params.limit.clone(),
            labels,
            line_filters: Vec::new(),
            ip_filters: Vec::new(),
        }
    }

    /// AND every filter of `group` into the query.
    pub fn filters(&mut self, group: &[Filter]) -> Result<(), FlowError> {
        group
            .iter()
            .try_for_each(|filter| self.add_filter(&filter.key, &filter.value))
    }

    pub fn add_filter(&mut self, key: &str, joined_values: &str) -> Result<(), FlowError> {
        if !key_pattern().is_match(key) {
            return Err(FlowError::QueryBuild(format!("invalid filter key: {key}")));
        }
        if !value_pattern().is_match(joined_values) {
            return Err(FlowError::QueryBuild(format!(
                "unauthorized sign in flows request: {joined_values}"
            )));
        }

        let alternatives = joined_values
            .split(',')
            .filter(|v| !v.is_empty())
            .map(Alternative::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if alternatives.is_empty() {
            return Err(FlowError::QueryBuild(format!("no value for filter key: {key}")));
        }

        if self.config.is_label(key) {
            self.add_label_filter(key, &alternatives);
        } else if IP_FIELDS.contains(&key) {
            self.add_ip_filter(key, &alternatives);
        } else if NUMERIC_FIELDS.contains(&key) {
            self.add_numeric_line_filter(key, &alternatives)?;
        } else {
            self.add_string_line_filter(key, &alternatives);
        }
        Ok(())
    }

    fn add_label_filter(&mut self, key: &str, alternatives: &[Alternative]) {
        if let [Alternative::Exact(value)] = alternatives {
            self.labels.push(LabelMatcher::Exact {
                key: key.into(),
                value: (*value).into(),
            });
            return;
        }
        let pattern = alternatives
            .iter()
            .map(|alt| match alt {
                Alternative::Exact(v) => regex::escape(v),
                Alternative::Fuzzy(v) => format!("(?i:.*{}.*)", wildcard(v, ".*")),
            })
            .collect::<Vec<_>>()
            .join("|");
        self.labels.push(LabelMatcher::Regex {
            key: key.into(),
            pattern,
        });
    }

    fn add_ip_filter(&mut self, key: &str, alternatives: &[Alternative]) {
        let filter = alternatives
            .iter()
            .map(|alt| format!("{key}=ip(\"{}\")", alt.value()))
            .collect::<Vec<_>>()
            .join(" or ");
        self.ip_filters.push(filter);
    }

    fn add_numeric_line_filter(
        &mut self,
        key: &str,
        alternatives: &[Alternative],
    ) -> Result<(), FlowError> {
        let mut numbers = Vec::with_capacity(alternatives.len());
        for alt in alternatives {
            let value = alt.value();
            if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
                return Err(FlowError::QueryBuild(format!(
                    "{key} expects numeric values, got: {value}"
                )));
            }
            numbers.push(value);
        }
        self.line_filters
            .push(format!("\"{key}\":(?:{})[,}}]", numbers.join("|")));
        Ok(())
    }

    fn add_string_line_filter(&mut self, key: &str, alternatives: &[Alternative]) {
        let pattern = alternatives
            .iter()
            .map(|alt| match alt {
                Alternative::Exact(v) => regex::escape(v),
                Alternative::Fuzzy(v) => format!("(?i:[^\"]*{}[^\"]*)", wildcard(v, "[^\"]*")),
            })
            .collect::<Vec<_>>()
            .join("|");
        self.line_filters
            .push(format!("\"{key}\":\"(?:{pattern})\""));
    }

    /// The LogQL expression alone.
    pub fn logql(&self) -> String {
        let selector = self
            .labels
            .iter()
            .map(LabelMatcher::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let mut query = format!("{{{selector}}}");
        for filter in &self.line_filters {
            query.push_str("|~`");
            query.push_str(filter);
            query.push('`');
        }
        if !self.ip_filters.is_empty() {
            query.push_str("|json");
            for filter in &self.ip_filters {
                query.push('|');
                query.push_str(filter);
            }
        }
        query
    }

    /// Full `query_range` URL.
    pub fn build(&self) -> String {
        let mut url = format!(
            "{}{}?query={}",
            self.config.base_url(),
            QUERY_RANGE_PATH,
            encode(&self.logql())
        );
        for (name, value) in [("start", &self.start), ("end", &self.end), ("limit", &self.limit)] {
            if !value.is_empty() {
                url.push_str(&format!("&{name}={}", encode(value)));
            }
        }
        url
    }
}

/// Escapes `value` for a regex, turning `*` into `any`.
fn wildcard(value: &str, any: &str) -> String {
    regex::escape(value).replace(r"\*", any)
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use percent_encoding::percent_decode_str;

    fn params(reporter: &str) -> FlowParams {
        FlowParams {
            start: "1700000000".into(),
            end: "1700000300".into(),
            limit: "100".into(),
            limit_count: 100,
            reporter: reporter.into(),
            filter_groups: vec![],
        }
    }

    fn logql_for(filters: &[(&str, &str)]) -> Result<String, FlowError> {
        let cfg = LokiConfig::default();
        let mut qb = FlowQueryBuilder::new(&cfg, &params(""));
        let group: Vec<Filter> = filters.iter().map(|(k, v)| Filter::new(*k, *v)).collect();
        qb.filters(&group)?;
        Ok(qb.logql())
    }

    #[test]
    fn test_base_selector() {
        assert_eq!(logql_for(&[]).unwrap(), r#"{app="netobserv-flowcollector"}"#);
    }

    #[test]
    fn test_reporter_selects_flow_direction() {
        let cfg = LokiConfig::default();
        let source = FlowQueryBuilder::new(&cfg, &params("source")).logql();
        assert_eq!(source, r#"{app="netobserv-flowcollector",FlowDirection="1"}"#);
        let destination = FlowQueryBuilder::new(&cfg, &params("destination")).logql();
        assert_eq!(destination, r#"{app="netobserv-flowcollector",FlowDirection="0"}"#);
        let both = FlowQueryBuilder::new(&cfg, &params("both")).logql();
        assert_eq!(both, r#"{app="netobserv-flowcollector"}"#);
    }

    #[test]
    fn test_label_fuzzy_match() {
        assert_eq!(
            logql_for(&[("SrcK8S_Namespace", "netobserv")]).unwrap(),
            "{app=\"netobserv-flowcollector\",SrcK8S_Namespace=~`(?i:.*netobserv.*)`}"
        );
    }

    #[test]
    fn test_label_exact_match() {
        assert_eq!(
            logql_for(&[("DstK8S_Namespace", "\"default\"")]).unwrap(),
            "{app=\"netobserv-flowcollector\",DstK8S_Namespace=\"default\"}"
        );
    }

    #[test]
    fn test_label_alternatives() {
        assert_eq!(
            logql_for(&[("SrcK8S_OwnerName", "\"api\",web*")]).unwrap(),
            "{app=\"netobserv-flowcollector\",SrcK8S_OwnerName=~`api|(?i:.*web.*.*)`}"
        );
    }

    #[test]
    fn test_numeric_line_filter() {
        assert_eq!(
            logql_for(&[("DstPort", "80,443")]).unwrap(),
            "{app=\"netobserv-flowcollector\"}|~`\"DstPort\":(?:80|443)[,}]`"
        );
    }

    #[test]
    fn test_numeric_field_rejects_text() {
        assert!(matches!(
            logql_for(&[("SrcPort", "http")]),
            Err(FlowError::QueryBuild(_))
        ));
    }

    #[test]
    fn test_string_line_filter() {
        assert_eq!(
            logql_for(&[("SrcK8S_Name", "ingress")]).unwrap(),
            "{app=\"netobserv-flowcollector\"}|~`\"SrcK8S_Name\":\"(?:(?i:[^\"]*ingress[^\"]*))\"`"
        );
        assert_eq!(
            logql_for(&[("SrcK8S_Name", "\"ingress\"")]).unwrap(),
            "{app=\"netobserv-flowcollector\"}|~`\"SrcK8S_Name\":\"(?:ingress)\"`"
        );
    }

    #[test]
    fn test_ip_filters_go_through_json_stage() {
        assert_eq!(
            logql_for(&[("DstAddr", "10.0.0.1,10.0.0.2"), ("SrcPort", "53")]).unwrap(),
            "{app=\"netobserv-flowcollector\"}|~`\"SrcPort\":(?:53)[,}]`|json|DstAddr=ip(\"10.0.0.1\") or DstAddr=ip(\"10.0.0.2\")"
        );
    }

    #[test]
    fn test_unauthorized_characters_are_rejected() {
        let err = logql_for(&[("SrcK8S_Name", "a`}|~b")]).unwrap_err();
        assert!(matches!(err, FlowError::QueryBuild(_)));
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("unauthorized sign"));
    }

    #[test]
    fn test_inner_quotes_are_rejected() {
        for (key, value) in [
            ("SrcK8S_Name", "\"a\"b\""),
            ("SrcAddr", "1\"2"),
            ("DstK8S_Namespace", "\""),
            ("SrcPort", "\"4\"3\""),
        ] {
            let err = logql_for(&[(key, value)]).unwrap_err();
            assert!(matches!(err, FlowError::QueryBuild(_)), "{key}={value}");
            assert_eq!(err.status_code(), 400);
        }
        // A wrapping pair is still an exact match
        assert!(logql_for(&[("SrcK8S_Name", "\"a\",b")]).is_ok());
    }

    #[test]
    fn test_invalid_key_is_rejected() {
        assert!(matches!(
            logql_for(&[("Src Name", "a")]),
            Err(FlowError::QueryBuild(_))
        ));
    }

    #[test]
    fn test_only_commas_is_rejected() {
        assert!(matches!(
            logql_for(&[("SrcK8S_Name", ",,")]),
            Err(FlowError::QueryBuild(_))
        ));
    }

    #[test]
    fn test_build_url() {
        let cfg = LokiConfig::new("http://loki:3100");
        let url = FlowQueryBuilder::new(&cfg, &params("source")).build();

        let (path, query) = url.split_once('?').unwrap();
        assert_eq!(path, "http://loki:3100/loki/api/v1/query_range");

        let parts: Vec<&str> = query.split('&').collect();
        assert_eq!(parts.len(), 4);
        let logql = percent_decode_str(parts[0].strip_prefix("query=").unwrap())
            .decode_utf8()
            .unwrap();
        assert_eq!(logql, r#"{app="netobserv-flowcollector",FlowDirection="1"}"#);
        assert_eq!(&parts[1..], ["start=1700000000", "end=1700000300", "limit=100"]);
    }

    #[test]
    fn test_build_url_skips_unset_params() {
        let cfg = LokiConfig::default();
        let url = FlowQueryBuilder::new(&cfg, &FlowParams::default()).build();
        assert!(!url.contains("&start="));
        assert!(!url.contains("&end="));
        assert!(!url.contains("&limit="));
    }
}
