//! # Filter Groups
//!
//! Decodes the `filters` query parameter into OR-of-AND groups.
//!
//! Grammar (after URL-unescaping):
//! ```text
//! pair    := key '=' value
//! group   := pair ('&' pair)*
//! filters := group ('|' group)*
//! ```
//!
//! `foo=a,b&bar=c|baz=d` yields two groups: `[foo=a,b, bar=c]` and `[baz=d]`.
//! Pairs that do not split into exactly two non-empty parts are dropped.

use crate::FlowError;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::fmt;

const GROUP_SEPARATOR: &str = "|";
const PAIR_SEPARATOR: &str = "&";
const KEY_VALUE_SEPARATOR: char = '=';

/// Characters left readable when encoding filters for a URL.
const FILTER_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b',')
    .remove(b'*');

/// A single `key=value` condition. `value` may hold comma-separated alternatives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filter {
    pub key: String,
    pub value: String,
}

impl Filter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.key, KEY_VALUE_SEPARATOR, self.value)
    }
}

/// Conditions ANDed together.
pub type FilterGroup = Vec<Filter>;

/// Parse a raw (URL-encoded) filters expression.
///
/// An empty string yields no groups. Groups left empty once malformed
/// pairs are dropped are skipped as well.
pub fn parse_filters(raw: &str) -> Result<Vec<FilterGroup>, FlowError> {
    let decoded = query_unescape(raw)?;
    if decoded.is_empty() {
        return Ok(Vec::new());
    }

    let groups = decoded
        .split(GROUP_SEPARATOR)
        .map(|group| {
            group
                .split(PAIR_SEPARATOR)
                .filter_map(parse_pair)
                .collect::<FilterGroup>()
        })
        .filter(|group| !group.is_empty())
        .collect();

    Ok(groups)
}

/// Render groups back into the (unescaped) grammar.
pub fn render_filters(groups: &[FilterGroup]) -> String {
    groups
        .iter()
        .map(|group| {
            group
                .iter()
                .map(Filter::to_string)
                .collect::<Vec<_>>()
                .join(PAIR_SEPARATOR)
        })
        .collect::<Vec<_>>()
        .join(GROUP_SEPARATOR)
}

/// Render and URL-encode groups so that `parse_filters` reads them back unchanged.
pub fn encode_filters(groups: &[FilterGroup]) -> String {
    utf8_percent_encode(&render_filters(groups), FILTER_ENCODE_SET).to_string()
}

fn parse_pair(candidate: &str) -> Option<Filter> {
    let mut parts = candidate.split(KEY_VALUE_SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(key), Some(value), None) if !key.is_empty() && !value.is_empty() => {
            Some(Filter::new(key, value))
        }
        _ => None,
    }
}

/// Query-string unescaping: `+` is a space, every `%` must be followed by
/// two hex digits, and the result must be UTF-8.
fn query_unescape(raw: &str) -> Result<String, FlowError> {
    let bytes = raw.as_bytes();
    for (pos, _) in raw.match_indices('%') {
        let escape = bytes.get(pos + 1..pos + 3);
        if !escape.is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit)) {
            let end = (pos + 3).min(bytes.len());
            return Err(FlowError::Decoding(format!(
                "invalid URL escape \"{}\"",
                String::from_utf8_lossy(&bytes[pos..end])
            )));
        }
    }

    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| FlowError::Decoding(format!("invalid UTF-8 in filters: {e}")))
}
