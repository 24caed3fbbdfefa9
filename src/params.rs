//! Match groups, query maps and percent-decoding.
//!
//! - [`MatchGroups`]: values captured by `:name` tokens of a rewrite
//!   pattern. Values are kept exactly as they appeared in the URL (still
//!   percent-encoded); decoding happens when they are substituted or copied
//!   into the query.
//! - [`Query`]: the request's query map. Built from the URL query string,
//!   then overlaid with rule query templates and match groups.
//! - [`decode_component`]: strict percent-decoding. Unlike lenient decoders
//!   it rejects a `%` that is not followed by two hex digits.
//!
//! # Example
//!
//! ```
//! use rewrite_navigator::params::{decode_component, MatchGroups, Query};
//!
//! let mut groups = MatchGroups::new();
//! groups.insert("id", "a%20b");
//! assert_eq!(groups.get("id"), Some("a%20b"));
//! assert_eq!(groups.decoded("id").unwrap().as_deref(), Some("a b"));
//!
//! let query = Query::from_query_string("limit=10&descending=true");
//! assert_eq!(query.get("limit"), Some("10"));
//!
//! assert!(decode_component("100%").is_err());
//! ```

use crate::error::SynthesisError;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;

// ============================================================================
// Match groups
// ============================================================================

/// Named values captured while matching a rewrite pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchGroups {
    groups: BTreeMap<String, String>,
}

impl MatchGroups {
    /// Create an empty group set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a raw (still encoded) value.
    pub fn insert(&mut self, name: impl Into<String>, raw: impl Into<String>) {
        self.groups.insert(name.into(), raw.into());
    }

    /// Raw value of a group.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.groups.get(name).map(String::as_str)
    }

    /// Percent-decoded value of a group.
    pub fn decoded(&self, name: &str) -> Result<Option<String>, SynthesisError> {
        self.get(name)
            .map(|raw| decode_component(raw).map(Cow::into_owned))
            .transpose()
    }

    /// Return `true` if the group was captured.
    pub fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    /// Iterate over `(name, raw value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Return `true` if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of captured groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MatchGroups {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut groups = MatchGroups::new();
        for (k, v) in iter {
            groups.insert(k, v);
        }
        groups
    }
}

// ============================================================================
// Query
// ============================================================================

/// Query map of a request.
///
/// Keys are unique: a repeated key in the query string keeps its last value,
/// which is what the request object exposes to handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Query {
    params: BTreeMap<String, String>,
}

impl Query {
    /// Create an empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a query string (without the leading `?`).
    ///
    /// `+` decodes to a space; invalid sequences are decoded lossily, as a
    /// browser would when reading `location.search`.
    pub fn from_query_string(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let params = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        Self { params }
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Insert or overwrite a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Return `true` if the key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Iterate over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Return `true` if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Serialize back into a query string.
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter())
            .finish()
    }

    /// Compact JSON form used in the dispatch log line.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.params).unwrap_or_default()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Query {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut query = Query::new();
        for (k, v) in iter {
            query.insert(k, v);
        }
        query
    }
}

// ============================================================================
// Percent-decoding
// ============================================================================

/// Decode a percent-encoded URI component.
///
/// Fails on a `%` not followed by two hex digits, or when the decoded
/// bytes are not UTF-8. `+` is left alone (it is not a space in a path).
pub fn decode_component(raw: &str) -> Result<Cow<'_, str>, SynthesisError> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let well_formed = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !well_formed {
                return Err(malformed(raw));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    urlencoding::decode(raw).map_err(|_| malformed(raw))
}

fn malformed(raw: &str) -> SynthesisError {
    SynthesisError::MalformedEncoding {
        value: raw.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_keep_raw_values() {
        let mut groups = MatchGroups::new();
        groups.insert("name", "hello%2Fworld");

        assert_eq!(groups.get("name"), Some("hello%2Fworld"));
        assert_eq!(
            groups.decoded("name").unwrap().as_deref(),
            Some("hello/world")
        );
        assert_eq!(groups.decoded("missing").unwrap(), None);
        assert!(groups.contains("name"));
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn test_groups_decoding_error() {
        let groups: MatchGroups = [("bad", "%E0%A4%A")].into_iter().collect();
        assert!(matches!(
            groups.decoded("bad"),
            Err(SynthesisError::MalformedEncoding { .. })
        ));
    }

    #[test]
    fn test_query_from_query_string() {
        let query = Query::from_query_string("?startkey=%5B1%5D&q=a+b&flag");
        assert_eq!(query.get("startkey"), Some("[1]"));
        assert_eq!(query.get("q"), Some("a b"));
        assert_eq!(query.get("flag"), Some(""));
        assert_eq!(query.get("missing"), None);
    }

    #[test]
    fn test_query_repeated_key_keeps_last() {
        let query = Query::from_query_string("tag=a&tag=b");
        assert_eq!(query.get("tag"), Some("b"));
        assert_eq!(query.len(), 1);
    }

    #[test]
    fn test_query_round_trip_and_json() {
        let query: Query = [("b", "2"), ("a", "x y")].into_iter().collect();
        assert_eq!(query.to_query_string(), "a=x+y&b=2");
        assert_eq!(query.to_json(), r#"{"a":"x y","b":"2"}"#);
    }

    #[test]
    fn test_decode_component() {
        assert_eq!(decode_component("plain").unwrap(), "plain");
        assert_eq!(decode_component("a%20b").unwrap(), "a b");
        assert_eq!(decode_component("caf%C3%A9").unwrap(), "café");
        assert_eq!(decode_component("a+b").unwrap(), "a+b");
        assert!(decode_component("100%").is_err());
        assert!(decode_component("%zz").is_err());
        assert!(decode_component("%FF").is_err());
    }
}
