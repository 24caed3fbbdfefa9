//! Rewrite rules and the route table.
//!
//! A route table is the ordered list of rewrite rules an app ships with,
//! in the same JSON shape the server-side rewriter reads:
//!
//! ```json
//! [
//!   { "from": "/", "to": "_show/home" },
//!   { "from": "/items/:id", "to": "_show/item/:id" },
//!   { "from": "/tags/:tag", "to": "_list/items/by_tag",
//!     "query": { "startkey": [":tag"], "include_docs": "true" } },
//!   { "from": "/items/:id", "to": "_update/item/:id", "method": "POST" },
//!   { "from": "/static/*", "to": "static/*" }
//! ]
//! ```
//!
//! Order is precedence: the first rule that matches wins. Rules are
//! compiled once when the table is built and never change afterwards.

use crate::error::ConfigurationError;
use crate::matching::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Templates
// ============================================================================

/// A rewrite target: either one `/`-delimited string or a list of segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Template {
    /// `"_show/item/:id"`
    Text(String),
    /// `[":tag", "*"]`
    Segments(Vec<String>),
}

impl Template {
    /// The template as path segments.
    pub fn segments(&self) -> Vec<&str> {
        match self {
            Template::Text(text) => text.split('/').collect(),
            Template::Segments(segments) => segments.iter().map(String::as_str).collect(),
        }
    }

    /// Flatten into a single string.
    ///
    /// Text templates come back unchanged; segment lists are JSON-encoded,
    /// which is how a list-valued query parameter (e.g. `startkey`) travels
    /// to the store.
    pub fn into_query_value(self) -> String {
        match self {
            Template::Text(text) => text,
            Template::Segments(segments) => {
                serde_json::to_string(&segments).unwrap_or_default()
            }
        }
    }
}

impl From<&str> for Template {
    fn from(text: &str) -> Self {
        Template::Text(text.to_string())
    }
}

impl From<Vec<&str>> for Template {
    fn from(segments: Vec<&str>) -> Self {
        Template::Segments(segments.into_iter().map(String::from).collect())
    }
}

// ============================================================================
// RewriteRule
// ============================================================================

/// One entry of the route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRule {
    /// Pattern matched against the URL pathname (`:name`, trailing `*`).
    pub from: String,
    /// Internal dispatch path template.
    pub to: Template,
    /// Only match this HTTP method when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Query templates overlaid onto the request query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<BTreeMap<String, Template>>,
}

impl RewriteRule {
    /// Create a rule matching any method.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: Template::Text(to.into()),
            method: None,
            query: None,
        }
    }

    /// Restrict the rule to one method.
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Add a query template.
    pub fn query(mut self, key: impl Into<String>, template: impl Into<Template>) -> Self {
        self.query
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), template.into());
        self
    }

    /// Return `true` if the rule accepts `method`.
    pub fn accepts(&self, method: &str) -> bool {
        self.method.as_deref().map_or(true, |m| m == method)
    }
}

// ============================================================================
// RewriteTable
// ============================================================================

/// A rule together with its compiled `from` pattern.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// The rule as configured.
    pub rule: RewriteRule,
    /// Compiled `from` pattern.
    pub pattern: Pattern,
}

/// Ordered, compiled route table.
#[derive(Debug, Clone, Default)]
pub struct RewriteTable {
    rules: Vec<CompiledRule>,
}

impl RewriteTable {
    /// Compile a list of rules, keeping their order.
    pub fn new(rules: Vec<RewriteRule>) -> Result<Self, ConfigurationError> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let pattern = Pattern::compile(&rule.from)?;
                Ok(CompiledRule { rule, pattern })
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;
        Ok(Self { rules })
    }

    /// Parse and compile a JSON route table.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let rules: Vec<RewriteRule> =
            serde_json::from_str(json).map_err(ConfigurationError::RouteTable)?;
        Self::new(rules)
    }

    /// Compiled rules in precedence order.
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Rule at `index`.
    pub fn get(&self, index: usize) -> Option<&CompiledRule> {
        self.rules.get(index)
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Return `true` if the table has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"[
        { "from": "/", "to": "_show/home" },
        { "from": "/tags/:tag", "to": "_list/items/by_tag",
          "query": { "startkey": [":tag"], "limit": "10" } },
        { "from": "/items/:id", "to": "_update/item/:id", "method": "POST" }
    ]"#;

    #[test]
    fn test_from_json_keeps_order() {
        let table = RewriteTable::from_json(TABLE).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.rules()[0].rule.from, "/");
        assert_eq!(table.rules()[2].rule.method.as_deref(), Some("POST"));
    }

    #[test]
    fn test_query_templates_deserialize() {
        let table = RewriteTable::from_json(TABLE).unwrap();
        let query = table.rules()[1].rule.query.as_ref().unwrap();
        assert_eq!(query["startkey"], Template::from(vec![":tag"]));
        assert_eq!(query["limit"], Template::from("10"));
    }

    #[test]
    fn test_invalid_json_is_configuration_error() {
        let err = RewriteTable::from_json("{").unwrap_err();
        assert!(matches!(err, ConfigurationError::RouteTable(_)));
    }

    #[test]
    fn test_rule_builder_and_accepts() {
        let rule = RewriteRule::new("/items/:id", "_update/item/:id")
            .method("POST")
            .query("batch", "ok");
        assert!(rule.accepts("POST"));
        assert!(!rule.accepts("GET"));
        assert!(RewriteRule::new("/", "_show/home").accepts("DELETE"));
        assert_eq!(rule.query.unwrap()["batch"], Template::from("ok"));
    }

    #[test]
    fn test_template_query_value() {
        assert_eq!(Template::from("abc").into_query_value(), "abc");
        assert_eq!(
            Template::from(vec!["a", "b"]).into_query_value(),
            r#"["a","b"]"#
        );
    }
}
