//! Rewrite pattern matching.
//!
//! Patterns use the rewriter's small syntax:
//!
//! - `:name`: captures one path segment (any run of characters except `/`)
//! - `*`: matches anything; when it ends the pattern, what it consumed is
//!   the *splat*
//! - everything else matches literally
//!
//! Patterns are anchored to the whole pathname of the URL; the query string
//! and fragment never take part in matching.
//!
//! # Example
//!
//! ```
//! use rewrite_navigator::matching::{extract_groups, extract_splat};
//!
//! let groups = extract_groups("/items/:id", "/items/a%20b?rev=2").unwrap();
//! assert_eq!(groups.get("id"), Some("a%20b"));
//!
//! assert_eq!(extract_splat("/static/*", "/static/css/app.css").as_deref(), Some("css/app.css"));
//! assert_eq!(extract_splat("/static/:file", "/static/app.css"), None);
//! ```

use crate::error::ConfigurationError;
use crate::location::ParsedUrl;
use crate::params::MatchGroups;
use crate::rewrite::{RewriteRule, RewriteTable};
use regex::Regex;

const SPLAT_GROUP: &str = "splat";

/// A compiled rewrite pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
    /// Token names in capture order; capture `g{i}` holds `names[i]`.
    names: Vec<String>,
    trailing_splat: bool,
}

impl Pattern {
    /// Compile a rewrite pattern.
    pub fn compile(pattern: &str) -> Result<Self, ConfigurationError> {
        let trailing_splat = pattern.ends_with('*');
        let chars: Vec<char> = pattern.chars().collect();
        let mut expr = String::from("^");
        let mut names = Vec::new();
        let mut literal = String::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if c == ':' && chars.get(i + 1).copied().is_some_and(is_word_char) {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_word_char(chars[end]) {
                    end += 1;
                }
                expr.push_str(&regex::escape(&literal));
                literal.clear();
                expr.push_str(&format!("(?P<g{}>[^/]+)", names.len()));
                names.push(chars[start..end].iter().collect());
                i = end;
                continue;
            }
            if c == '*' {
                expr.push_str(&regex::escape(&literal));
                literal.clear();
                if trailing_splat && i == chars.len() - 1 {
                    expr.push_str(&format!("(?P<{}>.*)", SPLAT_GROUP));
                } else {
                    expr.push_str(".*");
                }
                i += 1;
                continue;
            }
            literal.push(c);
            i += 1;
        }
        expr.push_str(&regex::escape(&literal));
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|source| ConfigurationError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            names,
            trailing_splat,
        })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Token names in the order they appear.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Return `true` if the pattern ends in `*`.
    pub fn has_splat(&self) -> bool {
        self.trailing_splat
    }

    /// Return `true` if the pathname of `url` matches.
    pub fn is_match(&self, url: &str) -> bool {
        self.regex.is_match(&ParsedUrl::parse(url).pathname)
    }

    /// Named groups captured from the pathname of `url`.
    ///
    /// `None` means the pattern does not match. A match without `:name`
    /// tokens yields an empty group set.
    pub fn groups(&self, url: &str) -> Option<MatchGroups> {
        let pathname = ParsedUrl::parse(url).pathname;
        let captures = self.regex.captures(&pathname)?;
        let groups = self
            .names
            .iter()
            .enumerate()
            .filter_map(|(i, name)| {
                captures
                    .name(&format!("g{}", i))
                    .map(|m| (name.clone(), m.as_str().to_string()))
            })
            .collect();
        Some(groups)
    }

    /// The remainder consumed by a trailing `*`.
    ///
    /// `None` when the pattern has no trailing wildcard or does not match.
    pub fn splat(&self, url: &str) -> Option<String> {
        if !self.trailing_splat {
            return None;
        }
        let pathname = ParsedUrl::parse(url).pathname;
        self.regex
            .captures(&pathname)?
            .name(SPLAT_GROUP)
            .map(|m| m.as_str().to_string())
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Extract named groups from `url` using an uncompiled pattern.
///
/// Returns `None` if the pattern does not match (or cannot be compiled).
pub fn extract_groups(pattern: &str, url: &str) -> Option<MatchGroups> {
    Pattern::compile(pattern).ok()?.groups(url)
}

/// Extract the splat from `url` using an uncompiled pattern.
pub fn extract_splat(pattern: &str, url: &str) -> Option<String> {
    if !pattern.ends_with('*') {
        return None;
    }
    Pattern::compile(pattern).ok()?.splat(url)
}

/// Index of the first rule accepting `method` whose pattern matches `url`.
pub fn match_index(method: &str, url: &str, table: &RewriteTable) -> Option<usize> {
    let pathname = ParsedUrl::parse(url).pathname;
    table
        .rules()
        .iter()
        .position(|compiled| {
            compiled.rule.accepts(method) && compiled.pattern.regex.is_match(&pathname)
        })
}

/// First rule accepting `method` whose pattern matches `url`.
///
/// `None` means the URL is not a route of this app.
pub fn match_rule<'a>(method: &str, url: &str, table: &'a RewriteTable) -> Option<&'a RewriteRule> {
    match_index(method, url, table).map(|i| &table.rules()[i].rule)
}
