//! URL parsing and app-path translation.
//!
//! The router works with *app URLs*: paths relative to the app's base URL
//! (`/items/99?rev=2#notes`). The environment reports *full locations*
//! (`http://host/db/_design/app/_rewrite/items/99?rev=2#notes`). The helpers
//! here convert between the two:
//!
//! | Function | From | To |
//! |----------|------|----|
//! | [`base_url`] | full location | `/db/_design/app/_rewrite` (or `""` on a vhost) |
//! | [`current_url`] | full location | app URL |
//! | [`app_path`] | link href / form action | app URL |
//!
//! [`ParsedUrl`] never decodes anything: the pathname is kept exactly as
//! written so rewrite groups see the raw segments.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// A URL split into the parts the router cares about.
///
/// Relative URLs leave `protocol`, `hostname` and `port` unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedUrl {
    /// Scheme including the colon (`"http:"`).
    pub protocol: Option<String>,
    /// Host name without port.
    pub hostname: Option<String>,
    /// Explicit, non-default port.
    pub port: Option<u16>,
    /// Path, still percent-encoded.
    pub pathname: String,
    /// Query string including `?`.
    pub search: Option<String>,
    /// Fragment including `#`.
    pub hash: Option<String>,
}

impl ParsedUrl {
    /// Parse an absolute, protocol-relative, or relative URL.
    pub fn parse(input: &str) -> Self {
        if scheme_regex().is_match(input) {
            if let Ok(parsed) = url::Url::parse(input) {
                return Self::from_absolute(&parsed, true);
            }
        }
        if input.starts_with("//") {
            if let Ok(parsed) = url::Url::parse(&format!("http:{}", input)) {
                return Self::from_absolute(&parsed, false);
            }
        }
        Self::parse_relative(input)
    }

    fn from_absolute(parsed: &url::Url, keep_protocol: bool) -> Self {
        Self {
            protocol: keep_protocol.then(|| format!("{}:", parsed.scheme())),
            hostname: parsed.host_str().map(String::from),
            port: parsed.port(),
            pathname: parsed.path().to_string(),
            search: parsed.query().map(|q| format!("?{}", q)),
            hash: parsed.fragment().map(|f| format!("#{}", f)),
        }
    }

    fn parse_relative(input: &str) -> Self {
        let (rest, hash) = match input.find('#') {
            Some(i) => (&input[..i], Some(input[i..].to_string())),
            None => (input, None),
        };
        let (pathname, search) = match rest.find('?') {
            Some(i) => (&rest[..i], Some(rest[i..].to_string())),
            None => (rest, None),
        };
        Self {
            pathname: pathname.to_string(),
            search,
            hash,
            ..Self::default()
        }
    }

    /// Query string without the leading `?`.
    pub fn query_string(&self) -> &str {
        self.search
            .as_deref()
            .map(|s| s.trim_start_matches('?'))
            .unwrap_or("")
    }

    /// Serialize back into a URL string.
    pub fn format(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ParsedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(hostname) = &self.hostname {
            if let Some(protocol) = &self.protocol {
                write!(f, "{}", protocol)?;
            }
            write!(f, "//{}", hostname)?;
            if let Some(port) = self.port {
                write!(f, ":{}", port)?;
            }
        }
        write!(f, "{}", self.pathname)?;
        if let Some(search) = &self.search {
            write!(f, "{}", search)?;
        }
        if let Some(hash) = &self.hash {
            write!(f, "{}", hash)?;
        }
        Ok(())
    }
}

fn scheme_regex() -> &'static Regex {
    static SCHEME: OnceLock<Regex> = OnceLock::new();
    SCHEME.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").expect("static regex"))
}

fn rewrite_regex() -> &'static Regex {
    static REWRITE: OnceLock<Regex> = OnceLock::new();
    REWRITE.get_or_init(|| Regex::new(r"^(.*/_rewrite)(.*)$").expect("static regex"))
}

/// Test whether two URLs share protocol, hostname and port.
///
/// A URL without a protocol is relative to the current origin, so it is
/// always same-origin.
pub fn same_origin(a: &str, b: &str) -> bool {
    let a = ParsedUrl::parse(a);
    let b = ParsedUrl::parse(b);
    if a.protocol.is_none() || b.protocol.is_none() {
        return true;
    }
    a.protocol == b.protocol && a.hostname == b.hostname && a.port == b.port
}

/// Test whether `url` belongs to the app served at `location`.
pub fn is_app_url(url: &str, location: &str) -> bool {
    same_origin(url, location)
}

/// Base URL of the app: the location's path up to and including
/// `/_rewrite`, or `""` when the app is served from a virtual host.
pub fn base_url(location: &str) -> String {
    let pathname = ParsedUrl::parse(location).pathname;
    rewrite_regex()
        .captures(&pathname)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// The app URL of the current location (without the base URL).
pub fn current_url(location: &str) -> String {
    let loc = ParsedUrl::parse(location);
    if let Some(captures) = rewrite_regex().captures(&loc.pathname) {
        let rest = captures.get(2).map(|m| m.as_str()).unwrap_or("");
        let app = ParsedUrl {
            pathname: if rest.is_empty() { "/".to_string() } else { rest.to_string() },
            search: loc.search.clone(),
            hash: loc.hash.clone(),
            ..ParsedUrl::default()
        };
        return app.format();
    }
    if location.is_empty() {
        "/".to_string()
    } else {
        location.to_string()
    }
}

/// The app URL of `location` for an app served under `base`.
///
/// A location whose path starts with `base` loses that prefix; any other
/// location falls back to [`current_url`].
pub fn app_url(location: &str, base: &str) -> String {
    if base.is_empty() {
        return current_url(location);
    }
    let loc = ParsedUrl::parse(location);
    match loc.pathname.strip_prefix(base) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => ParsedUrl {
            pathname: if rest.is_empty() { "/".to_string() } else { rest.to_string() },
            search: loc.search.clone(),
            hash: loc.hash.clone(),
            ..ParsedUrl::default()
        }
        .format(),
        _ => current_url(location),
    }
}

/// Convert a link href or form action into an app URL.
///
/// - `#frag` and `?query` are resolved against the current app URL.
/// - An absolute URL on the current origin loses its origin; one on another
///   origin is returned unchanged.
/// - The base URL prefix is stripped.
pub fn app_path(href: &str, location: &str, base: &str) -> String {
    if href.starts_with('#') {
        let mut current = ParsedUrl::parse(&app_url(location, base));
        current.hash = Some(href.to_string());
        return app_path(&current.format(), location, base);
    }
    if href.starts_with('?') {
        let mut current = ParsedUrl::parse(&app_url(location, base));
        current.search = Some(href.to_string());
        return app_path(&current.format(), location, base);
    }

    let mut path = href;
    if scheme_regex().is_match(href) {
        let origin = origin_prefix(href);
        if origin == origin_prefix(location) {
            path = &href[origin.len()..];
        } else {
            return href.to_string();
        }
    }
    match path.strip_prefix(base) {
        Some(stripped) if !base.is_empty() => stripped.to_string(),
        _ => path.to_string(),
    }
}

/// `scheme://host:port`: the first three `/`-separated parts.
fn origin_prefix(url: &str) -> String {
    url.split('/').take(3).collect::<Vec<_>>().join("/")
}
