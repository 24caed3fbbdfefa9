//! Collaborator contracts.
//!
//! Everything the router does not own is reached through one of these
//! traits. All asynchronous methods return a [`LocalBoxFuture`]: the router
//! runs on a single thread and its futures are never sent elsewhere.
//!
//! | Trait | Role | Default |
//! |-------|------|---------|
//! | [`IdentityGenerator`] | unique request ids | [`UuidGenerator`] |
//! | [`SessionProvider`] | user context | [`AnonymousSession`] |
//! | [`DocumentStore`] | documents and views | none |
//! | [`CookieJar`] | cookie read/write | [`MemoryCookieJar`] |
//! | [`FlashMessages`] | flash side channel | [`NoFlash`] |
//! | [`Window`] | location, history, scrolling | none |

use crate::error::{BoxError, ExhaustedError};
use crate::params::Query;
use crate::request::Request;
use crate::response::Response;
use crate::state::HistoryState;
use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;

// ============================================================================
// Identity
// ============================================================================

/// Source of unique request identifiers.
pub trait IdentityGenerator {
    /// Produce a fresh id, giving up after `attempts` failed tries.
    fn request_unique_id(&self, attempts: usize) -> LocalBoxFuture<'_, Result<String, ExhaustedError>>;
}

/// Random v4 uuids, formatted without dashes.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdentityGenerator for UuidGenerator {
    fn request_unique_id(&self, attempts: usize) -> LocalBoxFuture<'_, Result<String, ExhaustedError>> {
        let id = if attempts == 0 {
            Err(ExhaustedError { attempts })
        } else {
            Ok(uuid::Uuid::new_v4().simple().to_string())
        };
        future::ready(id).boxed_local()
    }
}

// ============================================================================
// Session
// ============================================================================

/// Session information returned by a [`SessionProvider`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// User context (`{ name, roles, ... }`).
    #[serde(rename = "userCtx")]
    pub user_ctx: Value,
}

/// Looks up the current session.
pub trait SessionProvider {
    /// Fetch the current session.
    fn current_session(&self) -> LocalBoxFuture<'_, Result<Session, BoxError>>;
}

/// Session provider for apps without authentication: always anonymous.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousSession;

impl SessionProvider for AnonymousSession {
    fn current_session(&self) -> LocalBoxFuture<'_, Result<Session, BoxError>> {
        let session = Session {
            user_ctx: serde_json::json!({ "name": null, "roles": [] }),
        };
        future::ready(Ok(session)).boxed_local()
    }
}

// ============================================================================
// Storage
// ============================================================================

/// A view result: rows plus every other top-level field (`total_rows`,
/// `offset`, `update_seq`, ...), which becomes the list handler's head.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewResult {
    /// Result rows in order.
    #[serde(default)]
    pub rows: Vec<Value>,
    /// Everything except `rows`.
    #[serde(flatten)]
    pub head: Map<String, Value>,
}

impl ViewResult {
    /// Build from a raw JSON view response.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Document and view storage.
pub trait DocumentStore {
    /// Fetch one document.
    fn get_document<'a>(&'a self, id: &'a str, query: &'a Query) -> LocalBoxFuture<'a, Result<Value, BoxError>>;

    /// Query a view (`"design/_view/name"` style path).
    fn get_view<'a>(&'a self, path: &'a str, query: &'a Query) -> LocalBoxFuture<'a, Result<ViewResult, BoxError>>;
}

// ============================================================================
// Cookies
// ============================================================================

/// Cookie access.
pub trait CookieJar {
    /// All cookies as `name → value`.
    fn read_cookies(&self) -> BTreeMap<String, String>;

    /// Store a raw `Set-Cookie` value (`name=value; Path=/; ...`).
    fn write_cookie(&self, raw: &str);
}

/// In-memory cookie jar. Attributes after the first `;` are ignored.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: RefCell<BTreeMap<String, String>>,
}

impl MemoryCookieJar {
    /// Create an empty jar.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieJar for MemoryCookieJar {
    fn read_cookies(&self) -> BTreeMap<String, String> {
        self.cookies.borrow().clone()
    }

    fn write_cookie(&self, raw: &str) {
        let pair = raw.split(';').next().unwrap_or("");
        if let Some((name, value)) = pair.split_once('=') {
            self.cookies
                .borrow_mut()
                .insert(name.trim().to_string(), value.trim().to_string());
        }
    }
}

// ============================================================================
// Flash messages
// ============================================================================

/// Flash-message side channel.
///
/// Called at fixed points of every dispatch: before the handler runs
/// ([`attach_to_request`](Self::attach_to_request)), when a response is
/// normalized ([`merge_into_response`](Self::merge_into_response)) and when
/// a dispatch ends without a response object
/// ([`persist_outgoing`](Self::persist_outgoing)).
pub trait FlashMessages {
    /// Load incoming messages into the request.
    fn attach_to_request(&self, request: &mut Request);

    /// Carry outgoing messages on the response (usually as a cookie header).
    fn merge_into_response(&self, request: &Request, response: Response) -> Response;

    /// Persist outgoing messages directly.
    fn persist_outgoing(&self, request: &Request, messages: &[Value]);
}

/// Flash channel that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFlash;

impl FlashMessages for NoFlash {
    fn attach_to_request(&self, _request: &mut Request) {}

    fn merge_into_response(&self, _request: &Request, response: Response) -> Response {
        response
    }

    fn persist_outgoing(&self, _request: &Request, _messages: &[Value]) {}
}

// ============================================================================
// Window
// ============================================================================

/// The browser-like environment the router runs in.
pub trait Window {
    /// Full current location (`http://host/db/_design/app/_rewrite/x`).
    fn location(&self) -> String;

    /// Return `true` if history entries can be pushed without a reload.
    fn supports_history(&self) -> bool;

    /// Push a history entry and update the location to `url`.
    fn push_state(&self, state: &HistoryState, url: &str);

    /// Leave the app: full page load of `url`.
    fn assign(&self, url: &str);

    /// Scroll the viewport.
    fn scroll_to(&self, x: f64, y: f64);

    /// Top offset of the element with this id, if it exists.
    fn element_offset_top(&self, id: &str) -> Option<f64>;

    /// Report a page view to analytics.
    fn track_pageview(&self, _url: &str) {}
}
