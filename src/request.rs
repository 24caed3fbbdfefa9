//! Request synthesis.
//!
//! [`build_request`] turns a navigation (method, URL, optional form data)
//! plus the rewrite rule it matched into the [`Request`] handed to show,
//! list and update handlers.
//!
//! # Query precedence
//!
//! The request query is assembled in three layers, later layers winning:
//!
//! 1. the URL query string, decoded
//! 2. the rule's `query` templates, with `:name` placeholders substituted
//! 3. the match groups, decoded
//!
//! The rule's `to` template is then substituted against that final query
//! (plus the splat) and split on `/` into [`Request::path`].
//!
//! # Example
//!
//! ```
//! use rewrite_navigator::environment::{AnonymousSession, MemoryCookieJar, UuidGenerator};
//! use rewrite_navigator::request::{build_request, SynthesisContext};
//! use rewrite_navigator::rewrite::{RewriteRule, RewriteTable};
//!
//! let table = RewriteTable::new(vec![RewriteRule::new("/foo/:id", "_show/bar/:id")]).unwrap();
//! let ids = UuidGenerator;
//! let session = AnonymousSession;
//! let cookies = MemoryCookieJar::new();
//! let cx = SynthesisContext::new(&ids, &session, &cookies);
//!
//! let req = pollster::block_on(build_request(&cx, "GET", "/foo/42", None, &table.rules()[0])).unwrap();
//! assert_eq!(req.path, vec!["_show", "bar", "42"]);
//! assert_eq!(req.query.get("id"), Some("42"));
//! ```

use crate::environment::{CookieJar, IdentityGenerator, SessionProvider};
use crate::error::SynthesisError;
use crate::location::ParsedUrl;
use crate::params::Query;
use crate::rewrite::{CompiledRule, Template};
use crate::substitute::substitute;
use crate::trace_log;
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;

/// Submitted form fields.
pub type FormData = BTreeMap<String, String>;

/// Default number of attempts for unique id generation.
pub const DEFAULT_ID_ATTEMPTS: usize = 100;

/// The request object passed to handlers.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// HTTP method (`GET`, `POST`, ...).
    pub method: String,
    /// Query map (see the module docs for precedence).
    pub query: Query,
    /// Always empty on the client.
    pub headers: BTreeMap<String, String>,
    /// Rewritten path: `["_show", "item", "99"]`.
    pub path: Vec<String>,
    /// Unique id of this request; also its dispatch ticket.
    pub uuid: String,
    /// User context of the session.
    #[serde(rename = "userCtx")]
    pub user_ctx: Value,
    /// Form fields, for form submissions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<FormData>,
    /// Always `true`: the request was built in the client.
    pub client: bool,
    /// `true` only for the navigation performed at startup.
    pub initial_hit: bool,
    /// Cookies at synthesis time.
    pub cookie: BTreeMap<String, String>,
    /// Incoming flash messages, filled in before the handler runs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flash_messages: Vec<Value>,
    /// Set once a handler has run against this request.
    pub response_received: bool,
    #[serde(skip)]
    outgoing_flash: RefCell<Vec<Value>>,
}

impl Request {
    /// Handler name (`path[1]`).
    pub fn name(&self) -> Option<&str> {
        self.path.get(1).map(String::as_str)
    }

    /// Document id or view path (`path[2..]` joined by `/`).
    pub fn target(&self) -> String {
        self.path.get(2..).map(|rest| rest.join("/")).unwrap_or_default()
    }

    /// A submitted form field.
    pub fn form_value(&self, field: &str) -> Option<&str> {
        self.form.as_ref()?.get(field).map(String::as_str)
    }

    /// Queue a flash message for the next page.
    pub fn add_flash_message(&self, message: impl Into<Value>) {
        self.outgoing_flash.borrow_mut().push(message.into());
    }

    /// Flash messages queued by the handler.
    pub fn outgoing_flash_messages(&self) -> Vec<Value> {
        self.outgoing_flash.borrow().clone()
    }
}

// ============================================================================
// Synthesis
// ============================================================================

/// Collaborators and controller state needed to build a request.
#[derive(Clone, Copy)]
pub struct SynthesisContext<'a> {
    /// Unique id source.
    pub ids: &'a dyn IdentityGenerator,
    /// Session lookup, used when no user context is cached.
    pub session: &'a dyn SessionProvider,
    /// Cookie source.
    pub cookies: &'a dyn CookieJar,
    /// Cached user context.
    pub user_ctx: Option<&'a Value>,
    /// Whether this is the startup navigation.
    pub initial_hit: bool,
    /// Attempts allowed for unique id generation.
    pub id_attempts: usize,
}

impl<'a> SynthesisContext<'a> {
    /// Context with no cached user, not the initial hit, default attempts.
    pub fn new(
        ids: &'a dyn IdentityGenerator,
        session: &'a dyn SessionProvider,
        cookies: &'a dyn CookieJar,
    ) -> Self {
        Self {
            ids,
            session,
            cookies,
            user_ctx: None,
            initial_hit: false,
            id_attempts: DEFAULT_ID_ATTEMPTS,
        }
    }

    /// Use a cached user context instead of asking the session provider.
    pub fn with_user_ctx(mut self, user_ctx: Option<&'a Value>) -> Self {
        self.user_ctx = user_ctx;
        self
    }

    /// Mark the request as the startup navigation.
    pub fn with_initial_hit(mut self, initial_hit: bool) -> Self {
        self.initial_hit = initial_hit;
        self
    }

    /// Override the id attempt count.
    pub fn with_id_attempts(mut self, attempts: usize) -> Self {
        self.id_attempts = attempts;
        self
    }
}

/// Build the request for a navigation matched by `compiled`.
///
/// Fails when a placeholder value is not valid percent-encoding, when no
/// unique id could be produced, or when the session lookup fails.
pub async fn build_request(
    cx: &SynthesisContext<'_>,
    method: &str,
    url: &str,
    form: Option<FormData>,
    compiled: &CompiledRule,
) -> Result<Request, SynthesisError> {
    let rule = &compiled.rule;
    let groups = compiled.pattern.groups(url).unwrap_or_default();
    let mut query = Query::from_query_string(ParsedUrl::parse(url).query_string());

    if let Some(templates) = &rule.query {
        for (key, template) in templates {
            let value = substitute(template, &groups, None)?;
            query.insert(key.clone(), value.into_query_value());
        }
    }
    for (name, _) in groups.iter() {
        if let Some(value) = groups.decoded(name)? {
            query.insert(name, value);
        }
    }

    let splat = compiled.pattern.splat(url);
    let path = match substitute(&rule.to, &query, splat.as_deref())? {
        Template::Text(text) => text.split('/').map(String::from).collect(),
        Template::Segments(segments) => segments,
    };
    trace_log!("Rewrote '{}' to {:?}", url, path);

    let uuid = cx.ids.request_unique_id(cx.id_attempts).await?;
    let user_ctx = match cx.user_ctx {
        Some(user_ctx) => user_ctx.clone(),
        None => {
            cx.session
                .current_session()
                .await
                .map_err(SynthesisError::Session)?
                .user_ctx
        }
    };

    Ok(Request {
        method: method.to_string(),
        query,
        headers: BTreeMap::new(),
        path,
        uuid,
        user_ctx,
        form,
        client: true,
        initial_hit: cx.initial_hit,
        cookie: cx.cookies.read_cookies(),
        flash_messages: Vec::new(),
        response_received: false,
        outgoing_flash: RefCell::new(Vec::new()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{AnonymousSession, MemoryCookieJar, Session, UuidGenerator};
    use crate::error::{BoxError, ExhaustedError};
    use crate::rewrite::{RewriteRule, RewriteTable};
    use futures::future::{self, LocalBoxFuture};
    use futures::FutureExt;
    use std::cell::Cell;

    struct CountingSession {
        calls: Cell<usize>,
    }

    impl SessionProvider for CountingSession {
        fn current_session(&self) -> LocalBoxFuture<'_, Result<Session, BoxError>> {
            self.calls.set(self.calls.get() + 1);
            let session = Session {
                user_ctx: serde_json::json!({ "name": "ann", "roles": ["admin"] }),
            };
            future::ready(Ok(session)).boxed_local()
        }
    }

    struct FailingSession;

    impl SessionProvider for FailingSession {
        fn current_session(&self) -> LocalBoxFuture<'_, Result<Session, BoxError>> {
            future::ready(Err::<Session, BoxError>("session down".into())).boxed_local()
        }
    }

    struct NoIds;

    impl IdentityGenerator for NoIds {
        fn request_unique_id(&self, attempts: usize) -> LocalBoxFuture<'_, Result<String, ExhaustedError>> {
            future::ready(Err(ExhaustedError { attempts })).boxed_local()
        }
    }

    fn compile(rule: RewriteRule) -> CompiledRule {
        RewriteTable::new(vec![rule]).unwrap().rules()[0].clone()
    }

    fn build(rule: RewriteRule, method: &str, url: &str) -> Result<Request, SynthesisError> {
        let cookies = MemoryCookieJar::new();
        let cx = SynthesisContext::new(&UuidGenerator, &AnonymousSession, &cookies);
        pollster::block_on(build_request(&cx, method, url, None, &compile(rule)))
    }

    #[test]
    fn test_basic_rewrite() {
        let req = build(RewriteRule::new("/foo/:id", "_show/bar/:id"), "GET", "/foo/42").unwrap();
        assert_eq!(req.path, vec!["_show", "bar", "42"]);
        assert_eq!(req.query.get("id"), Some("42"));
        assert_eq!(req.method, "GET");
        assert!(req.client);
        assert!(req.headers.is_empty());
        assert!(!req.response_received);
        assert_eq!(req.uuid.len(), 32);
        assert_eq!(req.name(), Some("bar"));
        assert_eq!(req.target(), "42");
    }

    #[test]
    fn test_groups_win_over_rule_query_and_url_query() {
        let rule = RewriteRule::new("/items/:id", "_show/item/:id")
            .query("id", "from-rule")
            .query("limit", "10");
        let req = build(rule, "GET", "/items/7?id=from-url&sort=asc").unwrap();
        assert_eq!(req.query.get("id"), Some("7"));
        assert_eq!(req.query.get("limit"), Some("10"));
        assert_eq!(req.query.get("sort"), Some("asc"));
    }

    #[test]
    fn test_rule_query_overrides_url_query() {
        let rule = RewriteRule::new("/items", "_list/items/all").query("limit", "10");
        let req = build(rule, "GET", "/items?limit=500").unwrap();
        assert_eq!(req.query.get("limit"), Some("10"));
    }

    #[test]
    fn test_segment_query_template_is_json() {
        let rule = RewriteRule::new("/tags/:tag", "_list/items/by_tag")
            .query("startkey", vec![":tag"])
            .query("endkey", vec![":tag", "{}"]);
        let req = build(rule, "GET", "/tags/rust%20lang").unwrap();
        assert_eq!(req.query.get("startkey"), Some(r#"["rust lang"]"#));
        assert_eq!(req.query.get("endkey"), Some(r#"["rust lang","{}"]"#));
        assert_eq!(req.query.get("tag"), Some("rust lang"));
    }

    #[test]
    fn test_splat_rewrite() {
        let req = build(RewriteRule::new("/static/*", "_show/file/*"), "GET", "/static/css/site.css").unwrap();
        assert_eq!(req.path, vec!["_show", "file", "css", "site.css"]);
        assert_eq!(req.target(), "css/site.css");
    }

    #[test]
    fn test_segments_target() {
        let mut rule = RewriteRule::new("/docs/:id", "");
        rule.to = Template::from(vec!["_show", "doc", ":id"]);
        let req = build(rule, "GET", "/docs/a%2Fb").unwrap();
        assert_eq!(req.path, vec!["_show", "doc", "a/b"]);
    }

    #[test]
    fn test_malformed_group_fails() {
        let err = build(RewriteRule::new("/foo/:id", "_show/bar/:id"), "GET", "/foo/100%").unwrap_err();
        assert!(matches!(err, SynthesisError::MalformedEncoding { .. }));
    }

    #[test]
    fn test_form_and_cookies_attached() {
        let cookies = MemoryCookieJar::new();
        cookies.write_cookie("theme=dark");
        let cx = SynthesisContext::new(&UuidGenerator, &AnonymousSession, &cookies).with_initial_hit(true);
        let form: FormData = [("title".to_string(), "Hello".to_string())].into_iter().collect();
        let compiled = compile(RewriteRule::new("/items", "_update/item"));

        let req = pollster::block_on(build_request(&cx, "POST", "/items", Some(form), &compiled)).unwrap();
        assert_eq!(req.form_value("title"), Some("Hello"));
        assert_eq!(req.cookie.get("theme").map(String::as_str), Some("dark"));
        assert!(req.initial_hit);
    }

    #[test]
    fn test_cached_user_ctx_skips_session() {
        let cookies = MemoryCookieJar::new();
        let session = CountingSession { calls: Cell::new(0) };
        let cached = serde_json::json!({ "name": "cached" });
        let compiled = compile(RewriteRule::new("/", "_show/home"));

        let cx = SynthesisContext::new(&UuidGenerator, &session, &cookies).with_user_ctx(Some(&cached));
        let req = pollster::block_on(build_request(&cx, "GET", "/", None, &compiled)).unwrap();
        assert_eq!(req.user_ctx["name"], "cached");
        assert_eq!(session.calls.get(), 0);

        let cx = SynthesisContext::new(&UuidGenerator, &session, &cookies);
        let req = pollster::block_on(build_request(&cx, "GET", "/", None, &compiled)).unwrap();
        assert_eq!(req.user_ctx["name"], "ann");
        assert_eq!(session.calls.get(), 1);
    }

    #[test]
    fn test_identity_exhaustion() {
        let cookies = MemoryCookieJar::new();
        let cx = SynthesisContext::new(&NoIds, &AnonymousSession, &cookies).with_id_attempts(3);
        let compiled = compile(RewriteRule::new("/", "_show/home"));
        let err = pollster::block_on(build_request(&cx, "GET", "/", None, &compiled)).unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::IdentityExhausted(ExhaustedError { attempts: 3 })
        ));
    }

    #[test]
    fn test_session_failure() {
        let cookies = MemoryCookieJar::new();
        let cx = SynthesisContext::new(&UuidGenerator, &FailingSession, &cookies);
        let compiled = compile(RewriteRule::new("/", "_show/home"));
        let err = pollster::block_on(build_request(&cx, "GET", "/", None, &compiled)).unwrap_err();
        assert!(matches!(err, SynthesisError::Session(_)));
    }

    #[test]
    fn test_outgoing_flash() {
        let req = build(RewriteRule::new("/", "_show/home"), "GET", "/").unwrap();
        req.add_flash_message("saved");
        assert_eq!(req.outgoing_flash_messages(), vec![Value::from("saved")]);
    }
}
