//! Navigation controller.
//!
//! The [`Navigator`] ties everything together. It owns the compiled route
//! table, the navigation state and the [`Sequencer`], and exposes the
//! entry points an embedding environment calls:
//!
//! | Entry point | Triggered by |
//! |-------------|--------------|
//! | [`init`](Navigator::init) | page load |
//! | [`on_link_click`](Navigator::on_link_click) | click on `<a href>` |
//! | [`on_form_submit`](Navigator::on_form_submit) | form submission |
//! | [`pop_state`](Navigator::pop_state) | back/forward |
//! | [`navigate`](Navigator::navigate) | programmatic navigation |
//!
//! Every path ends in [`dispatch`](Navigator::dispatch):
//!
//! 1. match the URL against the route table (first match wins); no match is
//!    a full page load of `base + url`
//! 2. build the request
//! 3. publish its uuid as the current request
//! 4. run the handler selected by `path[0]`
//! 5. if the request is still current, scroll to the URL's anchor
//!
//! # Example
//!
//! ```ignore
//! use rewrite_navigator::{HandlerRegistry, Navigator, RewriteTable, RouterConfig};
//! use std::rc::Rc;
//!
//! let table = RewriteTable::from_json(r#"[{ "from": "/items/:id", "to": "_show/item/:id" }]"#)?;
//! let registry = HandlerRegistry::new().show("item", |doc, _req| render_item(doc));
//!
//! let navigator = Navigator::builder(table, registry, Rc::new(BrowserWindow), Rc::new(CouchStore))
//!     .config(RouterConfig::new("myapp"))
//!     .build();
//!
//! navigator.init().await?;
//! navigator.on_link_click("/items/99").await?;
//! ```

#[cfg(feature = "cache")]
use crate::cache::{CacheStats, MatchCache};
use crate::config::RouterConfig;
use crate::dispatch::Sequencer;
use crate::environment::{
    AnonymousSession, CookieJar, DocumentStore, FlashMessages, IdentityGenerator, MemoryCookieJar, NoFlash,
    SessionProvider, UuidGenerator, Window,
};
use crate::error::{NavigationOutcome, RouterError};
use crate::handlers::HandlerRegistry;
use crate::hooks::ListHooks;
use crate::lifecycle::{EventBus, HandlerKind, LifecycleEvent};
use crate::location::{self, ParsedUrl};
use crate::matching::match_index;
use crate::request::{build_request, FormData, SynthesisContext};
use crate::rewrite::{CompiledRule, RewriteTable};
use crate::state::{CurrentRequest, CurrentState, HistoryState, NavigationState};
use crate::{debug_log, error_log, info_log, trace_log, warn_log};
use regex::Regex;
use serde_json::Value;
#[cfg(feature = "cache")]
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::OnceLock;

/// Form actions pointing here are never intercepted.
const SESSION_PATH: &str = "/_session";

fn anchor_regex() -> &'static Regex {
    static ANCHOR: OnceLock<Regex> = OnceLock::new();
    ANCHOR.get_or_init(|| Regex::new(r"#[A-Za-z_\-:.]+").expect("static regex"))
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for a [`Navigator`].
///
/// Only the route table, the handlers, the window and the store are
/// required; every other collaborator has a default.
pub struct NavigatorBuilder {
    config: RouterConfig,
    table: RewriteTable,
    registry: HandlerRegistry,
    window: Rc<dyn Window>,
    store: Rc<dyn DocumentStore>,
    ids: Rc<dyn IdentityGenerator>,
    session: Rc<dyn SessionProvider>,
    cookies: Rc<dyn CookieJar>,
    flash: Rc<dyn FlashMessages>,
    events: Rc<EventBus>,
    base_hooks: Option<Rc<dyn ListHooks>>,
}

impl NavigatorBuilder {
    /// Router settings.
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Unique id source (default: [`UuidGenerator`]).
    pub fn identity(mut self, ids: Rc<dyn IdentityGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Session lookup (default: [`AnonymousSession`]).
    pub fn session(mut self, session: Rc<dyn SessionProvider>) -> Self {
        self.session = session;
        self
    }

    /// Cookie access (default: [`MemoryCookieJar`]).
    pub fn cookies(mut self, cookies: Rc<dyn CookieJar>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Flash-message channel (default: [`NoFlash`]).
    pub fn flash(mut self, flash: Rc<dyn FlashMessages>) -> Self {
        self.flash = flash;
        self
    }

    /// Shared event bus (default: a fresh one).
    pub fn events(mut self, events: Rc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Bottom layer for streamed list output.
    pub fn list_hooks(mut self, hooks: Rc<dyn ListHooks>) -> Self {
        self.base_hooks = Some(hooks);
        self
    }

    /// Build the navigator.
    pub fn build(self) -> Navigator {
        let sequencer = Sequencer::new(self.registry, self.store)
            .with_events(self.events)
            .with_flash(self.flash)
            .with_cookies(Rc::clone(&self.cookies));
        if let Some(hooks) = self.base_hooks {
            sequencer.set_base_hooks(hooks);
        }
        info_log!(
            "Navigator for '{}' ready with {} rewrite rules",
            self.config.app_name,
            self.table.len()
        );
        Navigator {
            #[cfg(feature = "cache")]
            match_cache: RefCell::new(MatchCache::with_capacity(self.config.match_cache_capacity)),
            config: self.config,
            table: self.table,
            window: self.window,
            ids: self.ids,
            session: self.session,
            cookies: self.cookies,
            sequencer,
            state: NavigationState::new(),
            current: CurrentRequest::new(),
        }
    }
}

// ============================================================================
// Navigator
// ============================================================================

/// Client-side rewrite router.
pub struct Navigator {
    config: RouterConfig,
    table: RewriteTable,
    #[cfg(feature = "cache")]
    match_cache: RefCell<MatchCache>,
    window: Rc<dyn Window>,
    ids: Rc<dyn IdentityGenerator>,
    session: Rc<dyn SessionProvider>,
    cookies: Rc<dyn CookieJar>,
    sequencer: Sequencer,
    state: NavigationState,
    current: CurrentRequest,
}

impl Navigator {
    /// Start building a navigator.
    pub fn builder(
        table: RewriteTable,
        registry: HandlerRegistry,
        window: Rc<dyn Window>,
        store: Rc<dyn DocumentStore>,
    ) -> NavigatorBuilder {
        NavigatorBuilder {
            config: RouterConfig::default(),
            table,
            registry,
            window,
            store,
            ids: Rc::new(UuidGenerator),
            session: Rc::new(AnonymousSession),
            cookies: Rc::new(MemoryCookieJar::new()),
            flash: Rc::new(NoFlash),
            events: Rc::new(EventBus::new()),
            base_hooks: None,
        }
    }

    /// Router settings.
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// The lifecycle event bus.
    pub fn events(&self) -> &Rc<EventBus> {
        self.sequencer.events()
    }

    /// The dispatch sequencer.
    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// Whether history entries can be pushed (known after [`init`](Self::init)).
    pub fn history_support(&self) -> bool {
        self.state.history_support()
    }

    /// The last applied history state.
    pub fn current_state(&self) -> Option<CurrentState> {
        self.state.current_state()
    }

    /// Uuid of the most recently triggered request.
    pub fn current_request(&self) -> Option<String> {
        self.current.current()
    }

    /// Cache the user context (e.g. after login), or clear it so the next
    /// request asks the session provider again.
    pub fn set_user_ctx(&self, user_ctx: Option<Value>) {
        self.state.set_user_ctx(user_ctx);
    }

    /// Match cache statistics.
    #[cfg(feature = "cache")]
    pub fn cache_stats(&self) -> CacheStats {
        self.match_cache.borrow().stats().clone()
    }

    /// Base URL of the app.
    pub fn base_url(&self) -> String {
        match &self.config.base_url {
            Some(base) => base.clone(),
            None => location::base_url(&self.window.location()),
        }
    }

    /// App URL of the current window location, without the base URL.
    pub fn current_url(&self) -> String {
        location::app_url(&self.window.location(), &self.base_url())
    }

    /// Rule matching `method` + `url`.
    pub fn resolve(&self, method: &str, url: &str) -> Option<&CompiledRule> {
        #[cfg(feature = "cache")]
        {
            let pathname = ParsedUrl::parse(url).pathname;
            let cached = self.match_cache.borrow_mut().get(method, &pathname);
            let index = match cached {
                Some(index) => index,
                None => {
                    let index = match_index(method, url, &self.table);
                    self.match_cache.borrow_mut().insert(method, &pathname, index);
                    index
                }
            };
            index.and_then(|i| self.table.get(i))
        }
        #[cfg(not(feature = "cache"))]
        {
            match_index(method, url, &self.table).and_then(|i| self.table.get(i))
        }
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Start routing.
    ///
    /// Probes history support, handles the current URL once and emits
    /// `init`.
    pub async fn init(&self) -> Result<NavigationOutcome, RouterError> {
        let supported = self.window.supports_history();
        self.state.set_history_support(supported);
        debug_log!("History support: {}", supported);

        let outcome = if supported {
            self.pop_state(None).await
        } else {
            let url = self.current_url();
            self.dispatch("GET", &url, None).await
        };
        self.events().emit(&LifecycleEvent::Init);
        outcome
    }

    /// Push a history entry for `url` and handle it.
    pub async fn navigate(
        &self,
        method: &str,
        url: &str,
        form: Option<FormData>,
    ) -> Result<NavigationOutcome, RouterError> {
        let state = HistoryState::new(method, form, self.state.next_timestamp());
        let full = format!("{}{}", self.base_url(), url);
        trace_log!("Pushing history entry '{}'", full);
        self.window.push_state(&state, &full);
        self.pop_state(Some(state)).await
    }

    /// Handle a history pop (back/forward, or the initial load with no
    /// state).
    ///
    /// A pop identical to the last one applied (same URL, timestamp and
    /// method) is ignored.
    pub async fn pop_state(&self, state: Option<HistoryState>) -> Result<NavigationOutcome, RouterError> {
        let url = self.current_url();
        let entry = match state {
            Some(state) => CurrentState {
                method: state.method,
                url,
                data: state.data,
                timestamp: Some(state.timestamp),
            },
            None => CurrentState {
                method: "GET".to_string(),
                url,
                data: None,
                timestamp: None,
            },
        };
        if !self.state.apply(entry.clone()) {
            debug_log!("Ignoring duplicate pop for '{}'", entry.url);
            return Ok(NavigationOutcome::Duplicate);
        }
        self.dispatch(&entry.method, &entry.url, entry.data).await
    }

    /// App URL a link click should be routed to, or `None` when the click
    /// belongs to the environment.
    pub fn link_target(&self, href: &str) -> Option<String> {
        if !self.state.history_support() || href.is_empty() {
            return None;
        }
        let location = self.window.location();
        if !location::is_app_url(href, &location) {
            return None;
        }
        Some(location::app_path(href, &location, &self.base_url()))
    }

    /// App URL a form submission should be routed to, or `None` when the
    /// submission belongs to the environment.
    ///
    /// A missing action submits to the current URL. `/_session` is never
    /// intercepted.
    pub fn form_target(&self, action: Option<&str>) -> Option<String> {
        if !self.state.history_support() {
            return None;
        }
        let location = self.window.location();
        let action = match action.filter(|a| !a.is_empty()) {
            Some(action) => action.to_string(),
            None => self.current_url(),
        };
        if action == SESSION_PATH || !location::is_app_url(&action, &location) {
            return None;
        }
        Some(location::app_path(&action, &location, &self.base_url()))
    }

    /// Handle a link click. `Skipped` means the environment should follow
    /// the link itself.
    pub async fn on_link_click(&self, href: &str) -> Result<NavigationOutcome, RouterError> {
        match self.link_target(href) {
            Some(url) => self.navigate("GET", &url, None).await,
            None => Ok(NavigationOutcome::Skipped),
        }
    }

    /// Handle a form submission. `Skipped` means the environment should
    /// submit the form itself.
    pub async fn on_form_submit(
        &self,
        action: Option<&str>,
        method: &str,
        fields: FormData,
    ) -> Result<NavigationOutcome, RouterError> {
        match self.form_target(action) {
            Some(url) => self.navigate(&method.to_uppercase(), &url, Some(fields)).await,
            None => Ok(NavigationOutcome::Skipped),
        }
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Route one navigation to its handler.
    pub async fn dispatch(
        &self,
        method: &str,
        url: &str,
        form: Option<FormData>,
    ) -> Result<NavigationOutcome, RouterError> {
        let initial_hit = self.state.take_initial_hit();
        if !initial_hit {
            self.window.track_pageview(url);
        }

        let Some(compiled) = self.resolve(method, url) else {
            warn_log!("{} {} -> [404]", method, url);
            return Ok(self.full_page(format!("{}{}", self.base_url(), url)));
        };

        let data = form.as_ref().map(|form| serde_json::to_string(form).unwrap_or_default());
        let user_ctx = self.state.user_ctx();
        let cx = SynthesisContext::new(&*self.ids, &*self.session, &*self.cookies)
            .with_user_ctx(user_ctx.as_ref())
            .with_initial_hit(initial_hit)
            .with_id_attempts(self.config.id_attempts);
        let mut request = build_request(&cx, method, url, form, compiled)
            .await
            .map_err(|err| {
                error_log!("{} {} -> request failed: {}", method, url, err);
                err
            })?;

        let path = request.path.join("/");
        info_log!(
            "{} {} -> {} {}{}",
            method,
            url,
            serde_json::to_string(&path).unwrap_or_default(),
            request.query.to_json(),
            data.map(|data| format!(" data: {}", data)).unwrap_or_default()
        );
        self.current.publish(&request.uuid);

        let Some(kind) = request.path.first().and_then(|marker| HandlerKind::from_marker(marker)) else {
            warn_log!("Unknown rewrite target: {}", path);
            let target = format!("{}/_db/_design/{}/{}", self.base_url(), self.config.app_name, path);
            return Ok(self.full_page(target));
        };

        let completion = self
            .sequencer
            .run_resource(kind, &mut request, &self.current)
            .await
            .map_err(|err| {
                error_log!("{} {} -> {} failed: {}", method, url, kind, err);
                err
            })?;
        if completion.is_discarded() {
            return Ok(NavigationOutcome::Discarded { uuid: request.uuid });
        }

        self.scroll_to_anchor(url);
        Ok(NavigationOutcome::Rendered { kind, path })
    }

    fn full_page(&self, url: String) -> NavigationOutcome {
        debug_log!("redirecting to: {}", url);
        self.window.assign(&url);
        NavigationOutcome::FullPage { url }
    }

    /// In-page anchors are handled here because the router owns the URL.
    fn scroll_to_anchor(&self, url: &str) {
        let Some(hash) = ParsedUrl::parse(url).hash else {
            return;
        };
        if anchor_regex().is_match(&hash) {
            if let Some(top) = self.window.element_offset_top(&hash[1..]) {
                self.window.scroll_to(0.0, top);
            }
        } else if hash == "#" {
            self.window.scroll_to(0.0, 0.0);
        }
    }
}

impl std::fmt::Debug for Navigator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Navigator")
            .field("config", &self.config)
            .field("rules", &self.table.len())
            .field("history_support", &self.state.history_support())
            .field("current_request", &self.current.current())
            .finish_non_exhaustive()
    }
}
