//! Test utilities for navigator tests
//!
//! Fake collaborators (window, store, ids, flash) and event recording
//! helpers shared by the integration tests.

#![allow(dead_code)]

use futures::channel::oneshot;
use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use rewrite_navigator::*;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

pub const ORIGIN: &str = "http://localhost:5984";
pub const BASE: &str = "/db/_design/app/_rewrite";

/// Initialize logging for tests (safe to call more than once).
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Window
// ============================================================================

/// Window whose location follows `push_state` and which records every side
/// effect.
pub struct FakeWindow {
    pub location: RefCell<String>,
    pub history: bool,
    pub pushed: RefCell<Vec<(HistoryState, String)>>,
    pub assigned: RefCell<Vec<String>>,
    pub scrolls: RefCell<Vec<(f64, f64)>>,
    pub pageviews: RefCell<Vec<String>>,
    pub elements: BTreeMap<String, f64>,
}

impl FakeWindow {
    /// Window at `BASE + app_url`, with history support.
    pub fn at(app_url: &str) -> Self {
        Self {
            location: RefCell::new(format!("{}{}{}", ORIGIN, BASE, app_url)),
            history: true,
            pushed: RefCell::new(Vec::new()),
            assigned: RefCell::new(Vec::new()),
            scrolls: RefCell::new(Vec::new()),
            pageviews: RefCell::new(Vec::new()),
            elements: BTreeMap::new(),
        }
    }

    /// Window at an arbitrary absolute location.
    pub fn located(location: &str) -> Self {
        let window = Self::at("");
        *window.location.borrow_mut() = location.to_string();
        window
    }

    pub fn without_history(mut self) -> Self {
        self.history = false;
        self
    }

    pub fn with_element(mut self, id: &str, top: f64) -> Self {
        self.elements.insert(id.to_string(), top);
        self
    }
}

impl Window for FakeWindow {
    fn location(&self) -> String {
        self.location.borrow().clone()
    }

    fn supports_history(&self) -> bool {
        self.history
    }

    fn push_state(&self, state: &HistoryState, url: &str) {
        self.pushed.borrow_mut().push((state.clone(), url.to_string()));
        *self.location.borrow_mut() = format!("{}{}", ORIGIN, url);
    }

    fn assign(&self, url: &str) {
        self.assigned.borrow_mut().push(url.to_string());
    }

    fn scroll_to(&self, x: f64, y: f64) {
        self.scrolls.borrow_mut().push((x, y));
    }

    fn element_offset_top(&self, id: &str) -> Option<f64> {
        self.elements.get(id).copied()
    }

    fn track_pageview(&self, url: &str) {
        self.pageviews.borrow_mut().push(url.to_string());
    }
}

// ============================================================================
// Store
// ============================================================================

/// In-memory store. A gated id or view waits for its gate before answering.
#[derive(Default)]
pub struct FakeStore {
    pub docs: BTreeMap<String, Value>,
    pub views: BTreeMap<String, Value>,
    pub gates: RefCell<BTreeMap<String, oneshot::Receiver<()>>>,
    pub requests: RefCell<Vec<(String, Query)>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_doc(mut self, id: &str, doc: Value) -> Self {
        self.docs.insert(id.to_string(), doc);
        self
    }

    pub fn with_view(mut self, path: &str, result: Value) -> Self {
        self.views.insert(path.to_string(), result);
        self
    }

    /// Hold fetches of `key` until the returned sender fires.
    pub fn gate(&self, key: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.borrow_mut().insert(key.to_string(), rx);
        tx
    }

    fn wait_for(&self, key: &str) -> Option<oneshot::Receiver<()>> {
        self.gates.borrow_mut().remove(key)
    }
}

impl DocumentStore for FakeStore {
    fn get_document<'a>(&'a self, id: &'a str, query: &'a Query) -> LocalBoxFuture<'a, Result<Value, BoxError>> {
        self.requests.borrow_mut().push((id.to_string(), query.clone()));
        let gate = self.wait_for(id);
        async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            self.docs
                .get(id)
                .cloned()
                .ok_or_else(|| BoxError::from(format!("not_found: {}", id)))
        }
        .boxed_local()
    }

    fn get_view<'a>(&'a self, path: &'a str, query: &'a Query) -> LocalBoxFuture<'a, Result<ViewResult, BoxError>> {
        self.requests.borrow_mut().push((path.to_string(), query.clone()));
        let gate = self.wait_for(path);
        async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            match self.views.get(path) {
                Some(raw) => ViewResult::from_value(raw.clone()).map_err(BoxError::from),
                None => Err(BoxError::from(format!("not_found: {}", path))),
            }
        }
        .boxed_local()
    }
}

// ============================================================================
// Identity, flash, hooks
// ============================================================================

/// Sequential ids: `req-1`, `req-2`, ...; fails when `exhausted`.
#[derive(Default)]
pub struct FakeIds {
    pub next: Cell<usize>,
    pub exhausted: bool,
}

impl IdentityGenerator for FakeIds {
    fn request_unique_id(&self, attempts: usize) -> LocalBoxFuture<'_, Result<String, ExhaustedError>> {
        if self.exhausted {
            return future::ready(Err(ExhaustedError { attempts })).boxed_local();
        }
        self.next.set(self.next.get() + 1);
        future::ready(Ok(format!("req-{}", self.next.get()))).boxed_local()
    }
}

/// Flash channel that hands out fixed incoming messages and records what
/// was persisted.
#[derive(Default)]
pub struct FakeFlash {
    pub incoming: Vec<Value>,
    pub persisted: RefCell<Vec<Vec<Value>>>,
    pub merged: Cell<usize>,
}

impl FlashMessages for FakeFlash {
    fn attach_to_request(&self, request: &mut Request) {
        request.flash_messages = self.incoming.clone();
    }

    fn merge_into_response(&self, request: &Request, response: Response) -> Response {
        self.merged.set(self.merged.get() + 1);
        let outgoing = request.outgoing_flash_messages();
        if outgoing.is_empty() {
            return response;
        }
        let cookie = format!("_flash={}", serde_json::to_string(&outgoing).unwrap_or_default());
        response.with_header("Set-Cookie", cookie)
    }

    fn persist_outgoing(&self, _request: &Request, messages: &[Value]) {
        self.persisted.borrow_mut().push(messages.to_vec());
    }
}

/// Bottom list layer recording streamed output.
#[derive(Default)]
pub struct RecordingHooks {
    pub calls: RefCell<Vec<String>>,
}

impl ListHooks for RecordingHooks {
    fn start(&self, response: Response) {
        self.calls.borrow_mut().push(format!("start {}", response.code));
    }

    fn send(&self, chunk: &str) {
        self.calls.borrow_mut().push(format!("send {}", chunk));
    }

    fn get_row(&self) -> Option<Value> {
        None
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Record event names; data events as `data:<chunk>`, events carrying
/// info as `<name>:<handler name>`.
pub fn record_events(events: &EventBus) -> Rc<RefCell<Vec<String>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    events.on(move |event| {
        let entry = match event {
            LifecycleEvent::Init => "init".to_string(),
            LifecycleEvent::BeforeResponseData { chunk, .. } => format!("data:{}", chunk),
            other => match other.info() {
                Some(info) => format!("{}:{}", other.name(), info.name),
                None => other.name().to_string(),
            },
        };
        sink.borrow_mut().push(entry);
    });
    log
}

pub fn table(json: &str) -> RewriteTable {
    RewriteTable::from_json(json).expect("route table")
}

pub fn form(pairs: &[(&str, &str)]) -> FormData {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Standard test app: items, tags, pages, an update rule and a static
/// fallthrough.
pub const ROUTES: &str = r#"[
    { "from": "/", "to": "_show/home" },
    { "from": "/items/:id", "to": "_update/item/:id", "method": "POST" },
    { "from": "/items/:id", "to": "_show/item/:id" },
    { "from": "/tags/:tag", "to": "_list/items/app/_view/by_tag",
      "query": { "startkey": [":tag"], "endkey": [":tag", "{}"] } },
    { "from": "/empty", "to": "_list/items" },
    { "from": "/static/*", "to": "static/*" }
]"#;

pub struct App {
    pub window: Rc<FakeWindow>,
    pub store: Rc<FakeStore>,
    pub cookies: Rc<MemoryCookieJar>,
    pub flash: Rc<FakeFlash>,
    pub hooks: Rc<RecordingHooks>,
    pub navigator: Navigator,
    pub events: Rc<RefCell<Vec<String>>>,
    pub rendered: Rc<RefCell<Vec<String>>>,
}

pub fn store() -> FakeStore {
    FakeStore::new()
        .with_doc("99", serde_json::json!({ "_id": "99", "title": "Ninety-nine" }))
        .with_doc("1", serde_json::json!({ "_id": "1", "title": "One" }))
        .with_doc("2", serde_json::json!({ "_id": "2", "title": "Two" }))
        .with_view(
            "app/_view/by_tag",
            serde_json::json!({
                "total_rows": 2,
                "offset": 0,
                "rows": [
                    { "id": "1", "value": "One" },
                    { "id": "2", "value": "Two" }
                ]
            }),
        )
}

pub fn registry(rendered: &Rc<RefCell<Vec<String>>>) -> HandlerRegistry {
    let home = Rc::clone(rendered);
    let item = Rc::clone(rendered);
    let update = Rc::clone(rendered);
    let list = Rc::clone(rendered);
    HandlerRegistry::new()
        .show("home", move |_, _| {
            home.borrow_mut().push("home".to_string());
            "<h1>Home</h1>"
        })
        .show("item", move |doc, req| {
            let title = doc.and_then(|d| d["title"].as_str()).unwrap_or("?").to_string();
            item.borrow_mut().push(format!("item {}", req.query.get("id").unwrap_or("")));
            format!("<h1>{}</h1>", title)
        })
        .update("item", move |doc, req| {
            update.borrow_mut().push(format!("update {}", req.method));
            let title = req.form_value("title")?;
            let mut doc = doc.cloned().unwrap_or_default();
            doc["title"] = Value::from(title);
            Some((
                Some(doc),
                Response::ok("saved").with_header("Set-Cookie", "last_saved=99; Path=/"),
            ))
        })
        .list("items", move |head, _req, cx| {
            list.borrow_mut().push(format!("list {}", head.get("total_rows").cloned().unwrap_or_default()));
            cx.start(Response::new(200).with_header("Content-Type", "text/html"));
            cx.send("<ul>");
            while let Some(row) = cx.get_row() {
                cx.send(&format!("<li>{}</li>", row["value"].as_str().unwrap_or("")));
            }
            "</ul>"
        })
}

/// Build the standard app with the window at `BASE + app_url`.
pub fn app(window: FakeWindow) -> App {
    app_with(window, store(), FakeIds::default())
}

pub fn app_with(window: FakeWindow, store: FakeStore, ids: FakeIds) -> App {
    build_app(window, store, ids, RouterConfig::new("app"))
}

/// Standard app with custom router settings.
pub fn app_configured(window: FakeWindow, config: RouterConfig) -> App {
    build_app(window, store(), FakeIds::default(), config)
}

fn build_app(window: FakeWindow, store: FakeStore, ids: FakeIds, config: RouterConfig) -> App {
    init_logging();
    let window = Rc::new(window);
    let store = Rc::new(store);
    let cookies = Rc::new(MemoryCookieJar::new());
    let flash = Rc::new(FakeFlash::default());
    let hooks = Rc::new(RecordingHooks::default());
    let rendered = Rc::new(RefCell::new(Vec::new()));

    let navigator = Navigator::builder(table(ROUTES), registry(&rendered), window.clone(), store.clone())
        .config(config)
        .identity(Rc::new(ids))
        .cookies(cookies.clone())
        .flash(flash.clone())
        .list_hooks(hooks.clone())
        .build();
    let events = record_events(navigator.events());

    App {
        window,
        store,
        cookies,
        flash,
        hooks,
        navigator,
        events,
        rendered,
    }
}
