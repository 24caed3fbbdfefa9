//! Lifecycle notifications.
//!
//! Every dispatch reports its progress on an [`EventBus`]. Listeners run
//! synchronously, in registration order, and cannot influence the dispatch.
//!
//! # Event order
//!
//! For a show or update dispatch:
//!
//! 1. `beforeResource`: handler selected, resource not yet fetched
//! 2. `beforeRequest`: resource fetched, handler about to run
//! 3. `beforeResponseStart`: response normalized
//! 4. `beforeResponseData`: body (or `""`)
//! 5. `afterResponse`: result applied
//!
//! List dispatches emit `beforeResponseStart` once and
//! `beforeResponseData` once per streamed chunk. `init` is emitted once by
//! [`Navigator::init`](crate::navigator::Navigator::init).
//!
//! A request that is overtaken by a newer navigation while its resource is
//! being fetched emits `beforeResource` and nothing after it.

use crate::handlers::HandlerRef;
use crate::params::Query;
use crate::request::Request;
use crate::response::Response;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

// ============================================================================
// HandlerKind
// ============================================================================

/// The three handler kinds, selected by the first segment of the
/// rewritten path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// `_show/<name>/<docid>`
    Show,
    /// `_list/<name>/<view>`
    List,
    /// `_update/<name>/<docid>`
    Update,
}

impl HandlerKind {
    /// Kind for a path marker, if it is one.
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "_show" => Some(HandlerKind::Show),
            "_list" => Some(HandlerKind::List),
            "_update" => Some(HandlerKind::Update),
            _ => None,
        }
    }

    /// The path marker for this kind.
    pub fn marker(self) -> &'static str {
        match self {
            HandlerKind::Show => "_show",
            HandlerKind::List => "_list",
            HandlerKind::Update => "_update",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandlerKind::Show => "show",
            HandlerKind::List => "list",
            HandlerKind::Update => "update",
        };
        f.write_str(name)
    }
}

// ============================================================================
// ResponseInfo
// ============================================================================

/// What is being dispatched. Carried by every lifecycle event.
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    /// Handler kind.
    pub kind: HandlerKind,
    /// Handler name.
    pub name: String,
    /// Document id or view path; `None` when absent.
    pub target: Option<String>,
    /// Request query at the time the info was built.
    pub query: Query,
    /// The handler that runs.
    pub handler: HandlerRef,
}

impl ResponseInfo {
    /// Info for a resource about to be fetched.
    pub fn for_resource(handler: HandlerRef, name: &str, target: &str, query: &Query) -> Self {
        Self {
            kind: handler.kind(),
            name: name.to_string(),
            target: (!target.is_empty()).then(|| target.to_string()),
            query: query.clone(),
            handler,
        }
    }

    /// Info derived from the request path (`path[1]`, `path[2]`).
    pub fn for_request(handler: HandlerRef, request: &Request) -> Self {
        Self {
            kind: handler.kind(),
            name: request.name().unwrap_or_default().to_string(),
            target: request.path.get(2).cloned(),
            query: request.query.clone(),
            handler,
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// A lifecycle notification.
#[derive(Debug, Clone, Copy)]
pub enum LifecycleEvent<'a> {
    /// The router finished starting up.
    Init,
    /// A handler was selected; its resource is about to be fetched.
    BeforeResource {
        /// Dispatch info.
        info: &'a ResponseInfo,
    },
    /// The handler is about to run.
    BeforeRequest {
        /// Dispatch info.
        info: &'a ResponseInfo,
        /// Request passed to the handler.
        request: &'a Request,
    },
    /// A response has started.
    BeforeResponseStart {
        /// Dispatch info.
        info: &'a ResponseInfo,
        /// Request.
        request: &'a Request,
        /// Response as started.
        response: &'a Response,
    },
    /// Response data was produced.
    BeforeResponseData {
        /// Dispatch info.
        info: &'a ResponseInfo,
        /// Request.
        request: &'a Request,
        /// Response so far.
        response: &'a Response,
        /// The data produced by this step.
        chunk: &'a str,
    },
    /// The dispatch finished and its result was applied.
    AfterResponse {
        /// Dispatch info.
        info: &'a ResponseInfo,
        /// Request.
        request: &'a Request,
        /// Final response; `None` when the handler produced none.
        response: Option<&'a Response>,
    },
}

impl LifecycleEvent<'_> {
    /// Event name as listeners know it.
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Init => "init",
            LifecycleEvent::BeforeResource { .. } => "beforeResource",
            LifecycleEvent::BeforeRequest { .. } => "beforeRequest",
            LifecycleEvent::BeforeResponseStart { .. } => "beforeResponseStart",
            LifecycleEvent::BeforeResponseData { .. } => "beforeResponseData",
            LifecycleEvent::AfterResponse { .. } => "afterResponse",
        }
    }

    /// Dispatch info, for every event except `init`.
    pub fn info(&self) -> Option<&ResponseInfo> {
        match self {
            LifecycleEvent::Init => None,
            LifecycleEvent::BeforeResource { info }
            | LifecycleEvent::BeforeRequest { info, .. }
            | LifecycleEvent::BeforeResponseStart { info, .. }
            | LifecycleEvent::BeforeResponseData { info, .. }
            | LifecycleEvent::AfterResponse { info, .. } => Some(info),
        }
    }
}

type Listener = Rc<dyn Fn(&LifecycleEvent<'_>)>;

/// Ordered, synchronous, fire-and-forget event bus.
#[derive(Default)]
pub struct EventBus {
    listeners: RefCell<Vec<Listener>>,
}

impl EventBus {
    /// Create a bus without listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for all events.
    pub fn on<F>(&self, listener: F)
    where
        F: Fn(&LifecycleEvent<'_>) + 'static,
    {
        self.listeners.borrow_mut().push(Rc::new(listener));
    }

    /// Deliver an event to every listener, in registration order.
    ///
    /// Listeners registered while an event is being delivered only see
    /// later events.
    pub fn emit(&self, event: &LifecycleEvent<'_>) {
        let listeners = self.listeners.borrow().clone();
        for listener in &listeners {
            listener(event);
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Return `true` if nobody is listening.
    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.len())
            .finish()
    }
}
