//! Layered list hooks.
//!
//! A list handler streams its output through three hooks: `start` (begin a
//! response), `send` (append a chunk) and `get_row` (pull the next view row).
//! The hooks form a stack of layers, each borrowing the layer beneath it:
//!
//! ```text
//! ListContext ─► intercepting layer   (events, flash, accumulation)
//!                 └─► view layer      (fetched rows, Set-Cookie)
//!                      └─► base hooks (DefaultHooks or an app sink)
//! ```
//!
//! Layers live on the stack of the dispatch that installed them. When that
//! dispatch returns (or unwinds) they are dropped and whatever was bound
//! before is in effect again; no global rebinding takes place.

use crate::environment::{CookieJar, FlashMessages};
use crate::lifecycle::{EventBus, LifecycleEvent, ResponseInfo};
use crate::request::Request;
use crate::response::Response;
use crate::{trace_log, warn_log};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::VecDeque;

/// One layer of list hooks.
pub trait ListHooks {
    /// Begin the response.
    fn start(&self, response: Response);

    /// Emit a chunk of body data.
    fn send(&self, chunk: &str);

    /// Next view row, or `None` when the rows are exhausted.
    fn get_row(&self) -> Option<Value>;
}

/// Bottom layer: accepts everything, has no rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl ListHooks for DefaultHooks {
    fn start(&self, _response: Response) {}

    fn send(&self, _chunk: &str) {}

    fn get_row(&self) -> Option<Value> {
        None
    }
}

/// Hooks as seen by a list handler.
#[derive(Clone, Copy)]
pub struct ListContext<'a> {
    hooks: &'a dyn ListHooks,
}

impl<'a> ListContext<'a> {
    /// Wrap a hook layer.
    pub fn new(hooks: &'a dyn ListHooks) -> Self {
        Self { hooks }
    }

    /// Begin the response with status and headers (and optionally a body).
    pub fn start(&self, response: Response) {
        self.hooks.start(response);
    }

    /// Append a chunk to the response body.
    pub fn send(&self, chunk: &str) {
        self.hooks.send(chunk);
    }

    /// Next row of the view result.
    pub fn get_row(&self) -> Option<Value> {
        self.hooks.get_row()
    }
}

impl std::fmt::Debug for ListContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListContext").finish_non_exhaustive()
    }
}

// ============================================================================
// View layer
// ============================================================================

/// Serves the rows of a fetched view and applies `Set-Cookie` from the
/// started response.
pub(crate) struct ViewLayer<'a> {
    rows: RefCell<VecDeque<Value>>,
    cookies: &'a dyn CookieJar,
    outer: &'a dyn ListHooks,
}

impl<'a> ViewLayer<'a> {
    pub(crate) fn new(rows: Vec<Value>, cookies: &'a dyn CookieJar, outer: &'a dyn ListHooks) -> Self {
        trace_log!("Installing view layer with {} rows", rows.len());
        Self {
            rows: RefCell::new(rows.into()),
            cookies,
            outer,
        }
    }
}

impl ListHooks for ViewLayer<'_> {
    fn start(&self, response: Response) {
        if let Some(raw) = response.set_cookie() {
            self.cookies.write_cookie(raw);
        }
        self.outer.start(response);
    }

    fn send(&self, chunk: &str) {
        self.outer.send(chunk);
    }

    fn get_row(&self) -> Option<Value> {
        self.rows.borrow_mut().pop_front()
    }
}

// ============================================================================
// Intercepting layer
// ============================================================================

/// Records the started response, accumulates sent chunks and reports both
/// on the event bus.
pub(crate) struct Interceptor<'a> {
    outer: &'a dyn ListHooks,
    info: &'a ResponseInfo,
    request: &'a Request,
    events: &'a EventBus,
    flash: &'a dyn FlashMessages,
    started: RefCell<Option<Response>>,
}

impl<'a> Interceptor<'a> {
    pub(crate) fn new(
        outer: &'a dyn ListHooks,
        info: &'a ResponseInfo,
        request: &'a Request,
        events: &'a EventBus,
        flash: &'a dyn FlashMessages,
    ) -> Self {
        Self {
            outer,
            info,
            request,
            events,
            flash,
            started: RefCell::new(None),
        }
    }

    /// The response recorded by `start`, with every chunk sent since.
    pub(crate) fn take_started(&self) -> Option<Response> {
        self.started.borrow_mut().take()
    }

    pub(crate) fn emit_start(&self, response: &Response) {
        self.events.emit(&LifecycleEvent::BeforeResponseStart {
            info: self.info,
            request: self.request,
            response,
        });
    }

    pub(crate) fn emit_data(&self, response: &Response, chunk: &str) {
        self.events.emit(&LifecycleEvent::BeforeResponseData {
            info: self.info,
            request: self.request,
            response,
            chunk,
        });
    }
}

impl ListHooks for Interceptor<'_> {
    fn start(&self, response: Response) {
        self.emit_start(&response);
        if let Some(body) = response.body.as_deref().filter(|body| !body.is_empty()) {
            self.emit_data(&response, body);
        }
        let merged = self.flash.merge_into_response(self.request, response);
        *self.started.borrow_mut() = Some(merged.clone());
        self.outer.start(merged);
    }

    fn send(&self, chunk: &str) {
        let mut started = self.started.borrow_mut();
        let Some(response) = started.as_mut() else {
            warn_log!(
                "list '{}' sent {} bytes before start; chunk dropped",
                self.info.name,
                chunk.len()
            );
            return;
        };
        response.append_body(chunk);
        self.emit_data(response, chunk);
        drop(started);
        self.outer.send(chunk);
    }

    fn get_row(&self) -> Option<Value> {
        self.outer.get_row()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::MemoryCookieJar;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<String>>,
    }

    impl ListHooks for Recorder {
        fn start(&self, response: Response) {
            self.calls.borrow_mut().push(format!("start {}", response.code));
        }

        fn send(&self, chunk: &str) {
            self.calls.borrow_mut().push(format!("send {}", chunk));
        }

        fn get_row(&self) -> Option<Value> {
            Some(Value::from("outer"))
        }
    }

    #[test]
    fn test_default_hooks() {
        let cx = ListContext::new(&DefaultHooks);
        cx.start(Response::new(200));
        cx.send("ignored");
        assert_eq!(cx.get_row(), None);
    }

    #[test]
    fn test_view_layer_rows_then_none() {
        let jar = MemoryCookieJar::new();
        let outer = Recorder::default();
        let layer = ViewLayer::new(vec![Value::from(1), Value::from(2)], &jar, &outer);

        assert_eq!(layer.get_row(), Some(Value::from(1)));
        assert_eq!(layer.get_row(), Some(Value::from(2)));
        assert_eq!(layer.get_row(), None);
        assert_eq!(layer.get_row(), None);
    }

    #[test]
    fn test_view_layer_applies_set_cookie() {
        let jar = MemoryCookieJar::new();
        let outer = Recorder::default();
        let layer = ViewLayer::new(Vec::new(), &jar, &outer);

        layer.start(Response::new(200).with_header("Set-Cookie", "seen=1; Path=/"));
        layer.send("x");

        assert_eq!(jar.read_cookies().get("seen").map(String::as_str), Some("1"));
        assert_eq!(*outer.calls.borrow(), vec!["start 200", "send x"]);
    }

    #[test]
    fn test_layers_restore_on_scope_exit() {
        let outer = Recorder::default();
        {
            let jar = MemoryCookieJar::new();
            let layer = ViewLayer::new(vec![Value::from("inner")], &jar, &outer);
            assert_eq!(ListContext::new(&layer).get_row(), Some(Value::from("inner")));
        }
        assert_eq!(ListContext::new(&outer).get_row(), Some(Value::from("outer")));
    }
}
