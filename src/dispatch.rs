//! Dispatch sequencing.
//!
//! The [`Sequencer`] runs show, list and update handlers and reports every
//! step on the [`EventBus`]. There are two layers:
//!
//! - `run_show` / `run_list` / `run_update`: run a handler against an
//!   already fetched document or view, normalize its reply and emit
//!   `beforeRequest`, `beforeResponseStart` and `beforeResponseData`.
//! - `show_resource` / `list_resource` / `update_resource`: emit
//!   `beforeResource`, fetch the document or view, check that the request is
//!   still current, run the handler, emit `afterResponse` and apply the
//!   result (`Set-Cookie`, outgoing flash messages).
//!
//! # List precedence
//!
//! A list handler may call `start`, `send` and `get_row` on its
//! [`ListContext`](crate::hooks::ListContext), and also return a value. The
//! response handed back is decided as follows:
//!
//! | Returned | `start` called | Result |
//! |----------|----------------|--------|
//! | response | no | the returned response (implicit start) |
//! | response | yes | the started response, with every sent chunk; the returned headers override the started ones |
//! | body | no | `{ code: 200, body }` |
//! | body | yes | the started response, body appended |
//! | nothing | no | `{ code: 200 }` |
//! | nothing | yes | the started response |
//!
//! Every outcome ends with one `beforeResponseData` event carrying the final
//! chunk (`""` when nothing was returned).
//!
//! Chunks sent before `start` have no response to go into and are dropped
//! with a warning.

use crate::environment::{CookieJar, DocumentStore, FlashMessages, MemoryCookieJar, NoFlash, ViewResult};
use crate::error::{ConfigurationError, DispatchError, FetchError, RouterError};
use crate::handlers::{HandlerRef, HandlerRegistry, Head, ListFn, ShowFn, UpdateFn};
use crate::hooks::{DefaultHooks, Interceptor, ListContext, ListHooks, ViewLayer};
use crate::lifecycle::{EventBus, HandlerKind, LifecycleEvent, ResponseInfo};
use crate::request::Request;
use crate::response::{Reply, Response};
use crate::state::CurrentRequest;
use crate::{debug_log, trace_log};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// Result of a resource dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// A show handler ran.
    Shown(Response),
    /// A list handler ran.
    Listed(Response),
    /// An update handler ran; `None` when it returned nothing.
    Updated(Option<(Option<Value>, Response)>),
    /// A newer request took over while the resource was being fetched.
    Discarded,
}

impl Completion {
    /// The response produced, if any.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Completion::Shown(response) | Completion::Listed(response) => Some(response),
            Completion::Updated(result) => result.as_ref().map(|(_, response)| response),
            Completion::Discarded => None,
        }
    }

    /// Return `true` if the completion was dropped as stale.
    pub fn is_discarded(&self) -> bool {
        matches!(self, Completion::Discarded)
    }
}

/// Runs handlers and sequences their lifecycle events.
pub struct Sequencer {
    registry: HandlerRegistry,
    store: Rc<dyn DocumentStore>,
    events: Rc<EventBus>,
    flash: Rc<dyn FlashMessages>,
    cookies: Rc<dyn CookieJar>,
    base_hooks: RefCell<Rc<dyn ListHooks>>,
}

impl Sequencer {
    /// Sequencer with a fresh event bus, no flash messages and an in-memory
    /// cookie jar.
    pub fn new(registry: HandlerRegistry, store: Rc<dyn DocumentStore>) -> Self {
        Self {
            registry,
            store,
            events: Rc::new(EventBus::new()),
            flash: Rc::new(NoFlash),
            cookies: Rc::new(MemoryCookieJar::new()),
            base_hooks: RefCell::new(Rc::new(DefaultHooks)),
        }
    }

    /// Use a shared event bus.
    pub fn with_events(mut self, events: Rc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Use a flash-message channel.
    pub fn with_flash(mut self, flash: Rc<dyn FlashMessages>) -> Self {
        self.flash = flash;
        self
    }

    /// Use a cookie jar.
    pub fn with_cookies(mut self, cookies: Rc<dyn CookieJar>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Replace the bottom list hook layer (where streamed output ends up).
    pub fn set_base_hooks(&self, hooks: Rc<dyn ListHooks>) {
        *self.base_hooks.borrow_mut() = hooks;
    }

    /// The event bus.
    pub fn events(&self) -> &Rc<EventBus> {
        &self.events
    }

    /// The handler registry.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    // ========================================================================
    // Handler execution
    // ========================================================================

    /// Run a show handler.
    pub fn run_show(
        &self,
        handler: &ShowFn,
        doc: Option<&Value>,
        request: &mut Request,
    ) -> Result<Response, DispatchError> {
        ensure_fresh(request)?;
        self.flash.attach_to_request(request);
        let info = ResponseInfo::for_request(HandlerRef::Show(Rc::clone(handler)), request);
        self.emit_before_request(&info, request);

        let reply = handler(doc, &*request);
        request.response_received = true;

        let response = reply.into_response();
        self.emit_start(&info, request, &response);
        self.emit_data(&info, request, &response, response.body_str());
        Ok(self.flash.merge_into_response(request, response))
    }

    /// Run an update handler.
    ///
    /// The document the handler returned is passed through untouched. When
    /// the handler returns nothing, events still fire for an empty `200`.
    pub fn run_update(
        &self,
        handler: &UpdateFn,
        doc: Option<&Value>,
        request: &mut Request,
    ) -> Result<Option<(Option<Value>, Response)>, DispatchError> {
        ensure_fresh(request)?;
        self.flash.attach_to_request(request);
        let info = ResponseInfo::for_request(HandlerRef::Update(Rc::clone(handler)), request);
        self.emit_before_request(&info, request);

        let result = handler(doc, &*request);
        request.response_received = true;

        let (doc, reply) = match result {
            Some((doc, reply)) => (Some(doc), reply),
            None => (None, Reply::Empty),
        };
        let response = reply.into_response();
        self.emit_start(&info, request, &response);
        self.emit_data(&info, request, &response, response.body_str());

        Ok(doc.map(|doc| (doc, self.flash.merge_into_response(request, response))))
    }

    /// Run a list handler on top of the `outer` hook layer.
    ///
    /// See the module docs for how the result is chosen.
    pub fn run_list(
        &self,
        handler: &ListFn,
        head: &Head,
        request: &mut Request,
        outer: &dyn ListHooks,
    ) -> Result<Response, DispatchError> {
        ensure_fresh(request)?;
        self.flash.attach_to_request(request);
        let info = ResponseInfo::for_request(HandlerRef::List(Rc::clone(handler)), request);
        self.emit_before_request(&info, request);

        let (reply, started) = {
            let request = &*request;
            let interceptor = Interceptor::new(outer, &info, request, &self.events, &*self.flash);
            trace_log!("Intercepting list hooks for '{}'", info.name);
            let reply = handler(head, request, &ListContext::new(&interceptor));
            (reply, interceptor.take_started())
        };
        request.response_received = true;

        let response = match (reply, started) {
            (Reply::Response(response), None) => {
                self.emit_start(&info, request, &response);
                self.emit_data(&info, request, &response, response.body_str());
                self.flash.merge_into_response(request, response)
            }
            (Reply::Response(returned), Some(mut started)) => {
                started.headers.extend(returned.headers);
                self.emit_data(&info, request, &started, started.body_str());
                started
            }
            (Reply::Body(body), None) => {
                let response = Response::ok(body);
                self.emit_start(&info, request, &response);
                self.emit_data(&info, request, &response, response.body_str());
                self.flash.merge_into_response(request, response)
            }
            (Reply::Body(body), Some(mut started)) => {
                started.append_body(&body);
                self.emit_data(&info, request, &started, &body);
                started
            }
            (Reply::Empty, None) => {
                let response = Response::new(200);
                self.emit_start(&info, request, &response);
                self.emit_data(&info, request, &response, "");
                self.flash.merge_into_response(request, response)
            }
            (Reply::Empty, Some(started)) => {
                self.emit_data(&info, request, &started, "");
                started
            }
        };
        Ok(response)
    }

    // ========================================================================
    // Resource dispatch
    // ========================================================================

    /// Dispatch by handler kind, using `request.name()` and
    /// `request.target()`.
    pub async fn run_resource(
        &self,
        kind: HandlerKind,
        request: &mut Request,
        current: &CurrentRequest,
    ) -> Result<Completion, RouterError> {
        let name = request.name().unwrap_or_default().to_string();
        let target = request.target();
        match kind {
            HandlerKind::Show => self.show_resource(request, &name, &target, current).await,
            HandlerKind::List => self.list_resource(request, &name, &target, current).await,
            HandlerKind::Update => self.update_resource(request, &name, &target, current).await,
        }
    }

    /// Fetch `docid` (when given) and run the show handler `name`.
    pub async fn show_resource(
        &self,
        request: &mut Request,
        name: &str,
        docid: &str,
        current: &CurrentRequest,
    ) -> Result<Completion, RouterError> {
        let handler = self.registry.get_show(name)?;
        let info = ResponseInfo::for_resource(HandlerRef::Show(Rc::clone(&handler)), name, docid, &request.query);
        self.events.emit(&LifecycleEvent::BeforeResource { info: &info });

        let Some(doc) = self.fetch_document(request, docid, current).await? else {
            return Ok(Completion::Discarded);
        };

        let response = self.run_show(&handler, doc.as_ref(), request)?;
        self.emit_after(&info, request, Some(&response));
        self.apply_response(request, Some(&response));
        Ok(Completion::Shown(response))
    }

    /// Fetch `docid` (when given) and run the update handler `name`.
    pub async fn update_resource(
        &self,
        request: &mut Request,
        name: &str,
        docid: &str,
        current: &CurrentRequest,
    ) -> Result<Completion, RouterError> {
        let handler = self.registry.get_update(name)?;
        let info = ResponseInfo::for_resource(HandlerRef::Update(Rc::clone(&handler)), name, docid, &request.query);
        self.events.emit(&LifecycleEvent::BeforeResource { info: &info });

        let Some(doc) = self.fetch_document(request, docid, current).await? else {
            return Ok(Completion::Discarded);
        };

        let result = self.run_update(&handler, doc.as_ref(), request)?;
        let response = result.as_ref().map(|(_, response)| response);
        self.emit_after(&info, request, response);
        self.apply_response(request, response);
        Ok(Completion::Updated(result))
    }

    /// Query `view` and run the list handler `name` over its rows.
    pub async fn list_resource(
        &self,
        request: &mut Request,
        name: &str,
        view: &str,
        current: &CurrentRequest,
    ) -> Result<Completion, RouterError> {
        let handler = self.registry.get_list(name)?;
        let info = ResponseInfo::for_resource(HandlerRef::List(Rc::clone(&handler)), name, view, &request.query);
        self.events.emit(&LifecycleEvent::BeforeResource { info: &info });

        if view.is_empty() {
            return Err(ConfigurationError::NoView { name: name.to_string() }.into());
        }
        // the head passed to the list handler carries update_seq
        request.query.insert("update_seq", "true");

        let fetched = self.store.get_view(view, &request.query).await;
        if !current.is_current(&request.uuid) {
            debug_log!("Discarding stale list '{}' for request {}", name, request.uuid);
            return Ok(Completion::Discarded);
        }
        let ViewResult { rows, head } = fetched.map_err(|source| FetchError::View {
            path: view.to_string(),
            source,
        })?;

        let base = Rc::clone(&*self.base_hooks.borrow());
        let response = {
            let layer = ViewLayer::new(rows, &*self.cookies, &*base);
            self.run_list(&handler, &head, request, &layer)?
        };
        self.emit_after(&info, request, Some(&response));
        self.apply_response(request, Some(&response));
        Ok(Completion::Listed(response))
    }

    /// Fetch a document for a show or update.
    ///
    /// `Ok(None)` means the request went stale while waiting; `Ok(Some(None))`
    /// means there was nothing to fetch.
    async fn fetch_document(
        &self,
        request: &Request,
        docid: &str,
        current: &CurrentRequest,
    ) -> Result<Option<Option<Value>>, FetchError> {
        if docid.is_empty() {
            return Ok(Some(None));
        }
        let fetched = self.store.get_document(docid, &request.query).await;
        if !current.is_current(&request.uuid) {
            debug_log!("Discarding stale fetch of '{}' for request {}", docid, request.uuid);
            return Ok(None);
        }
        fetched
            .map(|doc| Some(Some(doc)))
            .map_err(|source| FetchError::Document {
                id: docid.to_string(),
                source,
            })
    }

    /// Store `Set-Cookie`, or persist outgoing flash messages when there is
    /// no response to carry them.
    fn apply_response(&self, request: &Request, response: Option<&Response>) {
        match response {
            Some(response) => {
                if let Some(raw) = response.set_cookie() {
                    self.cookies.write_cookie(raw);
                }
            }
            None => {
                let outgoing = request.outgoing_flash_messages();
                if !outgoing.is_empty() {
                    self.flash.persist_outgoing(request, &outgoing);
                }
            }
        }
    }

    // ========================================================================
    // Events
    // ========================================================================

    fn emit_before_request(&self, info: &ResponseInfo, request: &Request) {
        self.events.emit(&LifecycleEvent::BeforeRequest { info, request });
    }

    fn emit_start(&self, info: &ResponseInfo, request: &Request, response: &Response) {
        self.events.emit(&LifecycleEvent::BeforeResponseStart {
            info,
            request,
            response,
        });
    }

    fn emit_data(&self, info: &ResponseInfo, request: &Request, response: &Response, chunk: &str) {
        self.events.emit(&LifecycleEvent::BeforeResponseData {
            info,
            request,
            response,
            chunk,
        });
    }

    fn emit_after(&self, info: &ResponseInfo, request: &Request, response: Option<&Response>) {
        self.events.emit(&LifecycleEvent::AfterResponse {
            info,
            request,
            response,
        });
    }
}

impl std::fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("registry", &self.registry)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

fn ensure_fresh(request: &Request) -> Result<(), DispatchError> {
    if request.response_received {
        return Err(DispatchError::ResponseAlreadyReceived {
            uuid: request.uuid.clone(),
        });
    }
    Ok(())
}
