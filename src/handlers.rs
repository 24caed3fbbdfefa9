//! Handler registry.
//!
//! Handlers are registered by kind and name once, at startup. The rewritten
//! request path picks one (`_show/item/99` → show handler `item`); a name
//! that was never registered is a
//! [`ConfigurationError::UnknownHandler`](crate::error::ConfigurationError::UnknownHandler).
//!
//! # Example
//!
//! ```
//! use rewrite_navigator::handlers::HandlerRegistry;
//! use rewrite_navigator::response::Response;
//!
//! let registry = HandlerRegistry::new()
//!     .show("item", |doc, _req| match doc {
//!         Some(doc) => format!("<h1>{}</h1>", doc["title"]),
//!         None => "no item".to_string(),
//!     })
//!     .list("items", |_head, _req, cx| {
//!         cx.start(Response::new(200));
//!         while let Some(row) = cx.get_row() {
//!             cx.send(&format!("<li>{}</li>", row["id"]));
//!         }
//!     })
//!     .update("item", |doc, req| {
//!         let mut doc = doc.cloned().unwrap_or_default();
//!         doc["title"] = req.form_value("title").unwrap_or_default().into();
//!         Some((Some(doc), "saved"))
//!     });
//!
//! assert!(registry.get_show("item").is_ok());
//! assert!(registry.get_list("missing").is_err());
//! ```

use crate::error::ConfigurationError;
use crate::hooks::ListContext;
use crate::lifecycle::HandlerKind;
use crate::request::Request;
use crate::response::Reply;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// View head passed to list handlers (the view result without `rows`).
pub type Head = Map<String, Value>;

/// Show handler: `(doc, request) -> reply`.
pub type ShowFn = Rc<dyn Fn(Option<&Value>, &Request) -> Reply>;

/// List handler: `(head, request, hooks) -> reply`.
pub type ListFn = Rc<dyn Fn(&Head, &Request, &ListContext<'_>) -> Reply>;

/// Update handler: `(doc, request) -> Some((doc to persist, reply))`.
pub type UpdateFn = Rc<dyn Fn(Option<&Value>, &Request) -> Option<(Option<Value>, Reply)>>;

/// A registered handler of any kind.
#[derive(Clone)]
pub enum HandlerRef {
    /// Show handler.
    Show(ShowFn),
    /// List handler.
    List(ListFn),
    /// Update handler.
    Update(UpdateFn),
}

impl HandlerRef {
    /// Kind of the handler.
    pub fn kind(&self) -> HandlerKind {
        match self {
            HandlerRef::Show(_) => HandlerKind::Show,
            HandlerRef::List(_) => HandlerKind::List,
            HandlerRef::Update(_) => HandlerKind::Update,
        }
    }
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerRef::{:?}", self.kind())
    }
}

/// Handlers by kind and name.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    shows: HashMap<String, ShowFn>,
    lists: HashMap<String, ListFn>,
    updates: HashMap<String, UpdateFn>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a show handler.
    pub fn show<F, R>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Option<&Value>, &Request) -> R + 'static,
        R: Into<Reply>,
    {
        self.shows
            .insert(name.into(), Rc::new(move |doc, req| handler(doc, req).into()));
        self
    }

    /// Register a list handler.
    pub fn list<F, R>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Head, &Request, &ListContext<'_>) -> R + 'static,
        R: Into<Reply>,
    {
        self.lists.insert(
            name.into(),
            Rc::new(move |head, req, cx| handler(head, req, cx).into()),
        );
        self
    }

    /// Register an update handler.
    pub fn update<F, R>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Option<&Value>, &Request) -> Option<(Option<Value>, R)> + 'static,
        R: Into<Reply>,
    {
        self.updates.insert(
            name.into(),
            Rc::new(move |doc, req| handler(doc, req).map(|(doc, reply)| (doc, reply.into()))),
        );
        self
    }

    /// Look up a show handler.
    pub fn get_show(&self, name: &str) -> Result<ShowFn, ConfigurationError> {
        self.shows
            .get(name)
            .cloned()
            .ok_or_else(|| unknown(HandlerKind::Show, name))
    }

    /// Look up a list handler.
    pub fn get_list(&self, name: &str) -> Result<ListFn, ConfigurationError> {
        self.lists
            .get(name)
            .cloned()
            .ok_or_else(|| unknown(HandlerKind::List, name))
    }

    /// Look up an update handler.
    pub fn get_update(&self, name: &str) -> Result<UpdateFn, ConfigurationError> {
        self.updates
            .get(name)
            .cloned()
            .ok_or_else(|| unknown(HandlerKind::Update, name))
    }

    /// Look up any handler by kind.
    pub fn get(&self, kind: HandlerKind, name: &str) -> Result<HandlerRef, ConfigurationError> {
        match kind {
            HandlerKind::Show => self.get_show(name).map(HandlerRef::Show),
            HandlerKind::List => self.get_list(name).map(HandlerRef::List),
            HandlerKind::Update => self.get_update(name).map(HandlerRef::Update),
        }
    }

    /// Number of registered handlers of every kind.
    pub fn len(&self) -> usize {
        self.shows.len() + self.lists.len() + self.updates.len()
    }

    /// Return `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("shows", &self.shows.keys().collect::<Vec<_>>())
            .field("lists", &self.lists.keys().collect::<Vec<_>>())
            .field("updates", &self.updates.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn unknown(kind: HandlerKind, name: &str) -> ConfigurationError {
    ConfigurationError::UnknownHandler {
        kind,
        name: name.to_string(),
    }
}
