//! Navigation state
//!
//! Everything the controller remembers between navigations:
//!
//! - [`CurrentRequest`]: the ticket of the most recently triggered request.
//!   Completions compare their own uuid against it and drop themselves when
//!   a newer navigation has taken over.
//! - [`HistoryState`]: the state object pushed with each history entry.
//! - [`NavigationState`]: history support, the last applied state, cached
//!   user context and the initial-hit flag.

use crate::request::FormData;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::time::{SystemTime, UNIX_EPOCH};

// ============================================================================
// Ticket
// ============================================================================

/// Single-slot holder for the uuid of the current request.
#[derive(Debug, Default)]
pub struct CurrentRequest {
    uuid: RefCell<Option<String>>,
}

impl CurrentRequest {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `uuid` the current request, superseding any other.
    pub fn publish(&self, uuid: &str) {
        *self.uuid.borrow_mut() = Some(uuid.to_string());
    }

    /// Return `true` if `uuid` is still the current request.
    pub fn is_current(&self, uuid: &str) -> bool {
        self.uuid.borrow().as_deref() == Some(uuid)
    }

    /// Uuid of the current request.
    pub fn current(&self) -> Option<String> {
        self.uuid.borrow().clone()
    }
}

// ============================================================================
// History
// ============================================================================

/// State pushed with a history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryState {
    /// HTTP method of the navigation.
    pub method: String,
    /// Form data, for form submissions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<FormData>,
    /// Milliseconds since the epoch at push time.
    pub timestamp: u64,
}

impl HistoryState {
    /// State for a navigation happening now.
    pub fn new(method: impl Into<String>, data: Option<FormData>, timestamp: u64) -> Self {
        Self {
            method: method.into(),
            data,
            timestamp,
        }
    }
}

/// The last state the controller applied.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CurrentState {
    /// Method of the navigation.
    pub method: String,
    /// App-level URL.
    pub url: String,
    /// Form data, if any.
    pub data: Option<FormData>,
    /// Timestamp of the history state; `None` for pops without state.
    pub timestamp: Option<u64>,
}

impl CurrentState {
    /// Return `true` if this describes the same entry (url, timestamp and
    /// method).
    pub fn same_entry(&self, other: &CurrentState) -> bool {
        self.url == other.url && self.timestamp == other.timestamp && self.method == other.method
    }
}

// ============================================================================
// NavigationState
// ============================================================================

/// Mutable controller state.
#[derive(Debug)]
pub struct NavigationState {
    history_support: Cell<bool>,
    current_state: RefCell<Option<CurrentState>>,
    initial_hit: Cell<bool>,
    user_ctx: RefCell<Option<Value>>,
    last_timestamp: Cell<u64>,
}

impl NavigationState {
    /// Fresh state: no history support until detected, initial hit pending.
    pub fn new() -> Self {
        Self {
            history_support: Cell::new(false),
            current_state: RefCell::new(None),
            initial_hit: Cell::new(true),
            user_ctx: RefCell::new(None),
            last_timestamp: Cell::new(0),
        }
    }

    /// Whether history entries can be pushed.
    pub fn history_support(&self) -> bool {
        self.history_support.get()
    }

    /// Record whether the window supports history.
    pub fn set_history_support(&self, supported: bool) {
        self.history_support.set(supported);
    }

    /// The last applied state.
    pub fn current_state(&self) -> Option<CurrentState> {
        self.current_state.borrow().clone()
    }

    /// Record `state` unless it duplicates the current one.
    ///
    /// Returns `false` for a duplicate.
    pub fn apply(&self, state: CurrentState) -> bool {
        let mut current = self.current_state.borrow_mut();
        if current.as_ref().is_some_and(|c| c.same_entry(&state)) {
            return false;
        }
        *current = Some(state);
        true
    }

    /// Whether the next dispatch is the startup navigation.
    pub fn initial_hit(&self) -> bool {
        self.initial_hit.get()
    }

    /// Clear the initial-hit flag, returning its previous value.
    pub fn take_initial_hit(&self) -> bool {
        self.initial_hit.replace(false)
    }

    /// Cached user context.
    pub fn user_ctx(&self) -> Option<Value> {
        self.user_ctx.borrow().clone()
    }

    /// Cache a user context (or clear it with `None`).
    pub fn set_user_ctx(&self, user_ctx: Option<Value>) {
        *self.user_ctx.borrow_mut() = user_ctx;
    }

    /// Millisecond timestamp for a new history entry.
    ///
    /// Strictly increasing, so two entries pushed within the same
    /// millisecond are never mistaken for duplicates.
    pub fn next_timestamp(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        let next = now.max(self.last_timestamp.get() + 1);
        self.last_timestamp.set(next);
        next
    }
}

impl Default for NavigationState {
    fn default() -> Self {
        Self::new()
    }
}
