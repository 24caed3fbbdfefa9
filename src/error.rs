//! Error and outcome types.
//!
//! A navigation ends in one of two ways:
//!
//! - [`NavigationOutcome`]: the control-flow result when nothing went wrong
//!   (`Rendered`, `Discarded`, `FullPage`, `Duplicate`, `Skipped`). A URL
//!   that matches no rewrite rule is *not* an error: it becomes
//!   [`NavigationOutcome::FullPage`].
//! - [`RouterError`]: something failed and the navigation was abandoned.
//!
//! # Examples
//!
//! ```
//! use rewrite_navigator::error::NavigationOutcome;
//!
//! let outcome = NavigationOutcome::FullPage { url: "/db/_design/app/_rewrite/nope".into() };
//! assert!(outcome.is_full_page());
//! assert_eq!(outcome.redirect_url(), Some("/db/_design/app/_rewrite/nope"));
//! ```

use crate::lifecycle::HandlerKind;
use thiserror::Error;

/// Error type returned by collaborators (stores, session providers, ...).
///
/// Propagated unchanged as the `source` of the router error that wraps it.
pub type BoxError = Box<dyn std::error::Error + 'static>;

// ============================================================================
// Outcomes
// ============================================================================

/// Result of a navigation that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// A handler ran and its result was applied.
    Rendered {
        /// Handler kind selected from the first path segment.
        kind: HandlerKind,
        /// Rewritten path, `/`-joined.
        path: String,
    },
    /// The request was overtaken by a newer navigation while its resource
    /// was being fetched; the result was dropped.
    Discarded {
        /// Uuid of the request that lost the race.
        uuid: String,
    },
    /// The router handed the navigation back to the environment as a full
    /// page load.
    FullPage {
        /// Location assigned to the window.
        url: String,
    },
    /// A pop event identical to the last applied history state.
    Duplicate,
    /// The navigation was not for this app (external link, `/_session`
    /// form, ...) and was left to the environment untouched.
    Skipped,
}

impl NavigationOutcome {
    /// Check if a handler result was applied.
    pub fn is_rendered(&self) -> bool {
        matches!(self, NavigationOutcome::Rendered { .. })
    }

    /// Check if the result was discarded as stale.
    pub fn is_discarded(&self) -> bool {
        matches!(self, NavigationOutcome::Discarded { .. })
    }

    /// Check if the router fell back to a full page load.
    pub fn is_full_page(&self) -> bool {
        matches!(self, NavigationOutcome::FullPage { .. })
    }

    /// Check if the event was a duplicate pop.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, NavigationOutcome::Duplicate)
    }

    /// Check if the router left the navigation to the environment.
    pub fn is_skipped(&self) -> bool {
        matches!(self, NavigationOutcome::Skipped)
    }

    /// Check if the router took over the navigation (anything but
    /// [`Skipped`](Self::Skipped)).
    pub fn handled(&self) -> bool {
        !self.is_skipped()
    }

    /// Get the full-page location, if the router fell back to one.
    pub fn redirect_url(&self) -> Option<&str> {
        match self {
            NavigationOutcome::FullPage { url } => Some(url),
            _ => None,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Top-level error for a navigation.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The request could not be built.
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    /// The document or view could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Route table or handler registry is inconsistent with the request.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The dispatch protocol was violated.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Failures while building a request. Nothing is published when one occurs.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// The identity generator gave up.
    #[error(transparent)]
    IdentityExhausted(#[from] ExhaustedError),

    /// The session provider failed.
    #[error("session lookup failed")]
    Session(#[source] BoxError),

    /// A group or template value carried invalid percent-encoding.
    #[error("malformed percent-encoding in '{value}'")]
    MalformedEncoding {
        /// The raw value that failed to decode.
        value: String,
    },
}

/// Returned by an identity generator after `attempts` failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no unique id after {attempts} attempts")]
pub struct ExhaustedError {
    /// Number of attempts made.
    pub attempts: usize,
}

/// A document or view could not be retrieved.
#[derive(Debug, Error)]
pub enum FetchError {
    /// `get_document` failed.
    #[error("failed to fetch document '{id}'")]
    Document {
        /// Document id.
        id: String,
        /// Storage-layer error.
        #[source]
        source: BoxError,
    },

    /// `get_view` failed.
    #[error("failed to fetch view '{path}'")]
    View {
        /// View path.
        path: String,
        /// Storage-layer error.
        #[source]
        source: BoxError,
    },
}

/// Static configuration does not fit the navigation.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A list dispatch was requested without a view to read from.
    #[error("no view specified for list '{name}'")]
    NoView {
        /// List handler name.
        name: String,
    },

    /// The rewritten path names a handler that was never registered.
    #[error("no {kind} handler registered as '{name}'")]
    UnknownHandler {
        /// Handler kind looked up.
        kind: HandlerKind,
        /// Name that was not found.
        name: String,
    },

    /// The route table could not be parsed.
    #[error("invalid route table")]
    RouteTable(#[source] serde_json::Error),

    /// A rewrite pattern did not compile.
    #[error("invalid rewrite pattern '{pattern}'")]
    Pattern {
        /// Offending pattern.
        pattern: String,
        /// Regex compilation error.
        #[source]
        source: regex::Error,
    },
}

/// Violations of the dispatch protocol.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A handler was about to run against a request that already produced
    /// a response.
    #[error("request {uuid} already received a response")]
    ResponseAlreadyReceived {
        /// Request uuid.
        uuid: String,
    },
}

// ============================================================================
// Tests
// ============================================================================
