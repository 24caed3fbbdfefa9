//! # rewrite-navigator
//!
//! A client-side request router that mirrors a server-side URL-rewrite
//! engine. Navigations (link clicks, form submissions, back/forward, the
//! initial page load) are matched against an ordered rewrite table and
//! turned into requests for one of three handler kinds:
//!
//! | Kind | Rewritten path | Resource |
//! |------|----------------|----------|
//! | show | `_show/<name>/<docid>` | one document |
//! | list | `_list/<name>/<view>` | a view result, streamed row by row |
//! | update | `_update/<name>/<docid>` | one document, returned modified |
//!
//! Every dispatch reports its progress on an [`EventBus`]; results of
//! navigations that were overtaken by a newer one are dropped.
//!
//! ## Modules
//!
//! - [`rewrite`], [`matching`], [`substitute`]: route table, pattern
//!   matching, placeholder substitution
//! - [`request`]: request synthesis
//! - [`dispatch`], [`hooks`], [`lifecycle`]: handler execution and events
//! - [`navigator`], [`state`], [`location`]: history and URL handling
//! - [`environment`]: collaborator traits (store, window, session, ...)
//!
//! ## Features
//!
//! | Feature | Default | Effect |
//! |---------|---------|--------|
//! | `log` | yes | log through the `log` crate |
//! | `tracing` | no | log through `tracing` instead |
//! | `cache` | yes | LRU cache of rule resolutions |

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod logging;

#[cfg(feature = "cache")]
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod environment;
pub mod error;
pub mod handlers;
pub mod hooks;
pub mod lifecycle;
pub mod location;
pub mod matching;
pub mod navigator;
pub mod params;
pub mod request;
pub mod response;
pub mod rewrite;
pub mod state;
pub mod substitute;

#[cfg(feature = "cache")]
pub use cache::{CacheStats, MatchCache};
pub use config::RouterConfig;
pub use dispatch::{Completion, Sequencer};
pub use environment::{
    AnonymousSession, CookieJar, DocumentStore, FlashMessages, IdentityGenerator, MemoryCookieJar, NoFlash,
    Session, SessionProvider, UuidGenerator, ViewResult, Window,
};
pub use error::{
    BoxError, ConfigurationError, DispatchError, ExhaustedError, FetchError, NavigationOutcome, RouterError,
    SynthesisError,
};
pub use handlers::{HandlerRef, HandlerRegistry, Head};
pub use hooks::{DefaultHooks, ListContext, ListHooks};
pub use lifecycle::{EventBus, HandlerKind, LifecycleEvent, ResponseInfo};
pub use location::ParsedUrl;
pub use matching::{extract_groups, extract_splat, match_rule, Pattern};
pub use navigator::{Navigator, NavigatorBuilder};
pub use params::{MatchGroups, Query};
pub use request::{build_request, FormData, Request, SynthesisContext};
pub use response::{Reply, Response};
pub use rewrite::{RewriteRule, RewriteTable, Template};
pub use state::{CurrentRequest, HistoryState};
pub use substitute::substitute;
