//! Router configuration.
//!
//! ```
//! use rewrite_navigator::config::RouterConfig;
//!
//! let config = RouterConfig::new("blog").id_attempts(10);
//! assert_eq!(config.app_name, "blog");
//! assert_eq!(config.id_attempts, 10);
//!
//! let config = RouterConfig::from_json(r#"{ "app_name": "wiki", "base_url": "/wiki" }"#).unwrap();
//! assert_eq!(config.base_url.as_deref(), Some("/wiki"));
//! assert_eq!(config.id_attempts, 100);
//! ```

use crate::request::DEFAULT_ID_ATTEMPTS;
use serde::{Deserialize, Serialize};

/// Static settings of a navigator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Design document name; used for the `/_db/_design/<app>/...` fallback.
    pub app_name: String,
    /// Fixed base URL. When unset it is derived from the window location
    /// (everything up to and including `/_rewrite`).
    pub base_url: Option<String>,
    /// Attempts allowed when generating a request id.
    pub id_attempts: usize,
    /// Number of rule resolutions kept by the match cache.
    pub match_cache_capacity: usize,
}

impl RouterConfig {
    /// Default configuration for the named app.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Self::default()
        }
    }

    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Use a fixed base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the id attempt count.
    pub fn id_attempts(mut self, attempts: usize) -> Self {
        self.id_attempts = attempts;
        self
    }

    /// Set the match cache capacity.
    pub fn match_cache_capacity(mut self, capacity: usize) -> Self {
        self.match_cache_capacity = capacity;
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            app_name: String::new(),
            base_url: None,
            id_attempts: DEFAULT_ID_ATTEMPTS,
            match_cache_capacity: 64,
        }
    }
}
