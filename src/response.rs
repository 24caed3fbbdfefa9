//! Handler replies and normalized responses.
//!
//! Handlers return a [`Reply`]: either a full [`Response`] or just a body.
//! The sequencer normalizes every reply into a `Response` before anything
//! else sees it:
//!
//! | Reply | Response |
//! |-------|----------|
//! | `Reply::Response(r)` | `r` |
//! | `Reply::Body(s)` | `{ code: 200, body: s }` |
//! | `Reply::Empty` | `{ code: 200 }` |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A handler response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Status code.
    pub code: u16,
    /// Response headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Body; `None` until something is written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl Response {
    /// Response with a status code and nothing else.
    pub fn new(code: u16) -> Self {
        Self {
            code,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// `200` with a body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200).with_body(body)
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Append to the body, creating it if needed.
    pub fn append_body(&mut self, chunk: &str) {
        self.body.get_or_insert_with(String::new).push_str(chunk);
    }

    /// Body, or `""` when there is none.
    pub fn body_str(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }

    /// Raw `Set-Cookie` header value.
    pub fn set_cookie(&self) -> Option<&str> {
        self.headers.get("Set-Cookie").map(String::as_str)
    }
}

/// What a show, list, or update handler hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A full response object.
    Response(Response),
    /// A plain body.
    Body(String),
    /// Nothing.
    Empty,
}

impl Reply {
    /// Normalize into a response.
    pub fn into_response(self) -> Response {
        match self {
            Reply::Response(response) => response,
            Reply::Body(body) => Response::ok(body),
            Reply::Empty => Response::new(200),
        }
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Reply::Response(response)
    }
}

impl From<String> for Reply {
    fn from(body: String) -> Self {
        Reply::Body(body)
    }
}

impl From<&str> for Reply {
    fn from(body: &str) -> Self {
        Reply::Body(body.to_string())
    }
}

impl From<()> for Reply {
    fn from((): ()) -> Self {
        Reply::Empty
    }
}

impl<T: Into<Reply>> From<Option<T>> for Reply {
    fn from(value: Option<T>) -> Self {
        value.map_or(Reply::Empty, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_body() {
        let response = Reply::from("<h1>hi</h1>").into_response();
        assert_eq!(response.code, 200);
        assert_eq!(response.body.as_deref(), Some("<h1>hi</h1>"));
    }

    #[test]
    fn test_normalize_empty() {
        let response = Reply::from(()).into_response();
        assert_eq!(response, Response::new(200));
        assert_eq!(response.body_str(), "");
    }

    #[test]
    fn test_response_passes_through() {
        let original = Response::new(302).with_header("Location", "/login");
        assert_eq!(Reply::from(original.clone()).into_response(), original);
    }

    #[test]
    fn test_append_body() {
        let mut response = Response::new(200);
        response.append_body("a");
        response.append_body("b");
        assert_eq!(response.body.as_deref(), Some("ab"));
    }

    #[test]
    fn test_set_cookie_header() {
        let response = Response::ok("x").with_header("Set-Cookie", "flash=1; Path=/");
        assert_eq!(response.set_cookie(), Some("flash=1; Path=/"));
        assert_eq!(Response::new(200).set_cookie(), None);
    }

    #[test]
    fn test_option_reply() {
        assert_eq!(Reply::from(None::<String>), Reply::Empty);
        assert_eq!(Reply::from(Some("x")), Reply::Body("x".to_string()));
    }
}
