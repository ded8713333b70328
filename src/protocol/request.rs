//! Outbound request types.
//!
//! Defines the message format for requests sent from the client to the
//! LinkBox server.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::Result;
use crate::identifiers::RequestId;

// ============================================================================
// Constants
// ============================================================================

/// Adds a single link.
pub const METHOD_ADD_LINK: &str = "add-link";

/// Adds a batch of links.
pub const METHOD_ADD_LINKS: &str = "add-links";

// ============================================================================
// Link
// ============================================================================

/// A saved link: page title plus URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Page title.
    pub title: String,

    /// Page URL.
    pub link: String,
}

impl Link {
    /// Creates a link.
    #[inline]
    #[must_use]
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
        }
    }
}

// ============================================================================
// Request
// ============================================================================

/// A request from client to server.
///
/// # Format
///
/// ```json
/// {
///   "method": "add-links",
///   "payload": [{ "title": "Example", "link": "https://example.com" }],
///   "authToken": "token",
///   "requestId": "uuid"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    /// Method name.
    pub method: String,

    /// Method-specific payload.
    pub payload: Value,

    /// Authentication token, attached at send time.
    #[serde(rename = "authToken", skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Correlation id, assigned at send time for confirmable methods.
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
}

impl Request {
    /// Creates a request for an arbitrary method.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, payload: Value) -> Self {
        Self {
            method: method.into(),
            payload,
            auth_token: None,
            request_id: None,
        }
    }

    /// Creates an `add-link` request.
    #[must_use]
    pub fn add_link(link: Link) -> Self {
        Self::new(
            METHOD_ADD_LINK,
            json!({ "title": link.title, "link": link.link }),
        )
    }

    /// Creates an `add-links` request.
    #[must_use]
    pub fn add_links(links: &[Link]) -> Self {
        let payload = links
            .iter()
            .map(|l| json!({ "title": l.title, "link": l.link }))
            .collect();
        Self::new(METHOD_ADD_LINKS, Value::Array(payload))
    }

    /// Returns `true` if the server confirms this method with a
    /// `link-added` / `links-added` event.
    #[inline]
    #[must_use]
    pub fn requires_confirmation(&self) -> bool {
        matches!(self.method.as_str(), METHOD_ADD_LINK | METHOD_ADD_LINKS)
    }

    /// Sets the authentication token.
    #[inline]
    #[must_use]
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    /// Sets the correlation id.
    #[inline]
    #[must_use]
    pub fn with_request_id(mut self, id: RequestId) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Serializes to the text frame sent on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_link_serialization() {
        let request = Request::add_link(Link::new("Example", "https://example.com"));
        let value: Value = serde_json::from_str(&request.to_frame().unwrap()).unwrap();

        assert_eq!(value["method"], "add-link");
        assert_eq!(value["payload"]["title"], "Example");
        assert_eq!(value["payload"]["link"], "https://example.com");
        assert!(value.get("authToken").is_none());
        assert!(value.get("requestId").is_none());
    }

    #[test]
    fn test_add_links_payload_is_array() {
        let links = vec![Link::new("A", "https://a.test"), Link::new("B", "https://b.test")];
        let request = Request::add_links(&links);

        assert_eq!(request.method, METHOD_ADD_LINKS);
        assert_eq!(request.payload.as_array().map(Vec::len), Some(2));
        assert_eq!(request.payload[1]["link"], "https://b.test");
    }

    #[test]
    fn test_token_and_id_use_camel_case() {
        let request = Request::add_links(&[])
            .with_auth_token(Some("secret".into()))
            .with_request_id(RequestId::new("R1"));
        let json = request.to_frame().unwrap();

        assert!(json.contains(r#""authToken":"secret""#));
        assert!(json.contains(r#""requestId":"R1""#));
    }

    #[test]
    fn test_requires_confirmation() {
        assert!(Request::add_link(Link::new("t", "u")).requires_confirmation());
        assert!(Request::add_links(&[]).requires_confirmation());
        assert!(!Request::new("ping", Value::Null).requires_confirmation());
    }
}
