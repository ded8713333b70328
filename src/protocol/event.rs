//! Inbound message types.
//!
//! Events are notifications pushed by the LinkBox server. The channel layer
//! delivers raw text; parsing into these types happens above it.
//!
//! # Event Types
//!
//! | Event | Parsed as |
//! |-------|-----------|
//! | `link-added` | [`ParsedEvent::LinkAdded`] |
//! | `links-added` | [`ParsedEvent::LinksAdded`] |
//! | `need-valid-token` | [`ParsedEvent::NeedValidToken`] |

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::identifiers::RequestId;

// ============================================================================
// InboundMessage
// ============================================================================

/// A message from the server.
///
/// # Format
///
/// ```json
/// {
///   "event": "links-added",
///   "payload": { "requestId": "uuid" }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    /// Event name. Frames without one are ignored.
    #[serde(default)]
    pub event: Option<String>,

    /// Event-specific data.
    #[serde(default)]
    pub payload: Option<Value>,
}

impl InboundMessage {
    /// Parses a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the frame is not a JSON object.
    pub fn from_frame(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parses the message into a typed variant.
    ///
    /// Returns `None` when the frame carries no event name.
    #[must_use]
    pub fn parse(&self) -> Option<ParsedEvent> {
        let event = self.event.as_deref().filter(|e| !e.is_empty())?;

        let parsed = match event {
            "link-added" => ParsedEvent::LinkAdded {
                request_id: self.request_id(),
            },

            "links-added" => ParsedEvent::LinksAdded {
                request_id: self.request_id(),
            },

            "need-valid-token" => ParsedEvent::NeedValidToken {
                replay: self.payload.clone().filter(|p| !p.is_null()),
            },

            other => ParsedEvent::Unknown {
                event: other.to_string(),
                payload: self.payload.clone(),
            },
        };

        Some(parsed)
    }

    /// Gets `payload.requestId` if it is a non-empty string.
    fn request_id(&self) -> Option<RequestId> {
        self.payload
            .as_ref()
            .and_then(|p| p.get("requestId"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(RequestId::new)
    }
}

// ============================================================================
// ParsedEvent
// ============================================================================

/// Parsed event types for type-safe handling.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEvent {
    /// Server stored a single link.
    LinkAdded {
        /// Echoed correlation id, if the request carried one.
        request_id: Option<RequestId>,
    },

    /// Server stored a batch of links.
    LinksAdded {
        /// Echoed correlation id, if the request carried one.
        request_id: Option<RequestId>,
    },

    /// Server rejected the token and wants the client to re-authenticate.
    NeedValidToken {
        /// The rejected request, to be re-sent once a fresh token exists.
        replay: Option<Value>,
    },

    /// Unrecognized event.
    Unknown {
        /// Event name.
        event: String,
        /// Raw payload.
        payload: Option<Value>,
    },
}

impl ParsedEvent {
    /// Returns the correlation id carried by a confirmation event.
    #[inline]
    #[must_use]
    pub fn confirmed_request(&self) -> Option<&RequestId> {
        match self {
            Self::LinkAdded { request_id } | Self::LinksAdded { request_id } => {
                request_id.as_ref()
            }
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
