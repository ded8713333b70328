//! WebSocket protocol message types.
//!
//! Every frame, in either direction, is a single text frame holding one
//! JSON object.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Shape |
//! |--------------|-----------|-------|
//! | [`Request`] | Local → Server | `{ method, payload, authToken?, requestId? }` |
//! | [`InboundMessage`] | Server → Local | `{ event, payload? }` |
//!
//! # Methods and Events
//!
//! | Name | Kind | Notes |
//! |------|------|-------|
//! | `add-link` | method | confirmable, payload `{ title, link }` |
//! | `add-links` | method | confirmable, payload `[{ title, link }, ...]` |
//! | `link-added` | event | confirmation, `payload.requestId` |
//! | `links-added` | event | confirmation, `payload.requestId` |
//! | `need-valid-token` | event | re-authentication request, payload is the request to replay |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `event` | Inbound messages and parsed events |
//! | `request` | Outbound requests and link payloads |

// ============================================================================
// Submodules
// ============================================================================

/// Inbound message types.
pub mod event;

/// Outbound request types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::{InboundMessage, ParsedEvent};
pub use request::{Link, Request};
