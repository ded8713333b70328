//! LinkBox client - Self-healing WebSocket channel with confirmed tab hand-off.
//!
//! This library sends browser tabs to a LinkBox bookmark server and closes
//! them only after the server confirms it stored the links.
//!
//! # Architecture
//!
//! Two layers, leaf first:
//!
//! - **Resilient Channel**: one logical WebSocket connection that reconnects
//!   with exponential backoff, exposes its ready state and emits
//!   `open` / `close` / `message` / `error` events
//! - **Correlation Coordinator**: stamps confirmable requests with a
//!   `requestId` and closes the parked tabs when the matching confirmation
//!   arrives, exactly once
//!
//! Key design principles:
//!
//! - Sends are best-effort: nothing is buffered while the channel is not open
//! - Tabs close only after confirmation, never on send
//! - Browser, auth and notification APIs stay behind traits
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use linkbox_client::{
//!     ChannelOptions, LinkBox, Result, StaticToken, TabCloser, TabId, TabScope, TabSnapshot,
//! };
//!
//! struct Browser;
//!
//! impl TabCloser for Browser {
//!     fn close_tabs(&self, tabs: &[TabId]) {
//!         println!("closing {tabs:?}");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let linkbox = LinkBox::connect(
//!         "linkbox.example:9886",
//!         ChannelOptions::default(),
//!         Arc::new(Browser),
//!         Arc::new(StaticToken(Some("token".into()))),
//!     )?;
//!
//!     let tabs = vec![TabSnapshot::new(7u32, "Rust", "https://www.rust-lang.org/").active()];
//!     match linkbox.send_tabs(&tabs, TabScope::Current) {
//!         Ok(dispatch) => println!("sent {} links", dispatch.sent),
//!         Err(e) if e.is_offline() => println!("LinkBox server is offline"),
//!         Err(e) => return Err(e),
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`LinkBox`] composition root and tab selection |
//! | [`correlation`] | Request/confirmation matching |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | JSON message types |
//! | [`transport`] | Auto-reconnecting WebSocket channel |

// ============================================================================
// Modules
// ============================================================================

/// LinkBox client and tab selection.
///
/// Use [`LinkBox::connect()`] to create a client.
pub mod client;

/// Request/confirmation correlation.
///
/// - [`CorrelationCoordinator`] - Sends requests, routes confirmations
/// - [`PendingConfirmations`] - Side effects waiting for the server
pub mod correlation;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing request ids and tab ids.
pub mod identifiers;

/// JSON protocol message types.
///
/// Outbound requests and inbound events.
pub mod protocol;

/// WebSocket transport layer.
///
/// Auto-reconnecting channel, connection seam and events.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    Dispatch, LinkBox, Selection, ServiceFilter, TabScope, TabSnapshot, select_tabs,
};

// Correlation types
pub use correlation::{
    AbandonedConfirmation, AuthContext, CorrelationCoordinator, PendingConfirmations,
    StaticToken, TabCloser,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{RequestId, TabId};

// Protocol types
pub use protocol::{InboundMessage, Link, ParsedEvent, Request};

// Transport types
pub use transport::{
    ChannelEvent, ChannelOptions, CloseInfo, Connector, EventKind, Listener, ReadyState,
    ResilientChannel, WsConnector, listener,
};
