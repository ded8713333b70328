//! Resilient WebSocket transport.
//!
//! This module owns the single logical connection to the LinkBox server and
//! keeps it alive across network failures.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                        ┌──────────────────┐
//! │  ResilientChannel    │                        │  LinkBox server  │
//! │                      │       WebSocket        │                  │
//! │  supervisor task     │◄──────────────────────►│                  │
//! │  → Connector         │    ws://host:port      │                  │
//! │  → ListenerRegistry  │                        │                  │
//! └──────────────────────┘                        └──────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `ResilientChannel::connect` - Spawn supervisor, state CONNECTING
//! 2. `Connector::connect` - One raw attempt, bounded by `timeout_interval`
//! 3. OPEN - `open` event, sends transmitted, frames emitted as `message`
//! 4. CLOSED - `close` event, retry after exponential backoff
//! 5. `ResilientChannel::close` - Permanent shutdown, no further retries
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `channel` | Supervisor, send and lifecycle |
//! | `connector` | Raw connection seam and WebSocket implementation |
//! | `listeners` | Event types and listener registry |
//! | `options` | Backoff and timeout configuration |
//! | `state` | Ready state |

// ============================================================================
// Submodules
// ============================================================================

/// Auto-reconnecting channel.
pub mod channel;

/// Raw connection establishment.
pub mod connector;

/// Channel events and listeners.
pub mod listeners;

/// Reconnection configuration.
pub mod options;

/// Connection state.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::ResilientChannel;
pub use connector::{Connector, FrameSink, FrameStream, RawConnection, WsConnector};
pub use listeners::{ChannelEvent, CloseInfo, EventKind, Listener, listener};
pub use options::ChannelOptions;
pub use state::ReadyState;
