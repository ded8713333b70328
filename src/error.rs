//! Error types for the LinkBox client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use linkbox_client::{Error, Result};
//!
//! fn example(linkbox: &LinkBox, tabs: &[TabSnapshot]) -> Result<()> {
//!     match linkbox.send_tabs(tabs, TabScope::All) {
//!         Err(e) if e.is_offline() => notify_user("LinkBox server is offline"),
//!         other => { other?; }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidEndpoint`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Channel | [`Error::ChannelNotOpen`] |
//! | Protocol | [`Error::Protocol`] |
//! | External | [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::transport::ReadyState;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when channel options fail validation.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Endpoint is not a valid URL.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when a connection attempt cannot be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection attempt exceeded the configured timeout.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// WebSocket connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Channel Errors
    // ========================================================================
    /// A send was attempted while the channel was not open.
    ///
    /// Nothing was transmitted and nothing was queued.
    #[error("Channel not open (state: {state})")]
    ChannelNotOpen {
        /// Channel state observed at the time of the send.
        state: ReadyState,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected message shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a channel-not-open error.
    #[inline]
    pub fn channel_not_open(state: ReadyState) -> Self {
        Self::ChannelNotOpen { state }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::ChannelNotOpen { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the send was rejected because the channel is closed.
    ///
    /// This is the "server is offline" condition. A channel that is merely
    /// connecting or closing is not offline.
    #[inline]
    #[must_use]
    pub fn is_offline(&self) -> bool {
        matches!(
            self,
            Self::ChannelNotOpen {
                state: ReadyState::Closed
            }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_channel_not_open_display() {
        let err = Error::channel_not_open(ReadyState::Connecting);
        assert_eq!(err.to_string(), "Channel not open (state: CONNECTING)");
    }

    #[test]
    fn test_is_offline_only_when_closed() {
        assert!(Error::channel_not_open(ReadyState::Closed).is_offline());
        assert!(!Error::channel_not_open(ReadyState::Connecting).is_offline());
        assert!(!Error::channel_not_open(ReadyState::Closing).is_offline());
        assert!(!Error::ConnectionClosed.is_offline());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::connection_timeout(2000).is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::connection_timeout(2000).is_timeout());
        assert!(!Error::protocol("x").is_timeout());
    }

    #[test]
    fn test_from_url_error() {
        let parse_err = url::Url::parse("not a url").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::InvalidEndpoint(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
