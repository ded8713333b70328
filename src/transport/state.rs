//! Channel ready state.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

// ============================================================================
// ReadyState
// ============================================================================

/// Connection state of a [`ResilientChannel`](super::ResilientChannel).
///
/// Numbering matches the WebSocket `readyState` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    /// A connection attempt is in progress.
    Connecting = 0,
    /// Connected; sends are transmitted.
    Open = 1,
    /// The connection is shutting down.
    Closing = 2,
    /// Not connected. A retry may be scheduled.
    Closed = 3,
}

impl ReadyState {
    /// Converts from the raw representation.
    ///
    /// Unknown values map to [`ReadyState::Closed`].
    #[inline]
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Returns `true` for [`ReadyState::Open`].
    #[inline]
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

// ============================================================================
// AtomicReadyState
// ============================================================================

/// Lock-free cell holding a [`ReadyState`].
#[derive(Debug)]
pub(crate) struct AtomicReadyState(AtomicU8);

impl AtomicReadyState {
    pub(crate) const fn new(state: ReadyState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub(crate) fn load(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::SeqCst))
    }

    #[inline]
    pub(crate) fn store(&self, state: ReadyState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

// ============================================================================
// Tests
// ============================================================================
