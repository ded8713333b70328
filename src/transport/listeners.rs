//! Channel events and the listener registry.
//!
//! Subscribers are kept per [`EventKind`] in insertion order, which is also
//! invocation order. Removal matches by `Arc` identity.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

// ============================================================================
// Constants
// ============================================================================

/// Close code for a normal, intentional close.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code for a close frame without a status code.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Close code for a connection lost without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

// ============================================================================
// EventKind
// ============================================================================

/// Kinds of event a channel emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Connection opened.
    Open,
    /// Connection closed.
    Close,
    /// Text frame received.
    Message,
    /// Transport error.
    Error,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Message => "message",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

// ============================================================================
// CloseInfo
// ============================================================================

/// Details of a close event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// WebSocket close code.
    pub code: u16,
    /// Close reason, possibly empty.
    pub reason: String,
    /// `true` if a close handshake completed.
    pub was_clean: bool,
}

impl CloseInfo {
    /// A clean close with the given code and reason.
    #[inline]
    #[must_use]
    pub fn clean(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            was_clean: true,
        }
    }

    /// A connection lost without a close handshake.
    #[inline]
    #[must_use]
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: CLOSE_ABNORMAL,
            reason: reason.into(),
            was_clean: false,
        }
    }
}

// ============================================================================
// ChannelEvent
// ============================================================================

/// An event delivered to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Connection opened.
    Open,
    /// Connection closed.
    Close(CloseInfo),
    /// Text frame, verbatim.
    Message(String),
    /// Transport error description.
    Error(String),
}

impl ChannelEvent {
    /// Returns the kind used to select listeners.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Open => EventKind::Open,
            Self::Close(_) => EventKind::Close,
            Self::Message(_) => EventKind::Message,
            Self::Error(_) => EventKind::Error,
        }
    }
}

// ============================================================================
// Listener
// ============================================================================

/// Event listener callback.
///
/// Keep a clone of the `Arc` to remove the listener later.
pub type Listener = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

/// Wraps a closure as a [`Listener`].
#[inline]
pub fn listener<F>(callback: F) -> Listener
where
    F: Fn(&ChannelEvent) + Send + Sync + 'static,
{
    Arc::new(callback)
}

// ============================================================================
// ListenerRegistry
// ============================================================================

/// Ordered subscribers per event kind.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    listeners: Mutex<FxHashMap<EventKind, Vec<Listener>>>,
}

impl ListenerRegistry {
    /// Appends a listener.
    pub(crate) fn add(&self, kind: EventKind, listener: Listener) {
        self.listeners.lock().entry(kind).or_default().push(listener);
    }

    /// Removes the first listener that is the same `Arc` as `listener`.
    ///
    /// Returns `true` if one was removed.
    pub(crate) fn remove(&self, kind: EventKind, listener: &Listener) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(list) = listeners.get_mut(&kind) else {
            return false;
        };

        match list.iter().position(|l| Arc::ptr_eq(l, listener)) {
            Some(index) => {
                list.remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of listeners for `kind`.
    pub(crate) fn count(&self, kind: EventKind) -> usize {
        self.listeners.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Invokes every listener for the event's kind, in insertion order.
    ///
    /// Runs on a snapshot, so listeners may register or remove listeners
    /// while being called.
    pub(crate) fn emit(&self, event: &ChannelEvent) {
        let snapshot: Vec<Listener> = self
            .listeners
            .lock()
            .get(&event.kind())
            .cloned()
            .unwrap_or_default();

        for listener in snapshot {
            listener(event);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recording(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> Listener {
        let log = Arc::clone(log);
        listener(move |_| log.lock().push(tag))
    }

    #[test]
    fn test_emit_in_insertion_order() {
        let registry = ListenerRegistry::default();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.add(EventKind::Message, recording(&log, "first"));
        registry.add(EventKind::Message, recording(&log, "second"));
        registry.add(EventKind::Open, recording(&log, "open-only"));

        registry.emit(&ChannelEvent::Message("hi".into()));
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_remove_first_matching_only() {
        let registry = ListenerRegistry::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = {
            let calls = Arc::clone(&calls);
            listener(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };

        registry.add(EventKind::Open, Arc::clone(&counter));
        registry.add(EventKind::Open, Arc::clone(&counter));
        assert!(registry.remove(EventKind::Open, &counter));
        assert_eq!(registry.count(EventKind::Open), 1);

        registry.emit(&ChannelEvent::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_unknown_listener() {
        let registry = ListenerRegistry::default();
        let registered = listener(|_| {});
        let stranger = listener(|_| {});

        registry.add(EventKind::Error, Arc::clone(&registered));
        assert!(!registry.remove(EventKind::Error, &stranger));
        assert!(!registry.remove(EventKind::Close, &registered));
        assert_eq!(registry.count(EventKind::Error), 1);
    }

    #[test]
    fn test_listener_can_register_during_emit() {
        let registry = Arc::new(ListenerRegistry::default());
        let inner = Arc::clone(&registry);

        registry.add(
            EventKind::Open,
            listener(move |_| inner.add(EventKind::Open, listener(|_| {}))),
        );

        registry.emit(&ChannelEvent::Open);
        assert_eq!(registry.count(EventKind::Open), 2);
    }

    #[test]
    fn test_event_kind() {
        assert_eq!(ChannelEvent::Open.kind(), EventKind::Open);
        assert_eq!(
            ChannelEvent::Close(CloseInfo::abnormal("gone")).kind(),
            EventKind::Close
        );
        assert_eq!(ChannelEvent::Error("x".into()).kind(), EventKind::Error);
        assert_eq!(EventKind::Message.to_string(), "message");
    }

    #[test]
    fn test_close_info_constructors() {
        let lost = CloseInfo::abnormal("reset");
        assert_eq!(lost.code, CLOSE_ABNORMAL);
        assert!(!lost.was_clean);

        let clean = CloseInfo::clean(CLOSE_NORMAL, "bye");
        assert!(clean.was_clean);
        assert_eq!(clean.reason, "bye");
    }
}
