//! Correlation coordinator.
//!
//! Sits on top of a [`ResilientChannel`]: stamps outbound requests with the
//! auth token and a correlation id, and routes inbound confirmation events
//! back to the parked side effect.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{RequestId, TabId};
use crate::protocol::{InboundMessage, ParsedEvent, Request};
use crate::transport::{ChannelEvent, EventKind, Listener, ResilientChannel, listener};

use super::pending::PendingConfirmations;

// ============================================================================
// Collaborators
// ============================================================================

/// Closes browser tabs.
pub trait TabCloser: Send + Sync {
    /// Closes `tabs`. Called at most once per confirmed request.
    fn close_tabs(&self, tabs: &[TabId]);
}

/// Source of the auth token and sink for re-authentication requests.
pub trait AuthContext: Send + Sync {
    /// Current token, if logged in.
    fn auth_token(&self) -> Option<String>;

    /// The server rejected the token.
    ///
    /// `replay` is the request the server bounced; pass it to
    /// [`CorrelationCoordinator::replay`] once a fresh token is available.
    fn need_valid_token(&self, replay: Option<Value>) {
        debug!(has_replay = replay.is_some(), "Server requested a valid token");
    }
}

/// [`AuthContext`] with a fixed token.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

impl AuthContext for StaticToken {
    fn auth_token(&self) -> Option<String> {
        self.0.clone()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Handles inbound frames; runs on the channel's supervisor task.
struct Router {
    pending: Arc<PendingConfirmations>,
    closer: Arc<dyn TabCloser>,
    auth: Arc<dyn AuthContext>,
}

impl Router {
    fn handle_frame(&self, text: &str) {
        let message = match InboundMessage::from_frame(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(frame = %text, error = %e, "Discarding malformed frame");
                return;
            }
        };

        let Some(event) = message.parse() else {
            trace!("Frame without event ignored");
            return;
        };

        if let Some(request_id) = event.confirmed_request() {
            self.confirm(request_id);
            return;
        }

        match event {
            ParsedEvent::LinkAdded { .. } | ParsedEvent::LinksAdded { .. } => {
                trace!("Confirmation without requestId ignored");
            }

            ParsedEvent::NeedValidToken { replay } => {
                self.auth.need_valid_token(replay);
            }

            ParsedEvent::Unknown { event, .. } => {
                trace!(%event, "Unhandled event");
            }
        }
    }

    fn confirm(&self, request_id: &RequestId) {
        match self.pending.confirm(request_id) {
            Some(tabs) => {
                debug!(%request_id, tabs = tabs.len(), "Request confirmed, closing tabs");
                self.closer.close_tabs(&tabs);
            }
            None => {
                trace!(%request_id, "Confirmation for unknown or settled request");
            }
        }
    }
}

// ============================================================================
// CorrelationCoordinator
// ============================================================================

/// Matches confirmable requests with their confirmation events.
///
/// Registers a `message` listener on the channel for its lifetime.
///
/// # Example
///
/// ```ignore
/// let coordinator = CorrelationCoordinator::new(channel, closer, auth);
///
/// let links = vec![Link::new("Example", "https://example.com")];
/// match coordinator.send_and_close(Request::add_links(&links), vec![TabId::new(7)]) {
///     Ok(id) => println!("waiting for {id:?}"),
///     Err(e) if e.is_offline() => println!("LinkBox server is offline"),
///     Err(e) => return Err(e),
/// }
/// ```
pub struct CorrelationCoordinator {
    channel: Arc<ResilientChannel>,
    pending: Arc<PendingConfirmations>,
    auth: Arc<dyn AuthContext>,
    listener: Listener,
}

impl CorrelationCoordinator {
    /// Creates a coordinator and subscribes it to `channel`.
    pub fn new(
        channel: Arc<ResilientChannel>,
        closer: Arc<dyn TabCloser>,
        auth: Arc<dyn AuthContext>,
    ) -> Self {
        let pending = Arc::new(PendingConfirmations::new());
        let router = Router {
            pending: Arc::clone(&pending),
            closer,
            auth: Arc::clone(&auth),
        };

        let listener = listener(move |event| {
            if let ChannelEvent::Message(text) = event {
                router.handle_frame(text);
            }
        });
        channel.add_event_listener(EventKind::Message, Arc::clone(&listener));

        Self {
            channel,
            pending,
            auth,
            listener,
        }
    }

    /// Sends `request`, assigning a correlation id if it is confirmable.
    ///
    /// Returns the assigned id, or `None` for methods the server does not
    /// confirm. Attach the side effect with
    /// [`register_pending_side_effect`](Self::register_pending_side_effect).
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelNotOpen`] if the channel is not open; nothing is sent
    /// - [`Error::ConnectionClosed`] if the connection dropped mid-send
    /// - [`Error::Json`] if the request cannot be serialized
    pub fn send_confirmable(&self, request: Request) -> Result<Option<RequestId>> {
        self.dispatch(request, None)
    }

    /// Sends a confirmable request and closes `tabs` once it is confirmed.
    ///
    /// The side effect is registered before the frame leaves, so a fast
    /// confirmation cannot miss it. A rejected send leaves nothing pending.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the method is not confirmable
    /// - Otherwise as [`send_confirmable`](Self::send_confirmable)
    pub fn send_and_close(
        &self,
        request: Request,
        tabs: impl IntoIterator<Item = TabId>,
    ) -> Result<RequestId> {
        if !request.requires_confirmation() {
            return Err(Error::protocol(format!(
                "method {} is never confirmed",
                request.method
            )));
        }

        let id = self.dispatch(request, Some(tabs.into_iter().collect()))?;
        id.ok_or_else(|| Error::protocol("confirmable request sent without id"))
    }

    /// Parks `tabs` until `request_id` is confirmed.
    ///
    /// No-op when `request_id` is `None`.
    pub fn register_pending_side_effect(
        &self,
        request_id: Option<&RequestId>,
        tabs: impl IntoIterator<Item = TabId>,
    ) {
        if let Some(id) = request_id {
            self.pending.register(id.clone(), tabs);
        }
    }

    /// Re-sends a request bounced by `need-valid-token` with the current token.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if `message` is not a JSON object
    /// - [`Error::ChannelNotOpen`] if the channel is not open
    pub fn replay(&self, mut message: Value) -> Result<()> {
        let state = self.channel.ready_state();
        if !state.is_open() {
            return Err(Error::channel_not_open(state));
        }

        let Some(object) = message.as_object_mut() else {
            return Err(Error::protocol("replayed request must be a JSON object"));
        };
        let token = self.auth.auth_token().map_or(Value::Null, Value::String);
        object.insert("authToken".to_string(), token);

        if self.channel.send(serde_json::to_string(&message)?) {
            Ok(())
        } else {
            Err(self.send_rejected())
        }
    }

    /// Pending confirmation entries.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> &PendingConfirmations {
        &self.pending
    }

    /// Returns `true` if `request_id` is still waiting for confirmation.
    #[inline]
    #[must_use]
    pub fn is_pending(&self, request_id: &RequestId) -> bool {
        self.pending.contains(request_id)
    }

    /// Underlying channel.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> &Arc<ResilientChannel> {
        &self.channel
    }

    fn dispatch(&self, mut request: Request, tabs: Option<Vec<TabId>>) -> Result<Option<RequestId>> {
        let state = self.channel.ready_state();
        if !state.is_open() {
            debug!(%state, method = %request.method, "Send rejected, channel not open");
            return Err(Error::channel_not_open(state));
        }

        request.auth_token = self.auth.auth_token();
        request.request_id = request
            .requires_confirmation()
            .then(|| self.pending.next_id());
        let frame = request.to_frame()?;

        if let (Some(id), Some(tabs)) = (&request.request_id, tabs) {
            self.pending.register(id.clone(), tabs);
        }

        if !self.channel.send(frame) {
            if let Some(id) = &request.request_id {
                self.pending.abandon(id);
            }
            return Err(self.send_rejected());
        }

        debug!(method = %request.method, request_id = ?request.request_id, "Request sent");
        Ok(request.request_id)
    }

    fn send_rejected(&self) -> Error {
        match self.channel.ready_state() {
            state if state.is_open() => Error::ConnectionClosed,
            state => Error::channel_not_open(state),
        }
    }
}

impl Drop for CorrelationCoordinator {
    fn drop(&mut self) {
        self.channel
            .remove_event_listener(EventKind::Message, &self.listener);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::time::sleep;

    use crate::protocol::Link;
    use crate::transport::connector::testing::{Attempt, Peer, ScriptedConnector};
    use crate::transport::{ChannelOptions, Connector, ReadyState};

    #[derive(Default)]
    struct RecordingCloser {
        closed: Mutex<Vec<Vec<TabId>>>,
    }

    impl TabCloser for RecordingCloser {
        fn close_tabs(&self, tabs: &[TabId]) {
            self.closed.lock().push(tabs.to_vec());
        }
    }

    #[derive(Default)]
    struct RecordingAuth {
        token: Option<String>,
        bounced: Mutex<Vec<Option<Value>>>,
    }

    impl AuthContext for RecordingAuth {
        fn auth_token(&self) -> Option<String> {
            self.token.clone()
        }

        fn need_valid_token(&self, replay: Option<Value>) {
            self.bounced.lock().push(replay);
        }
    }

    struct Harness {
        coordinator: CorrelationCoordinator,
        closer: Arc<RecordingCloser>,
        auth: Arc<RecordingAuth>,
        connector: Arc<ScriptedConnector>,
    }

    fn harness(script: Vec<Attempt>) -> Harness {
        let connector = Arc::new(ScriptedConnector::new(script));
        let channel = ResilientChannel::with_connector(
            "ws://linkbox.test:9886",
            Vec::new(),
            ChannelOptions::new(),
            Arc::clone(&connector) as Arc<dyn Connector>,
        )
        .expect("valid channel");

        let closer = Arc::new(RecordingCloser::default());
        let auth = Arc::new(RecordingAuth {
            token: Some("tok".into()),
            ..RecordingAuth::default()
        });
        let coordinator = CorrelationCoordinator::new(
            channel,
            Arc::clone(&closer) as Arc<dyn TabCloser>,
            Arc::clone(&auth) as Arc<dyn AuthContext>,
        );

        Harness {
            coordinator,
            closer,
            auth,
            connector,
        }
    }

    async fn open(harness: &Harness) -> Peer {
        for _ in 0..10_000 {
            if harness.coordinator.channel().ready_state() == ReadyState::Open {
                return harness.connector.take_peer().expect("accepted");
            }
            sleep(Duration::from_millis(1)).await;
        }
        panic!("channel never opened");
    }

    fn tabs(ids: &[u32]) -> Vec<TabId> {
        ids.iter().copied().map(TabId::new).collect()
    }

    fn confirmation(event: &str, id: &RequestId) -> String {
        json!({ "event": event, "payload": { "requestId": id.as_str() } }).to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_closes_tabs_exactly_once() {
        let h = harness(vec![Attempt::Accept]);
        let mut peer = open(&h).await;

        let links = vec![Link::new("A", "https://a.test"), Link::new("B", "https://b.test")];
        let id = h
            .coordinator
            .send_confirmable(Request::add_links(&links))
            .expect("open channel")
            .expect("confirmable");
        h.coordinator
            .register_pending_side_effect(Some(&id), tabs(&[1, 2]));

        sleep(Duration::from_millis(5)).await;
        let sent: Value = serde_json::from_str(&peer.drain_text()[0]).unwrap();
        assert_eq!(sent["method"], "add-links");
        assert_eq!(sent["requestId"], id.as_str());
        assert_eq!(sent["authToken"], "tok");

        peer.push_text(&confirmation("links-added", &id));
        peer.push_text(&confirmation("links-added", &id));
        sleep(Duration::from_millis(5)).await;

        assert_eq!(*h.closer.closed.lock(), vec![tabs(&[1, 2])]);
        assert!(!h.coordinator.is_pending(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_and_close_with_link_added() {
        let h = harness(vec![Attempt::Accept]);
        let peer = open(&h).await;

        let id = h
            .coordinator
            .send_and_close(Request::add_link(Link::new("A", "https://a.test")), tabs(&[5]))
            .expect("sent");
        assert!(h.coordinator.is_pending(&id));

        peer.push_text(&confirmation("link-added", &id));
        sleep(Duration::from_millis(5)).await;

        assert_eq!(*h.closer.closed.lock(), vec![tabs(&[5])]);
        assert!(h.coordinator.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_confirmation_is_ignored() {
        let h = harness(vec![Attempt::Accept]);
        let peer = open(&h).await;

        let id = h
            .coordinator
            .send_and_close(Request::add_links(&[]), tabs(&[1]))
            .unwrap();

        peer.push_text(&confirmation("links-added", &RequestId::new("never-sent")));
        peer.push_text(r#"{"event":"links-added","payload":{}}"#);
        peer.push_text("{ not json");
        peer.push_text(r#"{"event":"something-else"}"#);
        sleep(Duration::from_millis(5)).await;

        assert!(h.closer.closed.lock().is_empty());
        assert!(h.coordinator.is_pending(&id));
        assert_eq!(h.coordinator.channel().ready_state(), ReadyState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_connecting_fails_without_frame() {
        let h = harness(vec![Attempt::Accept]);

        let err = h
            .coordinator
            .send_and_close(Request::add_links(&[]), tabs(&[1]))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ChannelNotOpen {
                state: ReadyState::Connecting
            }
        ));
        assert!(!err.is_offline());
        assert!(h.coordinator.pending().is_empty());

        let mut peer = open(&h).await;
        sleep(Duration::from_millis(5)).await;
        assert!(peer.drain_text().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_closed_is_offline() {
        let h = harness(Vec::new());
        sleep(Duration::from_millis(5)).await;
        assert_eq!(h.coordinator.channel().ready_state(), ReadyState::Closed);

        let err = h
            .coordinator
            .send_confirmable(Request::add_links(&[]))
            .unwrap_err();
        assert!(err.is_offline());
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_confirmable_request_has_no_id() {
        let h = harness(vec![Attempt::Accept]);
        let mut peer = open(&h).await;

        let id = h
            .coordinator
            .send_confirmable(Request::new("ping", Value::Null))
            .unwrap();
        assert!(id.is_none());

        h.coordinator.register_pending_side_effect(id.as_ref(), tabs(&[3]));
        assert!(h.coordinator.pending().is_empty());

        sleep(Duration::from_millis(5)).await;
        let sent: Value = serde_json::from_str(&peer.drain_text()[0]).unwrap();
        assert!(sent.get("requestId").is_none());

        let err = h
            .coordinator
            .send_and_close(Request::new("ping", Value::Null), tabs(&[3]))
            .unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ids_unique_while_pending() {
        let h = harness(vec![Attempt::Accept]);
        let _peer = open(&h).await;

        let mut ids = Vec::new();
        for n in 0..50 {
            let id = h
                .coordinator
                .send_and_close(Request::add_links(&[]), tabs(&[n]))
                .unwrap();
            assert!(!ids.contains(&id));
            ids.push(id);
        }
        assert_eq!(h.coordinator.pending().len(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_survives_reconnect() {
        let h = harness(vec![Attempt::Accept, Attempt::Accept]);
        let peer = open(&h).await;

        let id = h
            .coordinator
            .send_and_close(Request::add_links(&[]), tabs(&[4]))
            .unwrap();

        drop(peer);
        sleep(Duration::from_millis(1100)).await;
        let peer = open(&h).await;
        assert!(h.coordinator.is_pending(&id));

        peer.push_text(&confirmation("links-added", &id));
        sleep(Duration::from_millis(5)).await;
        assert_eq!(*h.closer.closed.lock(), vec![tabs(&[4])]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_need_valid_token_and_replay() {
        let h = harness(vec![Attempt::Accept]);
        let mut peer = open(&h).await;

        peer.push_text(
            r#"{"event":"need-valid-token","payload":{"method":"add-link","payload":{"title":"A","link":"https://a.test"},"authToken":"expired"}}"#,
        );
        sleep(Duration::from_millis(5)).await;

        let bounced = h.auth.bounced.lock().pop().flatten().expect("replay payload");
        h.coordinator.replay(bounced).expect("replayed");
        sleep(Duration::from_millis(5)).await;

        let sent: Value = serde_json::from_str(&peer.drain_text()[0]).unwrap();
        assert_eq!(sent["method"], "add-link");
        assert_eq!(sent["authToken"], "tok");
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_rejects_non_object() {
        let h = harness(vec![Attempt::Accept]);
        let _peer = open(&h).await;

        let err = h.coordinator.replay(json!([1, 2])).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_detaches_listener() {
        let h = harness(vec![Attempt::Accept]);
        let channel = Arc::clone(h.coordinator.channel());
        assert_eq!(channel.listener_count(EventKind::Message), 1);

        drop(h);
        assert_eq!(channel.listener_count(EventKind::Message), 0);
    }
}
