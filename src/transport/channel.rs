//! Self-healing WebSocket channel.
//!
//! # Lifecycle
//!
//! ```text
//! CONNECTING ──► OPEN ──► CLOSING ──► CLOSED ──(backoff)──► CONNECTING ...
//!      │                                 ▲
//!      └──────── connect failed ─────────┘
//! ```
//!
//! The channel spawns one supervisor task that owns the raw connection:
//!
//! - Connects through the [`Connector`], bounded by `timeout_interval`
//! - Emits `open`, `message`, `error` and `close` events to listeners
//! - Schedules a retry after each close while reconnection is allowed
//! - Stops for good on [`ResilientChannel::close`] or when the retry cap is hit
//!
//! Sends are best-effort: a payload offered while the channel is not open
//! is dropped, never buffered.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::connector::{Connector, RawConnection, WsConnector};
use super::listeners::{
    CLOSE_NO_STATUS, CLOSE_NORMAL, ChannelEvent, CloseInfo, EventKind, Listener, ListenerRegistry,
};
use super::options::ChannelOptions;
use super::state::{AtomicReadyState, ReadyState};

// ============================================================================
// Shared State
// ============================================================================

/// State shared between the handle and the supervisor task.
struct Shared {
    endpoint: Url,
    protocols: Vec<String>,
    options: ChannelOptions,
    state: AtomicReadyState,
    reconnect_attempts: AtomicU32,
    should_reconnect: AtomicBool,
    exhausted: AtomicBool,
    /// Outbound queue of the live connection; `None` while not open.
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    listeners: ListenerRegistry,
}

impl Shared {
    fn emit(&self, event: ChannelEvent) {
        self.listeners.emit(&event);
    }
}

/// Why a live connection ended.
enum LinkEnd {
    /// Close frame from the server; the reply still has to be flushed.
    RemoteClose(CloseInfo),
    /// Read error, write error or stream end.
    Lost(CloseInfo),
    /// Local permanent close.
    Shutdown,
}

// ============================================================================
// ResilientChannel
// ============================================================================

/// Auto-reconnecting message channel.
///
/// Construction starts the first connection attempt immediately.
/// Dropping the handle closes the channel permanently.
///
/// # Example
///
/// ```ignore
/// use linkbox_client::transport::{ChannelOptions, EventKind, ResilientChannel, listener};
///
/// let channel = ResilientChannel::connect("ws://127.0.0.1:9886", Vec::new(), ChannelOptions::new())?;
/// channel.add_event_listener(EventKind::Message, listener(|event| println!("{event:?}")));
///
/// if channel.ready_state().is_open() {
///     channel.send(r#"{"method":"ping","payload":null}"#);
/// }
/// ```
pub struct ResilientChannel {
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
}

// ============================================================================
// ResilientChannel - Constructors
// ============================================================================

impl ResilientChannel {
    /// Creates a channel over a real WebSocket and starts connecting.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidEndpoint`] if `endpoint` is not a URL
    /// - [`Error::Config`] if `options` fail validation
    pub fn connect(
        endpoint: &str,
        protocols: Vec<String>,
        options: ChannelOptions,
    ) -> Result<Arc<Self>> {
        Self::with_connector(endpoint, protocols, options, Arc::new(WsConnector))
    }

    /// Creates a channel using a custom [`Connector`] and starts connecting.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub fn with_connector(
        endpoint: &str,
        protocols: Vec<String>,
        options: ChannelOptions,
        connector: Arc<dyn Connector>,
    ) -> Result<Arc<Self>> {
        let endpoint = Url::parse(endpoint)?;
        options.validate()?;

        let shared = Arc::new(Shared {
            endpoint,
            protocols,
            options,
            state: AtomicReadyState::new(ReadyState::Connecting),
            reconnect_attempts: AtomicU32::new(0),
            should_reconnect: AtomicBool::new(true),
            exhausted: AtomicBool::new(false),
            outbound: Mutex::new(None),
            listeners: ListenerRegistry::default(),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(Self::supervise(Arc::clone(&shared), connector, shutdown_rx));

        debug!(endpoint = %shared.endpoint, "Channel created");

        Ok(Arc::new(Self {
            shared,
            shutdown_tx,
        }))
    }
}

// ============================================================================
// ResilientChannel - Public API
// ============================================================================

impl ResilientChannel {
    /// Transmits `payload` if the channel is open; otherwise drops it.
    ///
    /// Returns `true` if the payload was handed to the live connection.
    /// Never blocks, never queues for a later connection.
    pub fn send(&self, payload: impl Into<String>) -> bool {
        let state = self.ready_state();
        if !state.is_open() {
            trace!(%state, "Dropping send on non-open channel");
            return false;
        }

        let outbound = self.shared.outbound.lock();
        match outbound.as_ref() {
            Some(tx) => tx.send(payload.into()).is_ok(),
            None => false,
        }
    }

    /// Closes the channel permanently.
    ///
    /// No reconnection is attempted afterwards, whatever close events follow.
    pub fn close(&self) {
        if self.shared.should_reconnect.swap(false, Ordering::SeqCst) {
            info!(endpoint = %self.shared.endpoint, "Channel closing permanently");
        }
        if self.shared.state.load().is_open() {
            self.shared.state.store(ReadyState::Closing);
        }
        let _ = self.shutdown_tx.send(true);
    }

    /// Current connection state.
    #[inline]
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        self.shared.state.load()
    }

    /// Retries performed since the last successful open.
    #[inline]
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Returns `true` once the retry cap has been reached.
    ///
    /// The channel stays closed from then on.
    #[inline]
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.shared.exhausted.load(Ordering::SeqCst)
    }

    /// Returns `false` after [`close`](Self::close).
    #[inline]
    #[must_use]
    pub fn should_reconnect(&self) -> bool {
        self.shared.should_reconnect.load(Ordering::SeqCst)
    }

    /// Target endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.shared.endpoint
    }

    /// Options the channel was built with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ChannelOptions {
        &self.shared.options
    }

    /// Registers a listener for `kind`.
    pub fn add_event_listener(&self, kind: EventKind, listener: Listener) {
        self.shared.listeners.add(kind, listener);
    }

    /// Removes the first registration of `listener` for `kind`.
    ///
    /// Returns `true` if one was removed.
    pub fn remove_event_listener(&self, kind: EventKind, listener: &Listener) -> bool {
        self.shared.listeners.remove(kind, listener)
    }

    /// Number of listeners registered for `kind`.
    #[inline]
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.shared.listeners.count(kind)
    }
}

impl Drop for ResilientChannel {
    fn drop(&mut self) {
        self.shared.should_reconnect.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);
    }
}

// ============================================================================
// ResilientChannel - Supervisor
// ============================================================================

impl ResilientChannel {
    /// Connect / run / back off until closed or out of retries.
    async fn supervise(
        shared: Arc<Shared>,
        connector: Arc<dyn Connector>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            shared.state.store(ReadyState::Connecting);
            debug!(
                endpoint = %shared.endpoint,
                attempt = shared.reconnect_attempts.load(Ordering::SeqCst),
                "Connecting"
            );

            let close_info = tokio::select! {
                attempt = timeout(
                    shared.options.timeout_interval,
                    connector.connect(&shared.endpoint, &shared.protocols),
                ) => {
                    match attempt {
                        Ok(Ok(connection)) => {
                            Self::run_link(&shared, connection, &mut shutdown_rx).await
                        }
                        Ok(Err(e)) => Self::failed_attempt(&shared, &e),
                        Err(_) => {
                            let timeout_ms = shared.options.timeout_interval.as_millis() as u64;
                            Self::failed_attempt(&shared, &Error::connection_timeout(timeout_ms))
                        }
                    }
                }

                () = shutdown_requested(&mut shutdown_rx) => {
                    CloseInfo::clean(CLOSE_NORMAL, "closed before open")
                }
            };

            shared.outbound.lock().take();
            shared.state.store(ReadyState::Closed);
            info!(
                endpoint = %shared.endpoint,
                code = close_info.code,
                reason = %close_info.reason,
                "Channel closed"
            );
            shared.emit(ChannelEvent::Close(close_info));

            if !shared.should_reconnect.load(Ordering::SeqCst) {
                debug!("Reconnection disabled, supervisor stopping");
                break;
            }

            let attempts = shared.reconnect_attempts.load(Ordering::SeqCst);
            if !shared.options.allows_retry(attempts) {
                shared.exhausted.store(true, Ordering::SeqCst);
                warn!(
                    endpoint = %shared.endpoint,
                    attempts,
                    "Reconnect attempts exhausted, channel stays closed"
                );
                break;
            }

            let delay = shared.options.delay_for(attempts);
            debug!(delay_ms = delay.as_millis() as u64, attempts, "Reconnect scheduled");

            tokio::select! {
                () = sleep(delay) => {}
                () = shutdown_requested(&mut shutdown_rx) => {
                    debug!("Shutdown during backoff, supervisor stopping");
                    break;
                }
            }

            shared.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
        }

        debug!(endpoint = %shared.endpoint, "Supervisor terminated");
    }

    /// Reports a connect attempt that never opened.
    fn failed_attempt(shared: &Shared, err: &Error) -> CloseInfo {
        warn!(endpoint = %shared.endpoint, error = %err, "Connection attempt failed");
        shared.emit(ChannelEvent::Error(err.to_string()));
        CloseInfo::abnormal(err.to_string())
    }

    /// Runs an open connection until it ends.
    async fn run_link(
        shared: &Shared,
        connection: RawConnection,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> CloseInfo {
        let RawConnection {
            mut sink,
            mut stream,
        } = connection;

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        *shared.outbound.lock() = Some(outbound_tx);
        shared.reconnect_attempts.store(0, Ordering::SeqCst);
        shared.state.store(ReadyState::Open);

        info!(endpoint = %shared.endpoint, "Channel open");
        shared.emit(ChannelEvent::Open);

        let end = loop {
            tokio::select! {
                biased;

                // Frames from the server
                frame = stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            trace!(len = text.as_str().len(), "Frame received");
                            shared.emit(ChannelEvent::Message(text.as_str().to_string()));
                        }

                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "WebSocket closed by remote");
                            shared.state.store(ReadyState::Closing);
                            break LinkEnd::RemoteClose(close_info_from(frame));
                        }

                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            shared.emit(ChannelEvent::Error(e.to_string()));
                            break LinkEnd::Lost(CloseInfo::abnormal(e.to_string()));
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break LinkEnd::Lost(CloseInfo::abnormal("stream ended"));
                        }

                        // Binary, Ping, Pong
                        Some(Ok(_)) => {}
                    }
                }

                // Payloads from `send`
                payload = outbound_rx.recv() => {
                    let Some(payload) = payload else {
                        break LinkEnd::Lost(CloseInfo::abnormal("outbound queue closed"));
                    };

                    if let Err(e) = sink.send(Message::Text(payload.into())).await {
                        warn!(error = %e, "Failed to send frame");
                        shared.emit(ChannelEvent::Error(e.to_string()));
                        break LinkEnd::Lost(CloseInfo::abnormal(e.to_string()));
                    }
                    trace!("Frame sent");
                }

                // Permanent close, after everything already queued
                () = shutdown_requested(shutdown_rx) => {
                    break LinkEnd::Shutdown;
                }
            }
        };

        shared.outbound.lock().take();

        match end {
            LinkEnd::Lost(info) => info,
            LinkEnd::RemoteClose(info) => {
                if let Err(e) = sink.close().await {
                    debug!(error = %e, "Close reply not flushed");
                }
                info
            }
            LinkEnd::Shutdown => {
                shared.state.store(ReadyState::Closing);

                // Payloads accepted by `send` before `close` still go out
                while let Ok(payload) = outbound_rx.try_recv() {
                    if let Err(e) = sink.send(Message::Text(payload.into())).await {
                        debug!(error = %e, "Failed to flush frame on close");
                        break;
                    }
                    trace!("Frame flushed before close");
                }

                if let Err(e) = sink.close().await {
                    debug!(error = %e, "Close handshake failed");
                }
                CloseInfo::clean(CLOSE_NORMAL, "")
            }
        }
    }
}

/// Resolves once a permanent close has been requested or the handle is gone.
async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|closed| *closed).await;
}

/// Maps a received close frame to close details.
fn close_info_from(frame: Option<CloseFrame>) -> CloseInfo {
    match frame {
        Some(frame) => CloseInfo::clean(u16::from(frame.code), frame.reason.as_str()),
        None => CloseInfo::clean(CLOSE_NO_STATUS, ""),
    }
}

// ============================================================================
// Tests
// ============================================================================
