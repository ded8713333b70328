//! Connection establishment.
//!
//! A [`Connector`] opens one raw connection and hands back its split
//! halves. [`ResilientChannel`](super::ResilientChannel) calls it once per
//! attempt; everything about retrying lives in the channel.

// ============================================================================
// Imports
// ============================================================================

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Sink, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Outbound half of a raw connection.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Inbound half of a raw connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = std::result::Result<Message, WsError>> + Send>>;

/// An established raw connection.
pub struct RawConnection {
    /// Frames to the server.
    pub sink: FrameSink,
    /// Frames from the server.
    pub stream: FrameStream,
}

// ============================================================================
// Connector
// ============================================================================

/// Opens raw connections to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Performs a single connection attempt.
    ///
    /// # Errors
    ///
    /// Any error counts as a failed attempt and leads to a close event.
    async fn connect(&self, endpoint: &Url, protocols: &[String]) -> Result<RawConnection>;
}

// ============================================================================
// WsConnector
// ============================================================================

/// [`Connector`] backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &Url, protocols: &[String]) -> Result<RawConnection> {
        let mut request = endpoint.as_str().into_client_request()?;

        if !protocols.is_empty() {
            let header = HeaderValue::from_str(&protocols.join(", "))
                .map_err(|e| Error::config(format!("Invalid subprotocol: {e}")))?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, header);
        }

        let (ws_stream, response) = connect_async(request)
            .await
            .map_err(|e| Error::connection(format!("{endpoint}: {e}")))?;

        debug!(%endpoint, status = %response.status(), "WebSocket handshake completed");

        let (sink, stream) = ws_stream.split();
        Ok(RawConnection {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

// ============================================================================
// Test Support
// ============================================================================
