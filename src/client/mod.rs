//! LinkBox client.
//!
//! Wires a [`ResilientChannel`] and a [`CorrelationCoordinator`] together
//! and turns a window's tabs into `add-link` / `add-links` requests whose
//! tabs close once the server confirms.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use linkbox_client::{
//!     ChannelOptions, LinkBox, StaticToken, TabCloser, TabId, TabScope, TabSnapshot,
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
//! # async fn example() -> linkbox_client::Result<()> {
//! let linkbox = LinkBox::connect(
//!     "linkbox.example:9886",
//!     ChannelOptions::default(),
//!     Arc::new(Browser),
//!     Arc::new(StaticToken(Some("token".into()))),
//! )?;
//!
//! let tabs = vec![
//!     TabSnapshot::new(1u32, "Rust", "https://www.rust-lang.org/").active(),
//!     TabSnapshot::new(2u32, "Docs", "https://docs.rs/"),
//! ];
//! let dispatch = linkbox.send_tabs(&tabs, TabScope::All)?;
//! println!("sent {} links", dispatch.sent);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `selection` | Tab snapshots, scopes and filtering |

// ============================================================================
// Submodules
// ============================================================================

/// Tab selection.
pub mod selection;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::{debug, info};

use crate::correlation::{AuthContext, CorrelationCoordinator, TabCloser};
use crate::error::Result;
use crate::identifiers::{RequestId, TabId};
use crate::protocol::Request;
use crate::transport::{ChannelOptions, ResilientChannel};

pub use selection::{Selection, ServiceFilter, TabScope, TabSnapshot, select_tabs};

// ============================================================================
// Dispatch
// ============================================================================

/// Outcome of [`LinkBox::send_tabs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Correlation id of the sent request; `None` if nothing was sent.
    pub request_id: Option<RequestId>,
    /// Number of links sent.
    pub sent: usize,
    /// A tab already showing the service, for the caller to focus.
    pub service_tab: Option<TabId>,
}

// ============================================================================
// LinkBox
// ============================================================================

/// Client for one LinkBox server.
pub struct LinkBox {
    coordinator: CorrelationCoordinator,
    filter: ServiceFilter,
    host: String,
}

impl LinkBox {
    /// Connects to the server at `host` over `ws://`.
    ///
    /// Returns immediately; the channel keeps connecting in the background.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) if `host` is empty or `options` are invalid
    /// - [`Error::InvalidEndpoint`](crate::Error::InvalidEndpoint) if `host` does not form a URL
    pub fn connect(
        host: &str,
        options: ChannelOptions,
        closer: Arc<dyn TabCloser>,
        auth: Arc<dyn AuthContext>,
    ) -> Result<Self> {
        let filter = ServiceFilter::new(host)?;
        let channel = ResilientChannel::connect(&format!("ws://{host}"), Vec::new(), options)?;
        Ok(Self::assemble(channel, filter, host, closer, auth))
    }

    /// Builds a client over an existing channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if `host` is empty.
    pub fn with_channel(
        channel: Arc<ResilientChannel>,
        host: &str,
        closer: Arc<dyn TabCloser>,
        auth: Arc<dyn AuthContext>,
    ) -> Result<Self> {
        let filter = ServiceFilter::new(host)?;
        Ok(Self::assemble(channel, filter, host, closer, auth))
    }

    fn assemble(
        channel: Arc<ResilientChannel>,
        filter: ServiceFilter,
        host: &str,
        closer: Arc<dyn TabCloser>,
        auth: Arc<dyn AuthContext>,
    ) -> Self {
        info!(%host, "LinkBox client created");
        Self {
            coordinator: CorrelationCoordinator::new(channel, closer, auth),
            filter,
            host: host.to_string(),
        }
    }

    /// Sends the tabs in `scope` and closes them once the server confirms.
    ///
    /// A single tab sent with [`TabScope::Current`] uses `add-link`; every
    /// other selection uses `add-links`. An empty selection sends nothing.
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelNotOpen`](crate::Error::ChannelNotOpen) if the channel is not open;
    ///   [`Error::is_offline`](crate::Error::is_offline) tells CLOSED apart
    /// - [`Error::ConnectionClosed`](crate::Error::ConnectionClosed) if the connection dropped mid-send
    pub fn send_tabs(&self, tabs: &[TabSnapshot], scope: TabScope) -> Result<Dispatch> {
        let Selection {
            links,
            tabs,
            service_tab,
        } = select_tabs(tabs, scope, &self.filter);

        if tabs.is_empty() {
            debug!(?scope, "No tabs selected, nothing sent");
            return Ok(Dispatch {
                request_id: None,
                sent: 0,
                service_tab,
            });
        }

        let sent = links.len();
        let request = match links.as_slice() {
            [link] if scope == TabScope::Current => Request::add_link(link.clone()),
            _ => Request::add_links(&links),
        };

        let request_id = self.coordinator.send_and_close(request, tabs)?;
        debug!(%request_id, sent, ?scope, "Tabs sent to LinkBox");

        Ok(Dispatch {
            request_id: Some(request_id),
            sent,
            service_tab,
        })
    }

    /// URL of the LinkBox web page.
    #[must_use]
    pub fn service_page(&self) -> String {
        format!("http://{}", self.host)
    }

    /// Returns `true` if `url` points at this server.
    #[inline]
    #[must_use]
    pub fn is_service_url(&self, url: &str) -> bool {
        self.filter.is_service(url)
    }

    /// Correlation coordinator.
    #[inline]
    #[must_use]
    pub fn coordinator(&self) -> &CorrelationCoordinator {
        &self.coordinator
    }

    /// Underlying channel.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> &Arc<ResilientChannel> {
        self.coordinator.channel()
    }

    /// Closes the channel permanently.
    pub fn close(&self) {
        self.coordinator.channel().close();
    }
}

// ============================================================================
// Tests
// ============================================================================
