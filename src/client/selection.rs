//! Tab selection.
//!
//! Decides which tabs of a window are handed to LinkBox. Operates on a
//! snapshot supplied by the caller; querying the browser is not done here.

// ============================================================================
// Imports
// ============================================================================

use regex::Regex;

use crate::error::{Error, Result};
use crate::identifiers::TabId;
use crate::protocol::Link;

// ============================================================================
// TabSnapshot
// ============================================================================

/// A tab as seen when the selection is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabSnapshot {
    /// Browser tab id.
    pub id: TabId,
    /// Page title.
    pub title: String,
    /// Page URL.
    pub url: String,
    /// `true` for the window's focused tab.
    pub active: bool,
}

impl TabSnapshot {
    /// Creates an inactive tab snapshot.
    #[must_use]
    pub fn new(id: impl Into<TabId>, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: url.into(),
            active: false,
        }
    }

    /// Marks the tab as the active one.
    #[inline]
    #[must_use]
    pub fn active(mut self) -> Self {
        self.active = true;
        self
    }
}

// ============================================================================
// TabScope
// ============================================================================

/// Which tabs of a window to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TabScope {
    /// Every tab in the window.
    #[default]
    All,
    /// The active tab only.
    Current,
    /// Every tab except the active one.
    AllExceptCurrent,
    /// Tabs left of the active tab.
    Left,
    /// Tabs right of the active tab.
    Right,
}

impl TabScope {
    /// Returns `true` if the tab at `index` falls in scope.
    ///
    /// `active` is the active tab's index. Scopes relative to it select
    /// nothing when the window has no active tab.
    fn includes(self, index: usize, active: Option<usize>) -> bool {
        match (self, active) {
            (Self::All, _) => true,
            (Self::Current, Some(active)) => index == active,
            (Self::AllExceptCurrent, Some(active)) => index != active,
            (Self::AllExceptCurrent, None) => true,
            (Self::Left, Some(active)) => index < active,
            (Self::Right, Some(active)) => index > active,
            (Self::Current | Self::Left | Self::Right, None) => false,
        }
    }
}

// ============================================================================
// ServiceFilter
// ============================================================================

/// Recognizes URLs that must never be sent.
///
/// A URL is excluded if it contains the service host or is a browser
/// internal page (`chrome://`, `chrome-extension://`, ...).
#[derive(Debug, Clone)]
pub struct ServiceFilter {
    service: Regex,
    internal: Regex,
}

impl ServiceFilter {
    /// Creates a filter for the LinkBox service at `host` (e.g. `"linkbox.example:9886"`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `host` is empty.
    pub fn new(host: &str) -> Result<Self> {
        if host.is_empty() {
            return Err(Error::config("service host must not be empty"));
        }

        let service = Regex::new(&regex::escape(host))
            .map_err(|e| Error::config(format!("Invalid service host: {e}")))?;
        let internal =
            Regex::new("^chrome").map_err(|e| Error::config(format!("Invalid pattern: {e}")))?;

        Ok(Self { service, internal })
    }

    /// Returns `true` if `url` points at the service.
    #[inline]
    #[must_use]
    pub fn is_service(&self, url: &str) -> bool {
        self.service.is_match(url)
    }

    /// Returns `true` if `url` may be sent.
    #[inline]
    #[must_use]
    pub fn is_sendable(&self, url: &str) -> bool {
        !self.is_service(url) && !self.internal.is_match(url)
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Result of [`select_tabs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Links to send, in tab order.
    pub links: Vec<Link>,
    /// Tabs to close once the server confirms.
    pub tabs: Vec<TabId>,
    /// A tab already showing the service, if any. The last one wins.
    pub service_tab: Option<TabId>,
}

impl Selection {
    /// Returns `true` if no tab was selected.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }
}

/// Selects the tabs of one window that fall in `scope`.
///
/// Service and browser-internal tabs are skipped but the service tab is
/// still reported in [`Selection::service_tab`], whatever the scope.
#[must_use]
pub fn select_tabs(tabs: &[TabSnapshot], scope: TabScope, filter: &ServiceFilter) -> Selection {
    let active = tabs.iter().position(|tab| tab.active);
    let mut selection = Selection::default();

    for (index, tab) in tabs.iter().enumerate() {
        if filter.is_service(&tab.url) {
            selection.service_tab = Some(tab.id);
        }

        if scope.includes(index, active) && filter.is_sendable(&tab.url) {
            selection.links.push(Link::new(&tab.title, &tab.url));
            selection.tabs.push(tab.id);
        }
    }

    selection
}

// ============================================================================
// Tests
// ============================================================================
