//! Pending confirmation map.
//!
//! One entry per confirmable request still waiting for the server. Entries
//! never expire on their own; [`PendingConfirmations::expire_older_than`]
//! and [`PendingConfirmations::abandon`] are the explicit ways out.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::time::Instant;
use tracing::debug;

use crate::identifiers::{RequestId, TabId};

// ============================================================================
// Types
// ============================================================================

/// Side effect parked until confirmation.
#[derive(Debug)]
struct PendingEntry {
    tabs: Vec<TabId>,
    created_at: Instant,
}

/// An entry removed without its side effect running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbandonedConfirmation {
    /// Id of the unconfirmed request.
    pub request_id: RequestId,
    /// Tabs that were never closed.
    pub tabs: Vec<TabId>,
    /// Time spent waiting.
    pub age: Duration,
}

// ============================================================================
// PendingConfirmations
// ============================================================================

/// Map from request id to the tabs to close on confirmation.
#[derive(Debug, Default)]
pub struct PendingConfirmations {
    entries: Mutex<FxHashMap<RequestId, PendingEntry>>,
}

impl PendingConfirmations {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates an id that no pending entry currently uses.
    #[must_use]
    pub fn next_id(&self) -> RequestId {
        let entries = self.entries.lock();
        loop {
            let id = RequestId::generate();
            if !entries.contains_key(&id) {
                return id;
            }
        }
    }

    /// Parks `tabs` under `request_id`.
    ///
    /// Registering again under a pending id adds to the same entry.
    pub fn register(&self, request_id: RequestId, tabs: impl IntoIterator<Item = TabId>) {
        let mut entries = self.entries.lock();
        let entry = entries.entry(request_id).or_insert_with_key(|id| {
            debug!(request_id = %id, "Confirmation pending");
            PendingEntry {
                tabs: Vec::new(),
                created_at: Instant::now(),
            }
        });
        entry.tabs.extend(tabs);
    }

    /// Removes the entry for a confirmed request and returns its tabs.
    ///
    /// Returns `None` for unknown or already-confirmed ids.
    pub fn confirm(&self, request_id: &RequestId) -> Option<Vec<TabId>> {
        self.entries.lock().remove(request_id).map(|entry| entry.tabs)
    }

    /// Drops an entry without confirmation and returns its tabs.
    pub fn abandon(&self, request_id: &RequestId) -> Option<Vec<TabId>> {
        let tabs = self.entries.lock().remove(request_id).map(|entry| entry.tabs);
        if tabs.is_some() {
            debug!(%request_id, "Confirmation abandoned");
        }
        tabs
    }

    /// Drops every entry that has waited at least `age`.
    ///
    /// Side effects of the returned entries have not run.
    pub fn expire_older_than(&self, age: Duration) -> Vec<AbandonedConfirmation> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let stale: Vec<RequestId> = entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.created_at) >= age)
            .map(|(id, _)| id.clone())
            .collect();

        let mut expired: Vec<AbandonedConfirmation> = stale
            .into_iter()
            .filter_map(|id| {
                entries.remove(&id).map(|entry| AbandonedConfirmation {
                    age: now.duration_since(entry.created_at),
                    tabs: entry.tabs,
                    request_id: id,
                })
            })
            .collect();
        expired.sort_by(|a, b| b.age.cmp(&a.age));

        if !expired.is_empty() {
            debug!(count = expired.len(), "Expired pending confirmations");
        }
        expired
    }

    /// Returns `true` if `request_id` is still waiting.
    #[inline]
    #[must_use]
    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.entries.lock().contains_key(request_id)
    }

    /// Number of pending entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
