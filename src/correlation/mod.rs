//! Request/confirmation correlation.
//!
//! Ties a confirmable request to the side effect that must wait for the
//! server's acknowledgement: the tabs whose links were sent are closed only
//! once the matching `link-added` / `links-added` event arrives.
//!
//! # Flow
//!
//! ```text
//! send_and_close(request, tabs)
//!   → id assigned, tabs parked under id      (PendingConfirmations)
//!   → frame sent                             (ResilientChannel)
//!   ... later ...
//! "links-added" { requestId: id }
//!   → entry removed, TabCloser::close_tabs   (exactly once)
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `coordinator` | Sending, frame routing and collaborator traits |
//! | `pending` | Pending confirmation map |

// ============================================================================
// Submodules
// ============================================================================

/// Correlation coordinator.
pub mod coordinator;

/// Pending confirmation entries.
pub mod pending;

// ============================================================================
// Re-exports
// ============================================================================

pub use coordinator::{AuthContext, CorrelationCoordinator, StaticToken, TabCloser};
pub use pending::{AbandonedConfirmation, PendingConfirmations};
