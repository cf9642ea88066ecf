//! Event dispatch to subscriptions.
//!
//! Subscriptions live at the client level and survive reconnects. Each one
//! has a filter and a delivery mode; see [`Delivery`] for the trade-offs.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `subscription` | Filters, callback types, delivery modes |
//! | `dispatcher` | Fan-out, epoch gating, fault reporting |

// ============================================================================
// Submodules
// ============================================================================

/// Filters, callback types and delivery modes.
pub mod subscription;

/// Fan-out, epoch gating and fault reporting.
pub mod dispatcher;

// ============================================================================
// Re-exports
// ============================================================================

pub use dispatcher::{EventDispatcher, SubscriberFault, SubscriptionHandle};
pub use subscription::{
    AsyncHandler, Delivery, DeliveryMode, EventFilter, EventPredicate, HandlerError,
    HandlerResult, SyncHandler,
};
