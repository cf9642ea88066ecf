//! Client facade and reconnect supervision.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | [`Client`] and [`ConnectionEvent`] |
//! | `builder` | [`ClientBuilder`] and environment loading |
//! | `commands` | Typed helpers for common commands |
//! | `supervisor` | Reconnect loop and [`StopReason`] |

// ============================================================================
// Submodules
// ============================================================================

/// Builder for [`Client`].
pub mod builder;

/// Typed command helpers.
mod commands;

/// The client facade.
mod core;

/// Reconnect loop.
mod supervisor;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use core::{Client, ConnectionEvent};
pub use supervisor::StopReason;
