//! Type-safe identifiers.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! | Type | Scope | Source |
//! |------|-------|--------|
//! | [`CommandId`] | One connection epoch | [`CommandId::new`] from the correlator's counter |
//! | [`ConnectionId`] | One client | [`ConnectionId::next`] from the supervisor |
//! | [`SubscriptionId`] | Process | [`SubscriptionId::next`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// CommandId
// ============================================================================

/// Correlation id linking an outgoing command to its result frame.
///
/// Allocated by the per-epoch correlator; starts at 1 and never repeats
/// within an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(u64);

impl CommandId {
    /// Wraps a raw id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ConnectionId
// ============================================================================

/// Epoch counter identifying one connection attempt.
///
/// Strictly increases across attempts made by the same client. Used to
/// detect callbacks and deliveries that belong to a stale epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Sentinel meaning "no epoch".
    pub(crate) const NONE: Self = Self(0);

    /// Allocates the next id from a client-owned counter.
    #[inline]
    pub(crate) fn next(counter: &AtomicU64) -> Self {
        Self(counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Wraps a raw id, returning `None` for 0.
    #[inline]
    #[must_use]
    pub fn from_u64(id: u64) -> Option<Self> {
        (id > 0).then_some(Self(id))
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one event subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocates a new process-unique id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_increases() {
        let counter = AtomicU64::new(0);
        let first = ConnectionId::next(&counter);
        let second = ConnectionId::next(&counter);
        assert_eq!(first.as_u64(), 1);
        assert!(second > first);
        assert!(first > ConnectionId::NONE);
    }

    #[test]
    fn test_connection_id_zero_rejected() {
        assert!(ConnectionId::from_u64(0).is_none());
        assert_eq!(ConnectionId::from_u64(3).map(ConnectionId::as_u64), Some(3));
    }

    #[test]
    fn test_subscription_ids_unique() {
        let a = SubscriptionId::next();
        let b = SubscriptionId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_command_id_serializes_as_number() {
        let json = serde_json::to_string(&CommandId::new(42)).unwrap();
        assert_eq!(json, "42");
    }
}
