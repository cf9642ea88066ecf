//! Subscription filters, handlers and delivery modes.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::protocol::{STATE_CHANGED, ServerEvent};

// ============================================================================
// Handler Types
// ============================================================================

/// Error a subscriber callback may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a subscriber callback.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Callback producing a future per event.
pub type AsyncHandler = Arc<dyn Fn(ServerEvent) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Callback run inline on the read loop.
pub type SyncHandler = Arc<dyn Fn(&ServerEvent) -> HandlerResult + Send + Sync>;

/// Predicate used by [`EventFilter::Custom`].
pub type EventPredicate = Arc<dyn Fn(&ServerEvent) -> bool + Send + Sync>;

// ============================================================================
// EventFilter
// ============================================================================

/// Selects which events reach a subscription.
#[derive(Clone, Default)]
pub enum EventFilter {
    /// Every event, including unrecognized frames.
    #[default]
    All,

    /// Events of one type.
    EventType(String),

    /// Events of any of the listed types.
    EventTypes(Vec<String>),

    /// `state_changed` events for one entity id.
    Entity(String),

    /// Arbitrary predicate.
    Custom(EventPredicate),
}

impl EventFilter {
    /// Filter on one event type.
    #[inline]
    #[must_use]
    pub fn event_type(event_type: impl Into<String>) -> Self {
        Self::EventType(event_type.into())
    }

    /// Filter on state changes of one entity.
    #[inline]
    #[must_use]
    pub fn entity(entity_id: impl Into<String>) -> Self {
        Self::Entity(entity_id.into())
    }

    /// Filter with a custom predicate.
    #[inline]
    #[must_use]
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&ServerEvent) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    /// Returns `true` if `event` passes this filter.
    #[must_use]
    pub fn matches(&self, event: &ServerEvent) -> bool {
        match self {
            Self::All => true,
            Self::EventType(event_type) => event.kind() == event_type,
            Self::EventTypes(types) => types.iter().any(|t| t == event.kind()),
            Self::Entity(entity_id) => event.as_event().is_some_and(|e| {
                e.event_type == STATE_CHANGED && e.entity_id() == Some(entity_id.as_str())
            }),
            Self::Custom(predicate) => predicate(event),
        }
    }
}

impl fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::EventType(t) => f.debug_tuple("EventType").field(t).finish(),
            Self::EventTypes(t) => f.debug_tuple("EventTypes").field(t).finish(),
            Self::Entity(e) => f.debug_tuple("Entity").field(e).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

// ============================================================================
// Delivery
// ============================================================================

/// Delivery mode, without the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// One event at a time, in arrival order.
    Sequential,
    /// Each event on its own task.
    Concurrent,
    /// Inline on the read loop.
    Synchronous,
}

/// How a subscription's callback is run.
///
/// | Mode | Ordering | Blocks the read loop |
/// |------|----------|----------------------|
/// | `Sequential` | arrival order, one at a time | no |
/// | `Concurrent` | none | no |
/// | `Synchronous` | arrival order | **yes** |
///
/// A slow `Synchronous` callback stalls every reply and event on the
/// connection, including the replies its own commands wait for. Use it only
/// for callbacks that return immediately.
#[derive(Clone)]
pub enum Delivery {
    /// Queue per subscription drained by one worker task.
    Sequential(AsyncHandler),

    /// Spawn a task per event.
    Concurrent {
        /// The callback.
        handler: AsyncHandler,
        /// Optional cap on this subscription's in-flight callbacks.
        max_in_flight: Option<usize>,
    },

    /// Run inline on the read loop.
    Synchronous(SyncHandler),
}

impl Delivery {
    /// Sequential delivery of an async callback.
    #[must_use]
    pub fn sequential<F, Fut>(callback: F) -> Self
    where
        F: Fn(ServerEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::Sequential(boxed(callback))
    }

    /// Concurrent delivery of an async callback.
    ///
    /// `max_in_flight` bounds this subscription only; `None` is unbounded.
    #[must_use]
    pub fn concurrent<F, Fut>(callback: F, max_in_flight: Option<usize>) -> Self
    where
        F: Fn(ServerEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::Concurrent {
            handler: boxed(callback),
            max_in_flight: max_in_flight.map(|max| max.max(1)),
        }
    }

    /// Inline delivery of a blocking callback.
    #[must_use]
    pub fn synchronous<F>(callback: F) -> Self
    where
        F: Fn(&ServerEvent) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Synchronous(Arc::new(callback))
    }

    /// Returns the mode.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> DeliveryMode {
        match self {
            Self::Sequential(_) => DeliveryMode::Sequential,
            Self::Concurrent { .. } => DeliveryMode::Concurrent,
            Self::Synchronous(_) => DeliveryMode::Synchronous,
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concurrent { max_in_flight, .. } => f
                .debug_struct("Concurrent")
                .field("max_in_flight", max_in_flight)
                .finish_non_exhaustive(),
            other => write!(f, "{:?}", other.mode()),
        }
    }
}

fn boxed<F, Fut>(callback: F) -> AsyncHandler
where
    F: Fn(ServerEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |event| callback(event).boxed())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::protocol::HassEvent;

    fn state_changed(entity_id: &str) -> ServerEvent {
        HassEvent::new(STATE_CHANGED, json!({ "entity_id": entity_id })).into()
    }

    #[test]
    fn test_filter_by_type() {
        let filter = EventFilter::event_type("call_service");
        assert!(filter.matches(&HassEvent::new("call_service", json!({})).into()));
        assert!(!filter.matches(&state_changed("light.a")));
    }

    #[test]
    fn test_filter_by_types() {
        let filter = EventFilter::EventTypes(vec!["a".into(), "b".into()]);
        assert!(filter.matches(&HassEvent::new("b", json!({})).into()));
        assert!(!filter.matches(&HassEvent::new("c", json!({})).into()));
    }

    #[test]
    fn test_filter_by_entity() {
        let filter = EventFilter::entity("light.kitchen");
        assert!(filter.matches(&state_changed("light.kitchen")));
        assert!(!filter.matches(&state_changed("light.hall")));
        assert!(!filter.matches(&HassEvent::new("call_service", json!({ "entity_id": "light.kitchen" })).into()));
    }

    #[test]
    fn test_all_matches_unrecognized() {
        let event = ServerEvent::Unrecognized {
            message_type: "new_thing".into(),
            raw: json!({ "type": "new_thing" }),
        };
        assert!(EventFilter::All.matches(&event));
        assert!(EventFilter::event_type("new_thing").matches(&event));
        assert!(!EventFilter::entity("light.a").matches(&event));
    }

    #[test]
    fn test_custom_filter() {
        let filter = EventFilter::custom(|event| event.kind().starts_with("zha"));
        assert!(filter.matches(&HassEvent::new("zha_event", json!({})).into()));
        assert!(!filter.matches(&state_changed("light.a")));
    }

    #[test]
    fn test_delivery_modes() {
        let sequential = Delivery::sequential(|_| async { Ok(()) });
        let concurrent = Delivery::concurrent(|_| async { Ok(()) }, Some(0));
        let sync = Delivery::synchronous(|_| Ok(()));

        assert_eq!(sequential.mode(), DeliveryMode::Sequential);
        assert_eq!(sync.mode(), DeliveryMode::Synchronous);
        assert!(matches!(concurrent, Delivery::Concurrent { max_in_flight: Some(1), .. }));
    }
}
