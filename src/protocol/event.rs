//! Event message types.
//!
//! Events are pushed by the server for every server-side subscription
//! created with `subscribe_events`.
//!
//! # Format
//!
//! ```json
//! {
//!   "id": 1,
//!   "type": "event",
//!   "event": {
//!     "event_type": "state_changed",
//!     "data": { "entity_id": "light.kitchen", "old_state": {...}, "new_state": {...} },
//!     "origin": "LOCAL",
//!     "time_fired": "2024-01-01T00:00:00+00:00",
//!     "context": { "id": "..." }
//!   }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Constants
// ============================================================================

/// Event type emitted whenever an entity changes state.
pub const STATE_CHANGED: &str = "state_changed";

// ============================================================================
// HassEvent
// ============================================================================

/// A server-side event as carried in an `event` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HassEvent {
    /// Event name, e.g. `state_changed` or `call_service`.
    pub event_type: String,

    /// Event-specific data.
    #[serde(default)]
    pub data: Value,

    /// `LOCAL` or `REMOTE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    /// ISO-8601 timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_fired: Option<String>,

    /// Context that caused the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl HassEvent {
    /// Creates an event with the given type and data.
    #[inline]
    #[must_use]
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            origin: None,
            time_fired: None,
            context: None,
        }
    }

    /// Returns `true` if this is a `state_changed` event.
    #[inline]
    #[must_use]
    pub fn is_state_change(&self) -> bool {
        self.event_type == STATE_CHANGED
    }

    /// Returns the `entity_id` field of the event data, if present.
    #[inline]
    #[must_use]
    pub fn entity_id(&self) -> Option<&str> {
        self.data.get("entity_id").and_then(Value::as_str)
    }

    /// Parses the data of a `state_changed` event.
    ///
    /// Returns `None` for other event types or malformed data.
    #[must_use]
    pub fn state_change(&self) -> Option<StateChange> {
        if !self.is_state_change() {
            return None;
        }
        serde_json::from_value(self.data.clone()).ok()
    }
}

// ============================================================================
// ServerEvent
// ============================================================================

/// Item delivered to subscribers.
///
/// Frames with an unknown `type` are forwarded as [`ServerEvent::Unrecognized`]
/// so newer servers do not break older clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A regular `event` frame.
    Event(HassEvent),

    /// A frame whose discriminator this crate does not know.
    Unrecognized {
        /// Value of the `type` field.
        message_type: String,
        /// The whole frame.
        raw: Value,
    },
}

impl ServerEvent {
    /// Returns the event type, or the unknown discriminator.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Event(event) => &event.event_type,
            Self::Unrecognized { message_type, .. } => message_type,
        }
    }

    /// Returns the wrapped event, if this is a regular event.
    #[inline]
    #[must_use]
    pub fn as_event(&self) -> Option<&HassEvent> {
        match self {
            Self::Event(event) => Some(event),
            Self::Unrecognized { .. } => None,
        }
    }
}

impl From<HassEvent> for ServerEvent {
    fn from(event: HassEvent) -> Self {
        Self::Event(event)
    }
}

// ============================================================================
// State Types
// ============================================================================

/// Snapshot of one entity's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HassState {
    /// Entity id, e.g. `light.kitchen`.
    pub entity_id: String,

    /// State string, e.g. `on`.
    #[serde(default)]
    pub state: Option<String>,

    /// Entity attributes.
    #[serde(default)]
    pub attributes: Map<String, Value>,

    /// When the state string last changed.
    #[serde(default)]
    pub last_changed: Option<String>,

    /// When the state or attributes last changed.
    #[serde(default)]
    pub last_updated: Option<String>,

    /// Context of the change.
    #[serde(default)]
    pub context: Option<Value>,
}

impl HassState {
    /// Returns an attribute by name.
    #[inline]
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

/// Parsed `state_changed` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    /// Entity that changed.
    pub entity_id: String,

    /// Previous state; `None` when the entity was just added.
    #[serde(default)]
    pub old_state: Option<HassState>,

    /// New state; `None` when the entity was removed.
    #[serde(default)]
    pub new_state: Option<HassState>,
}

impl StateChange {
    /// Returns `true` if the state string differs between old and new.
    ///
    /// Attribute-only updates return `false`.
    #[must_use]
    pub fn state_differs(&self) -> bool {
        let old = self.old_state.as_ref().and_then(|s| s.state.as_deref());
        let new = self.new_state.as_ref().and_then(|s| s.state.as_deref());
        old != new
    }
}

// ============================================================================
// HassConfig
// ============================================================================

/// Subset of the `get_config` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HassConfig {
    /// Server state, `RUNNING` once startup has finished.
    #[serde(default)]
    pub state: Option<String>,

    /// Server version.
    #[serde(default)]
    pub version: Option<String>,

    /// Configured location name.
    #[serde(default)]
    pub location_name: Option<String>,

    /// Configured time zone.
    #[serde(default)]
    pub time_zone: Option<String>,

    /// Loaded integrations.
    #[serde(default)]
    pub components: Vec<String>,
}

impl HassConfig {
    /// Returns `true` once the server reports `RUNNING`.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.as_deref() == Some("RUNNING")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn state_changed(entity: &str, old: &str, new: &str) -> HassEvent {
        HassEvent::new(
            STATE_CHANGED,
            json!({
                "entity_id": entity,
                "old_state": { "entity_id": entity, "state": old, "attributes": {} },
                "new_state": { "entity_id": entity, "state": new, "attributes": { "brightness": 255 } }
            }),
        )
    }

    #[test]
    fn test_state_change_parsing() {
        let event = state_changed("light.kitchen", "off", "on");
        let change = event.state_change().expect("state change");

        assert_eq!(change.entity_id, "light.kitchen");
        assert_eq!(change.old_state.unwrap().state.as_deref(), Some("off"));
        let new_state = change.new_state.unwrap();
        assert_eq!(new_state.state.as_deref(), Some("on"));
        assert_eq!(new_state.attribute("brightness"), Some(&json!(255)));
    }

    #[test]
    fn test_state_change_none_for_other_events() {
        let event = HassEvent::new("call_service", json!({ "domain": "light" }));
        assert!(event.state_change().is_none());
        assert_eq!(event.entity_id(), None);
    }

    #[test]
    fn test_state_differs() {
        assert!(state_changed("light.a", "off", "on").state_change().unwrap().state_differs());
        assert!(!state_changed("light.a", "on", "on").state_change().unwrap().state_differs());
    }

    #[test]
    fn test_entity_removed() {
        let event = HassEvent::new(
            STATE_CHANGED,
            json!({ "entity_id": "sensor.gone", "old_state": { "entity_id": "sensor.gone", "state": "1" }, "new_state": null }),
        );
        let change = event.state_change().unwrap();
        assert!(change.new_state.is_none());
        assert!(change.state_differs());
    }

    #[test]
    fn test_server_event_kind() {
        let event: ServerEvent = HassEvent::new("custom", Value::Null).into();
        assert_eq!(event.kind(), "custom");

        let unknown = ServerEvent::Unrecognized {
            message_type: "future_thing".into(),
            raw: json!({ "type": "future_thing" }),
        };
        assert_eq!(unknown.kind(), "future_thing");
        assert!(unknown.as_event().is_none());
    }

    #[test]
    fn test_config_running() {
        let config: HassConfig =
            serde_json::from_value(json!({ "state": "RUNNING", "version": "2024.1.0" })).unwrap();
        assert!(config.is_running());

        let starting: HassConfig = serde_json::from_value(json!({ "state": "NOT_RUNNING" })).unwrap();
        assert!(!starting.is_running());
    }
}
