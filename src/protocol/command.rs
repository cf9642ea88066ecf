//! Command definitions.
//!
//! Commands are JSON objects with a `type` field naming the command. The
//! correlation `id` is inserted by the codec when the command is sent.
//!
//! | Type | Purpose |
//! |------|---------|
//! | `subscribe_events` | Start server-side event push |
//! | `unsubscribe_events` | Stop a server-side subscription |
//! | `call_service` | Invoke a service |
//! | `fire_event` | Fire a custom event |
//! | `get_states` | Snapshot of all entity states |
//! | `get_config` | Server configuration and run state |
//! | `get_services` | Service catalogue |
//! | `config/*_registry/list` | Area, device and entity registries |
//! | `input_boolean/*`, `input_number/*` | List, create and delete helpers |
//! | `ping` | Liveness check, answered with `pong` |
//!
//! Anything else can be sent as a [`RawCommand`].

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

use super::helper::NewInputNumber;

// ============================================================================
// Command
// ============================================================================

/// Typed commands understood by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    /// Start receiving events, optionally of one type only.
    #[serde(rename = "subscribe_events")]
    SubscribeEvents {
        /// Restrict to one event type; `None` means all events.
        #[serde(skip_serializing_if = "Option::is_none")]
        event_type: Option<String>,
    },

    /// Stop a server-side subscription created by `subscribe_events`.
    #[serde(rename = "unsubscribe_events")]
    UnsubscribeEvents {
        /// Id of the `subscribe_events` command.
        subscription: u64,
    },

    /// Call a service.
    #[serde(rename = "call_service")]
    CallService {
        /// Service domain, e.g. `light`.
        domain: String,
        /// Service name, e.g. `turn_on`.
        service: String,
        /// Service data.
        #[serde(skip_serializing_if = "Option::is_none")]
        service_data: Option<Value>,
        /// Entities, devices or areas to target.
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<ServiceTarget>,
    },

    /// Fire a custom event on the server bus.
    #[serde(rename = "fire_event")]
    FireEvent {
        /// Event type.
        event_type: String,
        /// Event data.
        #[serde(skip_serializing_if = "Option::is_none")]
        event_data: Option<Value>,
    },

    /// Get all entity states.
    #[serde(rename = "get_states")]
    GetStates,

    /// Get the server configuration.
    #[serde(rename = "get_config")]
    GetConfig,

    /// Get all services.
    #[serde(rename = "get_services")]
    GetServices,

    /// List areas.
    #[serde(rename = "config/area_registry/list")]
    ListAreas,

    /// List devices.
    #[serde(rename = "config/device_registry/list")]
    ListDevices,

    /// List entity registry entries.
    #[serde(rename = "config/entity_registry/list")]
    ListEntities,

    /// List `input_boolean` helpers.
    #[serde(rename = "input_boolean/list")]
    ListInputBooleans,

    /// Create an `input_boolean` helper.
    #[serde(rename = "input_boolean/create")]
    CreateInputBoolean {
        /// Display name.
        name: String,
    },

    /// Delete an `input_boolean` helper.
    #[serde(rename = "input_boolean/delete")]
    DeleteInputBoolean {
        /// Helper id.
        input_boolean_id: String,
    },

    /// List `input_number` helpers.
    #[serde(rename = "input_number/list")]
    ListInputNumbers,

    /// Create an `input_number` helper.
    #[serde(rename = "input_number/create")]
    CreateInputNumber(NewInputNumber),

    /// Delete an `input_number` helper.
    #[serde(rename = "input_number/delete")]
    DeleteInputNumber {
        /// Helper id.
        input_number_id: String,
    },

    /// Ping; the server replies with `pong`.
    #[serde(rename = "ping")]
    Ping,
}

impl Command {
    /// Creates a `subscribe_events` command for all events.
    #[inline]
    #[must_use]
    pub fn subscribe_all() -> Self {
        Self::SubscribeEvents { event_type: None }
    }

    /// Creates a `call_service` command.
    #[inline]
    #[must_use]
    pub fn call_service(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: Option<Value>,
        target: Option<ServiceTarget>,
    ) -> Self {
        Self::CallService {
            domain: domain.into(),
            service: service.into(),
            service_data,
            target,
        }
    }

    /// Returns the wire name of this command.
    #[must_use]
    pub fn command_type(&self) -> &'static str {
        match self {
            Self::SubscribeEvents { .. } => "subscribe_events",
            Self::UnsubscribeEvents { .. } => "unsubscribe_events",
            Self::CallService { .. } => "call_service",
            Self::FireEvent { .. } => "fire_event",
            Self::GetStates => "get_states",
            Self::GetConfig => "get_config",
            Self::GetServices => "get_services",
            Self::ListAreas => "config/area_registry/list",
            Self::ListDevices => "config/device_registry/list",
            Self::ListEntities => "config/entity_registry/list",
            Self::ListInputBooleans => "input_boolean/list",
            Self::CreateInputBoolean { .. } => "input_boolean/create",
            Self::DeleteInputBoolean { .. } => "input_boolean/delete",
            Self::ListInputNumbers => "input_number/list",
            Self::CreateInputNumber(_) => "input_number/create",
            Self::DeleteInputNumber { .. } => "input_number/delete",
            Self::Ping => "ping",
        }
    }
}

// ============================================================================
// ServiceTarget
// ============================================================================

/// Target of a service call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTarget {
    /// Entity ids.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entity_id: Vec<String>,

    /// Device ids.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_id: Vec<String>,

    /// Area ids.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub area_id: Vec<String>,
}

impl ServiceTarget {
    /// Targets a single entity.
    #[inline]
    #[must_use]
    pub fn entity(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: vec![entity_id.into()],
            ..Default::default()
        }
    }

    /// Adds an entity.
    #[inline]
    #[must_use]
    pub fn with_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id.push(entity_id.into());
        self
    }

    /// Adds an area.
    #[inline]
    #[must_use]
    pub fn with_area(mut self, area_id: impl Into<String>) -> Self {
        self.area_id.push(area_id.into());
        self
    }

    /// Adds a device.
    #[inline]
    #[must_use]
    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id.push(device_id.into());
        self
    }
}

// ============================================================================
// RawCommand
// ============================================================================

/// Untyped command for anything [`Command`] does not cover.
///
/// # Example
///
/// ```ignore
/// let cmd = RawCommand::new("config/label_registry/list");
/// let cmd = RawCommand::new("render_template").field("template", "{{ now() }}");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCommand {
    /// Command type.
    #[serde(rename = "type")]
    pub command_type: String,

    /// Remaining fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RawCommand {
    /// Creates a command with no extra fields.
    #[inline]
    #[must_use]
    pub fn new(command_type: impl Into<String>) -> Self {
        Self {
            command_type: command_type.into(),
            fields: Map::new(),
        }
    }

    /// Adds a field.
    #[inline]
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// CommandPayload
// ============================================================================

/// Validated command body: a JSON object with a string `type`.
///
/// Built from any serializable command, so callers can bring their own
/// command structs.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandPayload {
    fields: Map<String, Value>,
}

impl CommandPayload {
    /// Serializes a command and validates its shape.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if serialization fails
    /// - [`Error::Protocol`] if the result is not an object with a string `type`
    ///   or already carries an `id`
    pub fn from_serialize<C: Serialize + ?Sized>(command: &C) -> Result<Self> {
        match serde_json::to_value(command)? {
            Value::Object(fields) => Self::from_fields(fields),
            other => Err(Error::protocol(format!(
                "Command must serialize to an object, got {other}"
            ))),
        }
    }

    /// Validates an already-built object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if `type` is missing or `id` is present.
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self> {
        if !fields.get("type").is_some_and(Value::is_string) {
            return Err(Error::protocol("Command is missing a string \"type\" field"));
        }
        if fields.contains_key("id") {
            return Err(Error::protocol(
                "Command must not set \"id\"; it is assigned on send",
            ));
        }
        Ok(Self { fields })
    }

    /// Returns the command type.
    #[inline]
    #[must_use]
    pub fn command_type(&self) -> &str {
        self.fields
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Returns the fields, without the id.
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Consumes the payload.
    #[inline]
    #[must_use]
    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

impl TryFrom<&Command> for CommandPayload {
    type Error = Error;

    fn try_from(command: &Command) -> Result<Self> {
        Self::from_serialize(command)
    }
}

// ============================================================================
// Tests
// ============================================================================
