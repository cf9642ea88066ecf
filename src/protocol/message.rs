//! Wire messages and the JSON codec.
//!
//! Every frame is one JSON object with a `type` discriminator. Decoding
//! looks at the discriminator first and then deserializes the rest of the
//! object according to the indicated variant.
//!
//! | `type` | Direction | Variant |
//! |--------|-----------|---------|
//! | `auth_required` | Server → Client | [`Message::AuthRequired`] |
//! | `auth` | Client → Server | [`Message::Auth`] |
//! | `auth_ok` / `auth_invalid` | Server → Client | [`Message::AuthOk`] / [`Message::AuthInvalid`] |
//! | any command name | Client → Server | [`Message::Command`] |
//! | `result` | Server → Client | [`Message::Result`] |
//! | `event` | Server → Client | [`Message::Event`] |
//! | `ping` / `pong` | both | [`Message::Ping`] / [`Message::Pong`] |
//! | anything else | Server → Client | [`Message::Unrecognized`] |

// ============================================================================
// Imports
// ============================================================================

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};
use crate::identifiers::CommandId;

use super::command::CommandPayload;
use super::event::HassEvent;

// ============================================================================
// Message
// ============================================================================

/// A protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Server asks the client to authenticate.
    AuthRequired {
        /// Server version, if reported.
        ha_version: Option<String>,
    },

    /// Client sends its access token.
    Auth {
        /// Long-lived access token.
        access_token: String,
    },

    /// Token accepted.
    AuthOk {
        /// Server version, if reported.
        ha_version: Option<String>,
    },

    /// Token rejected.
    AuthInvalid {
        /// Reason reported by the server.
        message: Option<String>,
    },

    /// Client command with its correlation id.
    Command {
        /// Correlation id.
        id: CommandId,
        /// Command body.
        payload: CommandPayload,
    },

    /// Reply to a command.
    Result(ResultMessage),

    /// Server-pushed event.
    Event(EventMessage),

    /// Ping with correlation id.
    Ping {
        /// Correlation id.
        id: CommandId,
    },

    /// Pong answering the ping with the same id.
    Pong {
        /// Correlation id.
        id: CommandId,
    },

    /// Frame with an unknown discriminator, kept whole.
    Unrecognized {
        /// Value of the `type` field.
        message_type: String,
        /// The whole frame.
        raw: Value,
    },
}

impl Message {
    /// Returns the wire discriminator of this message.
    #[must_use]
    pub fn message_type(&self) -> &str {
        match self {
            Self::AuthRequired { .. } => "auth_required",
            Self::Auth { .. } => "auth",
            Self::AuthOk { .. } => "auth_ok",
            Self::AuthInvalid { .. } => "auth_invalid",
            Self::Command { payload, .. } => payload.command_type(),
            Self::Result(_) => "result",
            Self::Event(_) => "event",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
            Self::Unrecognized { message_type, .. } => message_type,
        }
    }

    /// Returns the correlation id if this message is a reply.
    #[inline]
    #[must_use]
    pub fn reply_id(&self) -> Option<CommandId> {
        match self {
            Self::Result(result) => Some(result.id),
            Self::Pong { id } => Some(*id),
            _ => None,
        }
    }
}

// ============================================================================
// ResultMessage
// ============================================================================

/// Reply to a command.
///
/// # Format
///
/// ```json
/// { "id": 3, "type": "result", "success": true, "result": { ... } }
/// { "id": 3, "type": "result", "success": false, "error": { "code": "not_found", "message": "..." } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    /// Id of the command this answers.
    pub id: CommandId,

    /// Whether the command succeeded.
    pub success: bool,

    /// Result payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error body on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteErrorBody>,
}

impl ResultMessage {
    /// Creates a successful result.
    #[inline]
    #[must_use]
    pub fn success(id: CommandId, result: Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Creates a failed result.
    #[inline]
    #[must_use]
    pub fn failure(id: CommandId, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(RemoteErrorBody {
                code: Value::String(code.into()),
                message: message.into(),
            }),
        }
    }

    /// Converts into the caller-facing outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] if the result reports failure.
    pub fn into_outcome(self) -> Result<Value> {
        if self.success {
            return Ok(self.result.unwrap_or(Value::Null));
        }
        match self.error {
            Some(body) => Err(Error::remote(body.code_string(), body.message)),
            None => Err(Error::remote("unknown_error", "Command failed without error body")),
        }
    }
}

/// Error object of a failed result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteErrorBody {
    /// Error code; usually a string, older servers send numbers.
    #[serde(default)]
    pub code: Value,

    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

impl RemoteErrorBody {
    /// Returns the code rendered as a string.
    #[must_use]
    pub fn code_string(&self) -> String {
        match &self.code {
            Value::String(code) => code.clone(),
            Value::Null => "unknown_error".to_string(),
            other => other.to_string(),
        }
    }
}

// ============================================================================
// EventMessage
// ============================================================================

/// Server-pushed event frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Id of the `subscribe_events` command that produced this event.
    ///
    /// Informational only; events are never correlated to pending commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CommandId>,

    /// The event.
    pub event: HassEvent,
}

// ============================================================================
// Codec
// ============================================================================

/// Encodes a message into a text frame.
///
/// # Errors
///
/// Returns [`Error::Json`] if serialization fails.
pub fn encode(message: &Message) -> Result<String> {
    let value = match message {
        Message::AuthRequired { ha_version } => with_optional(
            json!({ "type": "auth_required" }),
            "ha_version",
            ha_version.as_deref(),
        ),
        Message::Auth { access_token } => json!({ "type": "auth", "access_token": access_token }),
        Message::AuthOk { ha_version } => {
            with_optional(json!({ "type": "auth_ok" }), "ha_version", ha_version.as_deref())
        }
        Message::AuthInvalid { message } => {
            with_optional(json!({ "type": "auth_invalid" }), "message", message.as_deref())
        }
        Message::Command { id, payload } => {
            let mut fields = Map::with_capacity(payload.fields().len() + 1);
            fields.insert("id".to_string(), json!(id));
            fields.extend(payload.fields().clone());
            Value::Object(fields)
        }
        Message::Result(result) => tagged(serde_json::to_value(result)?, "result"),
        Message::Event(event) => tagged(serde_json::to_value(event)?, "event"),
        Message::Ping { id } => json!({ "id": id, "type": "ping" }),
        Message::Pong { id } => json!({ "id": id, "type": "pong" }),
        Message::Unrecognized { raw, .. } => raw.clone(),
    };

    Ok(serde_json::to_string(&value)?)
}

/// Decodes a text frame into a message.
///
/// # Errors
///
/// Returns [`Error::MalformedMessage`] if the frame is not a JSON object,
/// has no string `type`, or a known variant is missing required fields.
pub fn decode(text: &str) -> Result<Message> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::malformed(format!("invalid JSON: {e}")))?;

    let Value::Object(fields) = value else {
        return Err(Error::malformed("frame is not a JSON object"));
    };

    let message_type = match fields.get("type") {
        Some(Value::String(message_type)) => message_type.clone(),
        Some(_) => return Err(Error::malformed("\"type\" is not a string")),
        None => return Err(Error::malformed("missing \"type\" discriminator")),
    };

    let message = match message_type.as_str() {
        "auth_required" => Message::AuthRequired {
            ha_version: string_field(&fields, "ha_version"),
        },
        "auth" => Message::Auth {
            access_token: string_field(&fields, "access_token")
                .ok_or_else(|| Error::malformed("auth message without access_token"))?,
        },
        "auth_ok" => Message::AuthOk {
            ha_version: string_field(&fields, "ha_version"),
        },
        "auth_invalid" => Message::AuthInvalid {
            message: string_field(&fields, "message"),
        },
        "result" => Message::Result(variant(fields, "result")?),
        "event" => Message::Event(variant(fields, "event")?),
        "ping" => Message::Ping {
            id: id_field(&fields, "ping")?,
        },
        "pong" => Message::Pong {
            id: id_field(&fields, "pong")?,
        },
        _ => Message::Unrecognized {
            message_type,
            raw: Value::Object(fields),
        },
    };

    Ok(message)
}

// ============================================================================
// Helpers
// ============================================================================

fn with_optional(mut value: Value, key: &str, field: Option<&str>) -> Value {
    if let (Some(field), Value::Object(map)) = (field, &mut value) {
        map.insert(key.to_string(), Value::String(field.to_string()));
    }
    value
}

fn tagged(mut value: Value, message_type: &str) -> Value {
    if let Value::Object(map) = &mut value {
        map.insert("type".to_string(), Value::String(message_type.to_string()));
    }
    value
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_string)
}

fn id_field(fields: &Map<String, Value>, message_type: &str) -> Result<CommandId> {
    fields
        .get("id")
        .and_then(Value::as_u64)
        .map(CommandId::new)
        .ok_or_else(|| Error::malformed(format!("{message_type} message without numeric id")))
}

fn variant<T: DeserializeOwned>(fields: Map<String, Value>, message_type: &str) -> Result<T> {
    serde_json::from_value(Value::Object(fields))
        .map_err(|e| Error::malformed(format!("invalid {message_type} message: {e}")))
}

// ============================================================================
// Tests
// ============================================================================
