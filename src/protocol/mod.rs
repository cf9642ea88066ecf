//! WebSocket protocol message types.
//!
//! This module defines the message format spoken with the server and the
//! JSON codec for it.
//!
//! # Protocol Overview
//!
//! | Phase | Frames |
//! |-------|--------|
//! | Handshake | `auth_required` → `auth` → `auth_ok` / `auth_invalid` |
//! | Commands | `{"id": n, "type": "<command>", ...}` → `{"id": n, "type": "result", ...}` |
//! | Events | `{"type": "event", "event": {...}}` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Typed and raw commands |
//! | `event` | Event, state and config types |
//! | `helper` | `input_boolean` and `input_number` helper entries |
//! | `message` | Message union, `encode` and `decode` |
//! | `registry` | Area, device and entity registry entries |

// ============================================================================
// Submodules
// ============================================================================

/// Command definitions.
pub mod command;

/// Event message types.
pub mod event;

/// Input helper entries.
pub mod helper;

/// Message union and codec.
pub mod message;

/// Registry entries.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{Command, CommandPayload, RawCommand, ServiceTarget};
pub use event::{HassConfig, HassEvent, HassState, STATE_CHANGED, ServerEvent, StateChange};
pub use helper::{InputBooleanHelper, InputNumberHelper, InputNumberMode, NewInputNumber};
pub use message::{EventMessage, Message, RemoteErrorBody, ResultMessage, decode, encode};
pub use registry::{HassArea, HassDevice, HassEntity};
