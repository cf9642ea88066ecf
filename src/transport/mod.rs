//! Transport layer: socket, handshake, correlation, connection epochs.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                         ┌─────────────────┐
//! │  Connection (epoch)  │        WebSocket        │  Home Assistant │
//! │                      │◄───────────────────────►│                 │
//! │  read loop ──────────┼──► CommandCorrelator    │  /api/websocket │
//! │            └─────────┼──► EventDispatcher      │                 │
//! └──────────────────────┘                         └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `ConnectionAttempt::establish` - open, authenticate, subscribe
//! 2. `Connection` - send commands, route replies and events
//! 3. `Connection::close` / transport failure - fail pending, report reason
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | `Transport` / `Connector` traits and the tungstenite implementation |
//! | `state` | Connection states and disconnect reasons |
//! | `handshake` | One connection attempt |
//! | `correlator` | Command id allocation and reply matching |
//! | `connection` | Authenticated epoch and its read loop |

// ============================================================================
// Submodules
// ============================================================================

/// Framed transport over WebSocket.
pub mod websocket;

/// Connection states and disconnect reasons.
pub mod state;

/// One connection attempt.
pub mod handshake;

/// Command id allocation and reply matching.
pub mod correlator;

/// Authenticated epoch and its read loop.
pub mod connection;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::Connection;
pub use correlator::CommandCorrelator;
pub use handshake::{AttemptFailure, ConnectionAttempt};
pub use state::{ConnectionState, DisconnectReason};
pub use websocket::{Connector, Transport, WsConnector, WsTransport};
