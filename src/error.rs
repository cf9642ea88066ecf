//! Error types for hass-link.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use hass_link::{Client, Result};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     client.call_service("light", "turn_on", None, None).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::HandshakeTimeout`], [`Error::ConnectionClosed`], [`Error::Disconnected`] |
//! | Handshake | [`Error::Unauthorized`], [`Error::NotReady`] |
//! | Protocol | [`Error::Protocol`], [`Error::MalformedMessage`] |
//! | Commands | [`Error::CommandTimeout`], [`Error::Remote`], [`Error::TooManyPending`] |
//! | Subscribers | [`Error::Subscriber`] |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{CommandId, SubscriptionId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection could not be opened.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Handshake did not finish in time.
    #[error("Handshake timeout after {timeout_ms}ms")]
    HandshakeTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The transport is closed; no further frames can be read or written.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The connection epoch a command was issued on ended before a reply.
    ///
    /// Also returned when there is no live connection at all.
    #[error("Disconnected from server")]
    Disconnected,

    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// The server rejected the access token.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Message reported by the server, if any.
        message: String,
    },

    /// The server authenticated the client but is not running yet.
    #[error("Server not ready (state: {state})")]
    NotReady {
        /// State reported by `get_config`.
        state: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Out-of-sequence or unexpected frame.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Frame could not be decoded into a protocol message.
    #[error("Malformed message: {message}")]
    MalformedMessage {
        /// Why decoding failed.
        message: String,
    },

    // ========================================================================
    // Command Errors
    // ========================================================================
    /// Command reply did not arrive in time.
    #[error("Command {id} ({command}) timed out after {timeout_ms}ms")]
    CommandTimeout {
        /// Correlation id of the command.
        id: CommandId,
        /// Command type, e.g. `call_service`.
        command: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Server answered with a well-formed failure result.
    #[error("Remote error [{code}]: {message}")]
    Remote {
        /// Error code from the server.
        code: String,
        /// Error message from the server.
        message: String,
    },

    /// Too many commands are awaiting replies on this connection.
    #[error("Too many pending commands (max {max})")]
    TooManyPending {
        /// Configured limit.
        max: usize,
    },

    // ========================================================================
    // Subscriber Errors
    // ========================================================================
    /// A subscriber callback failed or panicked.
    #[error("Subscriber {subscription} failed: {message}")]
    Subscriber {
        /// Subscription whose callback failed.
        subscription: SubscriptionId,
        /// Failure description.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// URL parse error.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a handshake timeout error.
    #[inline]
    pub fn handshake_timeout(timeout_ms: u64) -> Self {
        Self::HandshakeTimeout { timeout_ms }
    }

    /// Creates an unauthorized error.
    #[inline]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a not-ready error.
    #[inline]
    pub fn not_ready(state: impl Into<String>) -> Self {
        Self::NotReady {
            state: state.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a malformed message error.
    #[inline]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedMessage {
            message: message.into(),
        }
    }

    /// Creates a command timeout error.
    #[inline]
    pub fn command_timeout(id: CommandId, command: impl Into<String>, timeout_ms: u64) -> Self {
        Self::CommandTimeout {
            id,
            command: command.into(),
            timeout_ms,
        }
    }

    /// Creates a remote error.
    #[inline]
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a subscriber error.
    #[inline]
    pub fn subscriber(subscription: SubscriptionId, message: impl Into<String>) -> Self {
        Self::Subscriber {
            subscription,
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::HandshakeTimeout { .. } | Self::CommandTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::HandshakeTimeout { .. }
                | Self::ConnectionClosed
                | Self::Disconnected
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry, possibly on a later
    /// connection epoch.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::HandshakeTimeout { .. }
                | Self::CommandTimeout { .. }
                | Self::Disconnected
                | Self::NotReady { .. }
                | Self::TooManyPending { .. }
        )
    }

    /// Returns `true` if retrying with the same credentials is pointless.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::Config { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_remote_error_display() {
        let err = Error::remote("not_found", "Service not found.");
        assert_eq!(err.to_string(), "Remote error [not_found]: Service not found.");
    }

    #[test]
    fn test_command_timeout_display() {
        let err = Error::command_timeout(CommandId::new(7), "ping", 1000);
        assert_eq!(err.to_string(), "Command 7 (ping) timed out after 1000ms");
        assert!(err.is_timeout());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("x").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::Disconnected.is_connection_error());
        assert!(!Error::config("x").is_connection_error());
    }

    #[test]
    fn test_unauthorized_is_fatal() {
        assert!(Error::unauthorized("bad token").is_fatal());
        assert!(!Error::unauthorized("bad token").is_recoverable());
        assert!(!Error::Disconnected.is_fatal());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
