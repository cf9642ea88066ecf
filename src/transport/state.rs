//! Connection states and disconnect reasons.
//!
//! ```text
//! Idle → Connecting → AwaitingAuthChallenge → Authenticating → Connected → Closed(reason)
//!          │                 │                      │
//!          └─────────────────┴──────────────────────┴──────────→ Closed(reason)
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::error::Error;

// ============================================================================
// DisconnectReason
// ============================================================================

/// Why a connection attempt or epoch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// The server rejected the access token.
    Unauthorized,
    /// The server closed the socket.
    RemoteClosed,
    /// Opening, reading or writing failed.
    TransportError,
    /// The handshake did not finish in time.
    Timeout,
    /// The local side asked to close.
    UserRequested,
    /// The server sent an out-of-sequence frame during the handshake.
    ProtocolError,
    /// The server authenticated but is still starting up.
    NotReady,
}

impl DisconnectReason {
    /// Classifies an error raised while establishing or running a connection.
    #[must_use]
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::Unauthorized { .. } => Self::Unauthorized,
            Error::HandshakeTimeout { .. } | Error::CommandTimeout { .. } => Self::Timeout,
            Error::Protocol { .. } | Error::MalformedMessage { .. } => Self::ProtocolError,
            Error::NotReady { .. } => Self::NotReady,
            Error::ConnectionClosed => Self::RemoteClosed,
            _ => Self::TransportError,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unauthorized => "unauthorized",
            Self::RemoteClosed => "remote closed",
            Self::TransportError => "transport error",
            Self::Timeout => "timeout",
            Self::UserRequested => "user requested",
            Self::ProtocolError => "protocol error",
            Self::NotReady => "not ready",
        };
        f.write_str(name)
    }
}

// ============================================================================
// ConnectionState
// ============================================================================

/// State of one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, nothing done yet.
    Idle,
    /// Opening the transport.
    Connecting,
    /// Transport open, waiting for `auth_required`.
    AwaitingAuthChallenge,
    /// Token sent, waiting for `auth_ok` / `auth_invalid`.
    Authenticating,
    /// Authenticated and wired to correlator and dispatcher.
    Connected,
    /// Finished.
    Closed(DisconnectReason),
}

impl ConnectionState {
    /// Returns `true` once the attempt has ended.
    #[inline]
    #[must_use]
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed(_))
    }

    /// Returns `true` if moving to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (Closed(_), _) => false,
            (_, Closed(_)) => true,
            (Idle, Connecting)
            | (Connecting, AwaitingAuthChallenge)
            | (AwaitingAuthChallenge, Authenticating)
            | (Authenticating, Connected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Connecting => f.write_str("connecting"),
            Self::AwaitingAuthChallenge => f.write_str("awaiting auth challenge"),
            Self::Authenticating => f.write_str("authenticating"),
            Self::Connected => f.write_str("connected"),
            Self::Closed(reason) => write!(f, "closed ({reason})"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
