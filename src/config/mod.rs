//! Client configuration.
//!
//! The values here are resolved by the host application (or
//! [`ClientBuilder::from_env`](crate::ClientBuilder::from_env)) before the
//! first connection attempt and never change afterwards.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `endpoint` | Host, port, TLS, token, path, handshake timeout |
//! | `reconnect` | Reconnect policy and backoff |

// ============================================================================
// Submodules
// ============================================================================

/// Server endpoint configuration.
pub mod endpoint;

/// Reconnect policy and backoff.
pub mod reconnect;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Re-exports
// ============================================================================

pub use endpoint::{DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_PORT, DEFAULT_WEBSOCKET_PATH, EndpointConfig};
pub use reconnect::{Backoff, ReconnectConfig, ReconnectPolicy};

// ============================================================================
// Constants
// ============================================================================

/// Default time a command caller waits for its reply.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Default cap on commands awaiting replies per connection.
pub const DEFAULT_MAX_PENDING_COMMANDS: usize = 1000;

/// Default capacity of the notification broadcast channels.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 64;

// ============================================================================
// ClientConfig
// ============================================================================

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server endpoint.
    pub endpoint: EndpointConfig,
    /// Default per-command timeout.
    pub command_timeout: Duration,
    /// Reconnect supervision.
    pub reconnect: ReconnectConfig,
    /// Cap on outstanding commands per connection.
    pub max_pending_commands: usize,
    /// Require `get_config` to report `RUNNING` before a connection is usable.
    pub require_running: bool,
    /// Capacity of the connection-event and subscriber-fault channels.
    pub notification_capacity: usize,
}

impl ClientConfig {
    /// Creates a configuration with defaults around an endpoint.
    #[must_use]
    pub fn new(endpoint: EndpointConfig) -> Self {
        Self {
            endpoint,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            reconnect: ReconnectConfig::default(),
            max_pending_commands: DEFAULT_MAX_PENDING_COMMANDS,
            require_running: true,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }

    /// Validates the whole configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        self.endpoint.validate()?;
        self.reconnect.validate()?;

        if self.command_timeout.is_zero() {
            return Err(Error::config("Command timeout must be > 0"));
        }
        if self.max_pending_commands == 0 {
            return Err(Error::config("Max pending commands must be > 0"));
        }
        if self.notification_capacity == 0 {
            return Err(Error::config("Notification capacity must be > 0"));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ClientConfig::new(EndpointConfig::new("localhost", DEFAULT_PORT, "t"));
        assert!(config.validate().is_ok());
        assert!(config.require_running);
        assert_eq!(config.command_timeout, DEFAULT_COMMAND_TIMEOUT);
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut config = ClientConfig::new(EndpointConfig::new("localhost", DEFAULT_PORT, "t"));
        config.max_pending_commands = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::new(EndpointConfig::new("localhost", DEFAULT_PORT, "t"));
        config.command_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
