//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`Client`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use hass_link::{Client, ReconnectPolicy};
//!
//! # fn example() -> hass_link::Result<()> {
//! let client = Client::builder()
//!     .host("homeassistant.local")
//!     .token("long-lived-access-token")
//!     .command_timeout(Duration::from_secs(10))
//!     .reconnect_policy(ReconnectPolicy::AlwaysRetry)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ClientConfig, DEFAULT_PORT, EndpointConfig, ReconnectConfig, ReconnectPolicy};
use crate::error::{Error, Result};
use crate::transport::{Connector, WsConnector};

use super::core::Client;

// ============================================================================
// Environment Variables
// ============================================================================

/// Host name variable read by [`ClientBuilder::from_env`].
pub const ENV_HOST: &str = "HASS_HOST";
/// Port variable.
pub const ENV_PORT: &str = "HASS_PORT";
/// Access token variable.
pub const ENV_TOKEN: &str = "HASS_TOKEN";
/// TLS switch variable (`true`/`1`/`yes`).
pub const ENV_SSL: &str = "HASS_SSL";
/// WebSocket path variable.
pub const ENV_WEBSOCKET_PATH: &str = "HASS_WEBSOCKET_PATH";

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`].
///
/// Use [`Client::builder()`] to create a new builder.
#[derive(Clone, Default)]
pub struct ClientBuilder {
    host: Option<String>,
    port: Option<u16>,
    tls: bool,
    token: Option<String>,
    websocket_path: Option<String>,
    handshake_timeout: Option<Duration>,
    command_timeout: Option<Duration>,
    reconnect: ReconnectConfig,
    max_pending_commands: Option<usize>,
    require_running: Option<bool>,
    notification_capacity: Option<usize>,
    connector: Option<Arc<dyn Connector>>,
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a builder with no endpoint set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder from `HASS_HOST`, `HASS_PORT`, `HASS_TOKEN`,
    /// `HASS_SSL` and `HASS_WEBSOCKET_PATH`.
    ///
    /// Unset variables leave the builder's defaults in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable holds an unparsable value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::new();

        if let Some(host) = lookup(ENV_HOST) {
            builder = builder.host(host);
        }
        if let Some(port) = lookup(ENV_PORT) {
            let port = port
                .trim()
                .parse::<u16>()
                .map_err(|e| Error::config(format!("Invalid {ENV_PORT} {port:?}: {e}")))?;
            builder = builder.port(port);
        }
        if let Some(token) = lookup(ENV_TOKEN) {
            builder = builder.token(token);
        }
        if let Some(ssl) = lookup(ENV_SSL) {
            builder = builder.tls(parse_flag(ENV_SSL, &ssl)?);
        }
        if let Some(path) = lookup(ENV_WEBSOCKET_PATH) {
            builder = builder.websocket_path(path);
        }

        Ok(builder)
    }

    // ========================================================================
    // Endpoint
    // ========================================================================

    /// Sets the server host.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the server port (default 8123).
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Enables or disables TLS.
    #[inline]
    #[must_use]
    pub fn tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Sets the long-lived access token.
    #[inline]
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the WebSocket path (default `api/websocket`).
    #[inline]
    #[must_use]
    pub fn websocket_path(mut self, path: impl Into<String>) -> Self {
        self.websocket_path = Some(path.into());
        self
    }

    /// Sets the open + authentication timeout.
    #[inline]
    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Sets the default per-command timeout (default 5s).
    #[inline]
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Sets the cap on commands awaiting replies (default 1000).
    #[inline]
    #[must_use]
    pub fn max_pending_commands(mut self, max: usize) -> Self {
        self.max_pending_commands = Some(max);
        self
    }

    /// Requires `get_config` to report `RUNNING` before a connection is
    /// usable (default `true`).
    #[inline]
    #[must_use]
    pub fn require_running(mut self, require: bool) -> Self {
        self.require_running = Some(require);
        self
    }

    /// Sets the capacity of the notification channels.
    #[inline]
    #[must_use]
    pub fn notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = Some(capacity);
        self
    }

    // ========================================================================
    // Reconnect
    // ========================================================================

    /// Sets the reconnect policy.
    #[inline]
    #[must_use]
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect.policy = policy;
        self
    }

    /// Sets the first and the largest reconnect delay.
    #[inline]
    #[must_use]
    pub fn reconnect_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect.initial_delay = initial;
        self.reconnect.max_delay = max;
        self
    }

    /// Sets the backoff multiplier.
    #[inline]
    #[must_use]
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.reconnect.factor = factor;
        self
    }

    /// Sets the uptime after which the backoff resets.
    #[inline]
    #[must_use]
    pub fn stable_after(mut self, uptime: Duration) -> Self {
        self.reconnect.stable_after = uptime;
        self
    }

    /// Gives up after `attempts` consecutive failed attempts.
    #[inline]
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect.max_attempts = Some(attempts);
        self
    }

    /// Replaces the whole reconnect configuration.
    #[inline]
    #[must_use]
    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Uses a custom connector instead of [`WsConnector`].
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Resolves the configuration without building a client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if host or token is missing or any value is
    /// invalid.
    pub fn to_config(&self) -> Result<ClientConfig> {
        let host = self.host.clone().ok_or_else(|| {
            Error::config(
                "Host is required. Use .host() to set it.\n\
                 Example: Client::builder().host(\"homeassistant.local\")",
            )
        })?;
        let token = self.token.clone().ok_or_else(|| {
            Error::config("Access token is required. Use .token() to set it.")
        })?;

        let mut endpoint = EndpointConfig::new(host, self.port.unwrap_or(DEFAULT_PORT), token);
        if self.tls {
            endpoint = endpoint.with_tls();
        }
        if let Some(path) = &self.websocket_path {
            endpoint = endpoint.with_websocket_path(path.clone());
        }
        if let Some(timeout) = self.handshake_timeout {
            endpoint = endpoint.with_handshake_timeout(timeout);
        }

        let mut config = ClientConfig::new(endpoint);
        config.reconnect = self.reconnect.clone();
        if let Some(timeout) = self.command_timeout {
            config.command_timeout = timeout;
        }
        if let Some(max) = self.max_pending_commands {
            config.max_pending_commands = max;
        }
        if let Some(require) = self.require_running {
            config.require_running = require;
        }
        if let Some(capacity) = self.notification_capacity {
            config.notification_capacity = capacity;
        }

        config.validate()?;
        Ok(config)
    }

    /// Builds the client. Call [`Client::start`] to connect.
    ///
    /// # Errors
    ///
    /// Same as [`to_config`](Self::to_config).
    pub fn build(self) -> Result<Client> {
        let config = self.to_config()?;
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WsConnector) as Arc<dyn Connector>);

        Client::new(config, connector)
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("websocket_path", &self.websocket_path)
            .field("command_timeout", &self.command_timeout)
            .field("reconnect", &self.reconnect)
            .field("custom_connector", &self.connector.is_some())
            .finish_non_exhaustive()
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::config(format!("Invalid {name} {other:?}: expected true or false"))),
    }
}

// ============================================================================
// Tests
// ============================================================================
