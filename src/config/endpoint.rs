//! Server endpoint configuration.
//!
//! # Example
//!
//! ```ignore
//! use hass_link::EndpointConfig;
//!
//! let endpoint = EndpointConfig::new("homeassistant.local", 8123, "token")
//!     .with_tls()
//!     .with_handshake_timeout(Duration::from_secs(10));
//!
//! assert_eq!(endpoint.ws_url()?.as_str(), "wss://homeassistant.local:8123/api/websocket");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default WebSocket path on the server.
pub const DEFAULT_WEBSOCKET_PATH: &str = "api/websocket";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8123;

/// Default time allowed for open + authentication.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// EndpointConfig
// ============================================================================

/// Where and how to connect.
///
/// Immutable once handed to a client; every connection attempt reads the
/// same values.
#[derive(Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Host name or IP address.
    pub host: String,

    /// TCP port.
    pub port: u16,

    /// Use `wss://` instead of `ws://`.
    pub tls: bool,

    /// Long-lived access token.
    pub token: String,

    /// WebSocket path, with or without leading slash.
    pub websocket_path: String,

    /// Upper bound for open + authentication of one attempt.
    pub handshake_timeout: Duration,
}

impl EndpointConfig {
    /// Creates an endpoint with default path and handshake timeout.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            tls: false,
            token: token.into(),
            websocket_path: DEFAULT_WEBSOCKET_PATH.to_string(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Enables TLS.
    #[inline]
    #[must_use]
    pub fn with_tls(mut self) -> Self {
        self.tls = true;
        self
    }

    /// Sets the WebSocket path.
    #[inline]
    #[must_use]
    pub fn with_websocket_path(mut self, path: impl Into<String>) -> Self {
        self.websocket_path = path.into();
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Renders the WebSocket URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the host is empty or the URL is invalid.
    pub fn ws_url(&self) -> Result<Url> {
        if self.host.trim().is_empty() {
            return Err(Error::config("Host must not be empty"));
        }

        let scheme = if self.tls { "wss" } else { "ws" };
        let path = self.websocket_path.trim_start_matches('/');
        let raw = format!("{scheme}://{}:{}/{path}", self.host, self.port);

        Url::parse(&raw).map_err(|e| Error::config(format!("Invalid endpoint URL {raw}: {e}")))
    }

    /// Validates all fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        self.ws_url()?;

        if self.token.is_empty() {
            return Err(Error::config(
                "Access token is required. Use .token() to set it.",
            ));
        }
        if self.handshake_timeout.is_zero() {
            return Err(Error::config("Handshake timeout must be > 0"));
        }

        Ok(())
    }
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("token", &"<redacted>")
            .field("websocket_path", &self.websocket_path)
            .field("handshake_timeout", &self.handshake_timeout)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
