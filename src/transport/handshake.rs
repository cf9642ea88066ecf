//! One connection attempt: open, authenticate, prepare.
//!
//! ```text
//! client                                   server
//!   │ ── open ──────────────────────────────▶ │
//!   │ ◀───────────── {"type":"auth_required"} │
//!   │ ── {"type":"auth","access_token":..} ─▶ │
//!   │ ◀─────── {"type":"auth_ok"} | auth_invalid
//!   │ ── {"id":1,"type":"subscribe_events"} ▶ │
//!   │ ── {"id":2,"type":"get_config"} ──────▶ │   (require_running)
//! ```
//!
//! Open and authentication together are bounded by the endpoint's
//! handshake timeout. The epoch is usable only after the server-side event
//! subscription is in place and, if required, the server reports `RUNNING`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::dispatch::EventDispatcher;
use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::protocol::{Command, HassConfig, Message, decode, encode};

use super::connection::Connection;
use super::state::{ConnectionState, DisconnectReason};
use super::websocket::{Connector, Transport};

// ============================================================================
// AttemptFailure
// ============================================================================

/// Why an attempt did not produce a usable connection.
#[derive(Debug)]
pub struct AttemptFailure {
    /// Classified reason.
    pub reason: DisconnectReason,
    /// Underlying error.
    pub error: Error,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.error)
    }
}

// ============================================================================
// ConnectionAttempt
// ============================================================================

/// Drives one epoch from `Idle` to `Connected` or `Closed`.
pub struct ConnectionAttempt {
    id: ConnectionId,
    state: ConnectionState,
    config: Arc<ClientConfig>,
    connector: Arc<dyn Connector>,
    dispatcher: EventDispatcher,
    /// Authenticated connection still being prepared.
    preparing: Option<Connection>,
}

impl ConnectionAttempt {
    /// Creates an idle attempt for epoch `id`.
    pub(crate) fn new(
        id: ConnectionId,
        config: Arc<ClientConfig>,
        connector: Arc<dyn Connector>,
        dispatcher: EventDispatcher,
    ) -> Self {
        Self {
            id,
            state: ConnectionState::Idle,
            config,
            connector,
            dispatcher,
            preparing: None,
        }
    }

    /// Returns the epoch id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Runs the attempt.
    ///
    /// # Errors
    ///
    /// Returns an [`AttemptFailure`]; the attempt is then in
    /// `Closed(reason)`.
    pub async fn establish(&mut self) -> std::result::Result<Connection, AttemptFailure> {
        let handshake_timeout = self.config.endpoint.handshake_timeout;

        let outcome = timeout(handshake_timeout, self.open_and_authenticate()).await;
        let (transport, ha_version) = match outcome {
            Ok(Ok(authenticated)) => authenticated,
            Ok(Err(error)) => return Err(self.fail(error)),
            Err(_) => {
                return Err(self.fail(Error::handshake_timeout(
                    handshake_timeout.as_millis() as u64,
                )));
            }
        };

        self.transition(ConnectionState::Connected);
        self.dispatcher.begin_epoch(self.id);

        let connection = Connection::spawn(
            self.id,
            ha_version,
            transport,
            &self.config,
            self.dispatcher.clone(),
        );

        self.preparing = Some(connection.clone());
        let prepared = self.prepare(&connection).await;
        self.preparing = None;

        if let Err(error) = prepared {
            let failure = self.fail(error);
            connection.close(failure.reason).await;
            return Err(failure);
        }

        info!(
            connection = %self.id,
            ha_version = connection.ha_version().unwrap_or("unknown"),
            "Connected"
        );
        Ok(connection)
    }

    /// Closes whatever an interrupted [`establish`](Self::establish) left
    /// behind.
    ///
    /// A transport still in the handshake is closed when its future is
    /// dropped; an authenticated one is closed here.
    pub async fn abandon(&mut self) {
        if let Some(connection) = self.preparing.take() {
            connection.close(DisconnectReason::UserRequested).await;
        }
        if !self.state.is_closed() {
            self.transition(ConnectionState::Closed(DisconnectReason::UserRequested));
        }
    }

    /// Opens the transport and authenticates. Closes the transport on failure.
    async fn open_and_authenticate(&mut self) -> Result<(Arc<dyn Transport>, Option<String>)> {
        self.transition(ConnectionState::Connecting);
        let transport = self.connector.open(&self.config.endpoint).await?;

        match self.authenticate(transport.as_ref()).await {
            Ok(ha_version) => Ok((transport, ha_version)),
            Err(e) => {
                transport.close().await;
                Err(e)
            }
        }
    }

    async fn authenticate(&mut self, transport: &dyn Transport) -> Result<Option<String>> {
        self.transition(ConnectionState::AwaitingAuthChallenge);

        let announced = match read_message(transport).await? {
            Message::AuthRequired { ha_version } => ha_version,
            other => {
                return Err(Error::protocol(format!(
                    "Expected auth_required, got {}",
                    other.message_type()
                )));
            }
        };

        self.transition(ConnectionState::Authenticating);
        let auth = encode(&Message::Auth {
            access_token: self.config.endpoint.token.clone(),
        })?;
        transport.write_frame(auth).await?;

        match read_message(transport).await? {
            Message::AuthOk { ha_version } => Ok(ha_version.or(announced)),
            Message::AuthInvalid { message } => Err(Error::unauthorized(
                message.unwrap_or_else(|| "Invalid access token".to_string()),
            )),
            other => Err(Error::protocol(format!(
                "Expected auth_ok or auth_invalid, got {}",
                other.message_type()
            ))),
        }
    }

    /// Re-subscribes server-side and checks readiness.
    async fn prepare(&self, connection: &Connection) -> Result<()> {
        connection.send_command(&Command::subscribe_all()).await?;
        debug!(connection = %self.id, "Subscribed to server events");

        if self.config.require_running {
            let config: HassConfig = connection.send_command_as(&Command::GetConfig).await?;
            if !config.is_running() {
                return Err(Error::not_ready(config.state.unwrap_or_default()));
            }
        }

        Ok(())
    }

    fn transition(&mut self, next: ConnectionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {next}",
            self.state
        );
        debug!(connection = %self.id, from = %self.state, to = %next, "State transition");
        self.state = next;
    }

    fn fail(&mut self, error: Error) -> AttemptFailure {
        let reason = DisconnectReason::from_error(&error);
        warn!(connection = %self.id, %reason, error = %error, "Connection attempt failed");

        if !self.state.is_closed() {
            self.transition(ConnectionState::Closed(reason));
        }
        AttemptFailure { reason, error }
    }
}

async fn read_message(transport: &dyn Transport) -> Result<Message> {
    let frame = transport.read_frame().await?;
    decode(&frame)
}

// ============================================================================
// Tests
// ============================================================================
