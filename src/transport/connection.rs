//! One authenticated connection epoch and its read loop.
//!
//! # Read Loop
//!
//! Each connection spawns a tokio task that is the sole reader and decoder
//! of inbound frames:
//!
//! - `result` / `pong` frames complete pending commands by id
//! - `event` and unrecognized frames go to the [`EventDispatcher`]
//! - malformed frames are logged and dropped
//!
//! When the transport fails or is closed, the loop fails every outstanding
//! command with [`Error::Disconnected`], ends the epoch in the dispatcher
//! and publishes the [`DisconnectReason`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::config::ClientConfig;
use crate::dispatch::EventDispatcher;
use crate::error::{Error, Result};
use crate::identifiers::{CommandId, ConnectionId};
use crate::protocol::{CommandPayload, Message, ServerEvent, decode, encode};

use super::correlator::CommandCorrelator;
use super::state::DisconnectReason;
use super::websocket::Transport;

// ============================================================================
// ConnectionInner
// ============================================================================

struct ConnectionInner {
    id: ConnectionId,
    ha_version: Option<String>,
    transport: Arc<dyn Transport>,
    correlator: CommandCorrelator,
    command_timeout: Duration,
    /// Reason given by a local `close`, wins over what the read loop sees.
    requested: Mutex<Option<DisconnectReason>>,
    /// Set once by the read loop when the epoch ends.
    closed: watch::Sender<Option<DisconnectReason>>,
}

// ============================================================================
// Connection
// ============================================================================

/// An authenticated connection epoch.
///
/// Cheap to clone. Once closed it stays closed; reconnecting produces a new
/// `Connection` with a new [`ConnectionId`].
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Wraps an authenticated transport and starts its read loop.
    pub(crate) fn spawn(
        id: ConnectionId,
        ha_version: Option<String>,
        transport: Arc<dyn Transport>,
        config: &ClientConfig,
        dispatcher: EventDispatcher,
    ) -> Self {
        let (closed, _) = watch::channel(None);

        let inner = Arc::new(ConnectionInner {
            id,
            ha_version,
            transport,
            correlator: CommandCorrelator::new(id, config.max_pending_commands),
            command_timeout: config.command_timeout,
            requested: Mutex::new(None),
            closed,
        });

        tokio::spawn(Self::run_read_loop(Arc::clone(&inner), dispatcher));

        Self { inner }
    }

    /// Returns the epoch id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Returns the server version reported during the handshake.
    #[inline]
    #[must_use]
    pub fn ha_version(&self) -> Option<&str> {
        self.inner.ha_version.as_deref()
    }

    /// Returns `true` once the epoch has ended.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.borrow().is_some()
    }

    /// Returns why the epoch ended, if it has.
    #[inline]
    #[must_use]
    pub fn close_reason(&self) -> Option<DisconnectReason> {
        *self.inner.closed.borrow()
    }

    /// Returns the number of commands awaiting replies.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.correlator.pending_count()
    }

    /// Sends a command and waits for its reply with the default timeout.
    ///
    /// `command` is anything that serializes to a JSON object with a string
    /// `type` and no `id`, such as [`Command`](crate::protocol::Command) or
    /// [`RawCommand`](crate::protocol::RawCommand).
    ///
    /// # Errors
    ///
    /// - [`Error::CommandTimeout`] if no reply arrives in time
    /// - [`Error::Disconnected`] if the epoch ends first
    /// - [`Error::Remote`] if the server reports failure
    /// - [`Error::TooManyPending`] if the pending table is full
    /// - [`Error::Protocol`] if `command` has the wrong shape
    pub async fn send_command<C>(&self, command: &C) -> Result<Value>
    where
        C: Serialize + ?Sized,
    {
        self.send_command_with_timeout(command, self.inner.command_timeout)
            .await
    }

    /// Sends a command and waits for its reply with a custom timeout.
    ///
    /// Dropping the returned future abandons the wait; a reply arriving
    /// later is discarded.
    ///
    /// # Errors
    ///
    /// Same as [`send_command`](Self::send_command).
    pub async fn send_command_with_timeout<C>(
        &self,
        command: &C,
        command_timeout: Duration,
    ) -> Result<Value>
    where
        C: Serialize + ?Sized,
    {
        let payload = CommandPayload::from_serialize(command)?;
        self.send_payload(payload, command_timeout).await
    }

    /// Sends a command and decodes the reply into `T`.
    ///
    /// # Errors
    ///
    /// Same as [`send_command`](Self::send_command), plus [`Error::Json`] if
    /// the reply does not decode into `T`.
    pub async fn send_command_as<T, C>(&self, command: &C) -> Result<T>
    where
        T: DeserializeOwned,
        C: Serialize + ?Sized,
    {
        let value = self.send_command(command).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Sends a command without waiting for its reply.
    ///
    /// The reply is awaited on a background task with the default timeout
    /// and failures are logged.
    ///
    /// # Errors
    ///
    /// Fails if the command cannot be registered or written.
    pub async fn fire_and_forget<C>(&self, command: &C) -> Result<CommandId>
    where
        C: Serialize + ?Sized,
    {
        let payload = CommandPayload::from_serialize(command)?;
        let command_type = payload.command_type().to_string();
        let (id, rx) = self.inner.correlator.register(&command_type)?;
        let command_timeout = self.inner.command_timeout;

        let written = match timeout(command_timeout, self.write_command(id, payload)).await {
            Ok(written) => written,
            Err(_) => Err(self.timed_out(id, &command_type, command_timeout)),
        };
        if let Err(e) = written {
            self.inner.correlator.cancel(id);
            return Err(e);
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let _guard = PendingGuard {
                correlator: &inner.correlator,
                id,
            };
            match timeout(inner.command_timeout, rx).await {
                Ok(Ok(Ok(_))) => trace!(connection = %inner.id, %id, "Fire-and-forget command succeeded"),
                Ok(Ok(Err(e))) => {
                    warn!(connection = %inner.id, %id, command = %command_type, error = %e, "Fire-and-forget command failed");
                }
                Ok(Err(_)) => {}
                Err(_) => {
                    warn!(connection = %inner.id, %id, command = %command_type, "Fire-and-forget command timed out");
                }
            }
        });

        Ok(id)
    }

    /// Closes the connection.
    ///
    /// The read loop then fails outstanding commands with
    /// [`Error::Disconnected`] and reports `reason`. Idempotent; the first
    /// reason wins.
    pub async fn close(&self, reason: DisconnectReason) {
        {
            let mut requested = self.inner.requested.lock();
            if requested.is_none() {
                *requested = Some(reason);
            }
        }

        debug!(connection = %self.inner.id, %reason, "Closing connection");
        self.inner.transport.close().await;
    }

    /// Waits until the epoch has ended and returns why.
    pub async fn closed(&self) -> DisconnectReason {
        let mut rx = self.inner.closed.subscribe();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => *reason,
            Err(_) => None,
        };
        reason.unwrap_or(DisconnectReason::RemoteClosed)
    }

    /// Registers, writes and awaits one command.
    pub(crate) async fn send_payload(
        &self,
        payload: CommandPayload,
        command_timeout: Duration,
    ) -> Result<Value> {
        let inner = &self.inner;
        let command_type = payload.command_type().to_string();

        let (id, rx) = inner.correlator.register(&command_type)?;
        let _guard = PendingGuard {
            correlator: &inner.correlator,
            id,
        };

        // One deadline covers the write and the reply.
        let exchange = async {
            self.write_command(id, payload).await?;
            rx.await.unwrap_or(Err(Error::Disconnected))
        };

        match timeout(command_timeout, exchange).await {
            Ok(outcome) => outcome,
            Err(_) => Err(self.timed_out(id, &command_type, command_timeout)),
        }
    }

    fn timed_out(&self, id: CommandId, command_type: &str, command_timeout: Duration) -> Error {
        let timeout_ms = command_timeout.as_millis() as u64;
        warn!(
            connection = %self.inner.id,
            %id,
            command = %command_type,
            timeout_ms,
            "Command timed out"
        );
        Error::command_timeout(id, command_type, timeout_ms)
    }

    async fn write_command(&self, id: CommandId, payload: CommandPayload) -> Result<()> {
        let frame = encode(&Message::Command { id, payload })?;

        if let Err(e) = self.inner.transport.write_frame(frame).await {
            debug!(connection = %self.inner.id, %id, error = %e, "Command write failed");
            if !matches!(e, Error::ConnectionClosed) {
                self.close(DisconnectReason::TransportError).await;
            }
            return Err(Error::Disconnected);
        }

        trace!(connection = %self.inner.id, %id, "Command sent");
        Ok(())
    }

    // ========================================================================
    // Read Loop
    // ========================================================================

    async fn run_read_loop(inner: Arc<ConnectionInner>, dispatcher: EventDispatcher) {
        let observed = loop {
            match inner.transport.read_frame().await {
                Ok(text) => Self::handle_frame(&inner, &dispatcher, &text).await,
                Err(Error::ConnectionClosed) => break DisconnectReason::RemoteClosed,
                Err(e) => {
                    debug!(connection = %inner.id, error = %e, "Read failed");
                    break DisconnectReason::TransportError;
                }
            }
        };

        let reason = inner.requested.lock().unwrap_or(observed);

        inner.transport.close().await;
        let failed = inner.correlator.fail_all();
        dispatcher.end_epoch(inner.id);
        inner.closed.send_replace(Some(reason));

        info!(connection = %inner.id, %reason, failed_commands = failed, "Connection closed");
    }

    async fn handle_frame(inner: &ConnectionInner, dispatcher: &EventDispatcher, text: &str) {
        let message = match decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(connection = %inner.id, error = %e, "Dropping malformed frame");
                return;
            }
        };

        match message {
            Message::Result(result) => {
                let id = result.id;
                inner.correlator.complete(id, result.into_outcome());
            }

            Message::Pong { id } => {
                inner.correlator.complete(id, Ok(Value::Null));
            }

            Message::Event(event) => {
                dispatcher.dispatch(inner.id, ServerEvent::Event(event.event));
            }

            Message::Unrecognized { message_type, raw } => {
                trace!(connection = %inner.id, %message_type, "Forwarding unrecognized frame");
                dispatcher.dispatch(inner.id, ServerEvent::Unrecognized { message_type, raw });
            }

            Message::Ping { id } => match encode(&Message::Pong { id }) {
                Ok(frame) => {
                    if let Err(e) = inner.transport.write_frame(frame).await {
                        debug!(connection = %inner.id, error = %e, "Failed to answer ping");
                    }
                }
                Err(e) => debug!(error = %e, "Failed to encode pong"),
            },

            other => {
                debug!(
                    connection = %inner.id,
                    message_type = other.message_type(),
                    "Ignoring unexpected frame after handshake"
                );
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("ha_version", &self.inner.ha_version)
            .field("closed", &self.close_reason())
            .field("pending", &self.pending_count())
            .finish()
    }
}

// ============================================================================
// PendingGuard
// ============================================================================

/// Removes a pending entry when the waiting future is dropped.
struct PendingGuard<'a> {
    correlator: &'a CommandCorrelator,
    id: CommandId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.correlator.cancel(self.id);
    }
}

// ============================================================================
// Tests
// ============================================================================
