//! Long-lived client facade.
//!
//! A [`Client`] owns the subscription set and the reconnect supervisor.
//! The current [`Connection`] is swapped in and out as epochs come and go;
//! callers see either the old or the new one, never a mix.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::ClientConfig;
use crate::dispatch::{
    Delivery, EventDispatcher, EventFilter, HandlerResult, SubscriberFault, SubscriptionHandle,
};
use crate::error::{Error, Result};
use crate::identifiers::{CommandId, ConnectionId, SubscriptionId};
use crate::protocol::ServerEvent;
use crate::transport::{Connection, Connector, DisconnectReason};

use super::builder::ClientBuilder;
use super::supervisor::{ReconnectSupervisor, StopReason};

// ============================================================================
// ConnectionEvent
// ============================================================================

/// Connection lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// An epoch became usable.
    Connected {
        /// The new epoch.
        connection: ConnectionId,
    },

    /// A usable epoch ended. Sent exactly once per `Connected`.
    Disconnected {
        /// The ended epoch.
        connection: ConnectionId,
        /// Why it ended.
        reason: DisconnectReason,
    },

    /// An attempt failed before becoming usable.
    AttemptFailed {
        /// The failed epoch.
        connection: ConnectionId,
        /// Why it failed.
        reason: DisconnectReason,
    },

    /// The supervisor stopped; no further attempts are made.
    Stopped {
        /// Why it stopped.
        reason: StopReason,
    },
}

// ============================================================================
// ClientShared
// ============================================================================

/// State shared between the client handles and the supervisor task.
pub(crate) struct ClientShared {
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) dispatcher: EventDispatcher,
    /// Replace-on-write slot for the live epoch.
    pub(crate) current: RwLock<Option<Connection>>,
    pub(crate) events: broadcast::Sender<ConnectionEvent>,
    pub(crate) connected: watch::Sender<bool>,
    pub(crate) stopped: watch::Sender<Option<StopReason>>,
    pub(crate) epochs: AtomicU64,
}

impl ClientShared {
    pub(crate) fn publish(&self, event: ConnectionEvent) {
        debug!(?event, "Connection event");
        let _ = self.events.send(event);
    }
}

// ============================================================================
// Client
// ============================================================================

struct ClientInner {
    shared: Arc<ClientShared>,
    /// Dropping the last client handle drops this sender, which stops the
    /// supervisor.
    shutdown: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

/// Persistent, self-healing connection to a Home Assistant server.
///
/// Cheap to clone; clones share the connection and the subscriptions.
///
/// # Example
///
/// ```ignore
/// use hass_link::{Client, EventFilter};
///
/// let client = Client::builder()
///     .host("homeassistant.local")
///     .token(token)
///     .build()?;
/// client.start()?;
///
/// client.subscribe_sequential(EventFilter::entity("light.kitchen"), |event| async move {
///     println!("{event:?}");
///     Ok(())
/// });
///
/// client.wait_connected(Duration::from_secs(10)).await?;
/// client.call_service("light", "turn_on", None, Some(ServiceTarget::entity("light.kitchen"))).await?;
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client from validated configuration. Not started.
    pub(crate) fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;

        let (events, _) = broadcast::channel(config.notification_capacity);
        let (connected, _) = watch::channel(false);
        let (stopped, _) = watch::channel(None);
        let (shutdown, _) = watch::channel(false);
        let dispatcher = EventDispatcher::new(config.notification_capacity);

        let shared = Arc::new(ClientShared {
            config: Arc::new(config),
            connector,
            dispatcher,
            current: RwLock::new(None),
            events,
            connected,
            stopped,
            epochs: AtomicU64::new(0),
        });

        Ok(Self {
            inner: Arc::new(ClientInner {
                shared,
                shutdown,
                supervisor: Mutex::new(None),
            }),
        })
    }

    /// Starts the reconnect supervisor.
    ///
    /// Must be called within a tokio runtime. Calling it again while the
    /// supervisor runs is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the client was already shut down.
    pub fn start(&self) -> Result<()> {
        let mut supervisor = self.inner.supervisor.lock();
        if supervisor.is_some() {
            return Ok(());
        }
        if *self.inner.shutdown.borrow() || self.inner.shared.stopped.borrow().is_some() {
            return Err(Error::config("Client was shut down and cannot be restarted"));
        }

        let shared = Arc::clone(&self.inner.shared);
        let shutdown = self.inner.shutdown.subscribe();

        info!(endpoint = ?shared.config.endpoint, "Starting client");
        *supervisor = Some(tokio::spawn(async move {
            let reason = ReconnectSupervisor::new(Arc::clone(&shared), shutdown).run().await;
            shared.stopped.send_replace(Some(reason.clone()));
            shared.publish(ConnectionEvent::Stopped { reason });
        }));

        Ok(())
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.shared.config
    }

    /// Returns the live connection, if any.
    #[must_use]
    pub fn current_connection(&self) -> Option<Connection> {
        self.inner
            .shared
            .current
            .read()
            .as_ref()
            .filter(|connection| !connection.is_closed())
            .cloned()
    }

    /// Returns `true` while a usable connection exists.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.current_connection().is_some()
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Sends a command on the live connection with the default timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::Disconnected`] if there is no live connection, or it ends
    ///   before the reply
    /// - see [`Connection::send_command`] for the rest
    pub async fn send_command<C>(&self, command: &C) -> Result<Value>
    where
        C: Serialize + ?Sized,
    {
        self.connection()?.send_command(command).await
    }

    /// Sends a command on the live connection with a custom timeout.
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
        self.connection()?
            .send_command_with_timeout(command, command_timeout)
            .await
    }

    /// Sends a command and decodes the reply into `T`.
    ///
    /// # Errors
    ///
    /// Same as [`send_command`](Self::send_command), plus [`Error::Json`].
    pub async fn send_command_as<T, C>(&self, command: &C) -> Result<T>
    where
        T: DeserializeOwned,
        C: Serialize + ?Sized,
    {
        self.connection()?.send_command_as(command).await
    }

    /// Sends a command without waiting for its reply.
    ///
    /// # Errors
    ///
    /// Fails if there is no live connection or the write fails.
    pub async fn fire_and_forget<C>(&self, command: &C) -> Result<CommandId>
    where
        C: Serialize + ?Sized,
    {
        self.connection()?.fire_and_forget(command).await
    }

    fn connection(&self) -> Result<Connection> {
        self.current_connection().ok_or(Error::Disconnected)
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Adds a subscription. It survives reconnects.
    pub fn subscribe(&self, filter: EventFilter, delivery: Delivery) -> SubscriptionHandle {
        self.inner.shared.dispatcher.subscribe(filter, delivery)
    }

    /// Adds a subscription delivering one event at a time, in order.
    pub fn subscribe_sequential<F, Fut>(&self, filter: EventFilter, callback: F) -> SubscriptionHandle
    where
        F: Fn(ServerEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.subscribe(filter, Delivery::sequential(callback))
    }

    /// Adds a subscription delivering each event on its own task.
    pub fn subscribe_concurrent<F, Fut>(
        &self,
        filter: EventFilter,
        max_in_flight: Option<usize>,
        callback: F,
    ) -> SubscriptionHandle
    where
        F: Fn(ServerEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.subscribe(filter, Delivery::concurrent(callback, max_in_flight))
    }

    /// Adds a subscription running inline on the read loop.
    ///
    /// The callback blocks every reply and event on the connection while it
    /// runs. Keep it short.
    pub fn subscribe_sync<F>(&self, filter: EventFilter, callback: F) -> SubscriptionHandle
    where
        F: Fn(&ServerEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe(filter, Delivery::synchronous(callback))
    }

    /// Removes a subscription. Returns `false` if it was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.shared.dispatcher.unsubscribe(id)
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Subscribes to connection lifecycle notifications.
    #[must_use]
    pub fn connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.shared.events.subscribe()
    }

    /// Subscribes to subscriber callback failures.
    #[must_use]
    pub fn subscriber_faults(&self) -> broadcast::Receiver<SubscriberFault> {
        self.inner.shared.dispatcher.faults()
    }

    /// Waits until a usable connection exists.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if none appears within `wait`
    /// - [`Error::Unauthorized`] if the supervisor stopped on a rejected token
    /// - [`Error::Disconnected`] if the client was shut down
    pub async fn wait_connected(&self, wait: Duration) -> Result<Connection> {
        let shared = &self.inner.shared;
        let mut connected = shared.connected.subscribe();
        let mut stopped = shared.stopped.subscribe();

        let ready = async {
            loop {
                if let Some(connection) = self.current_connection() {
                    return Ok(connection);
                }
                if let Some(reason) = stopped.borrow_and_update().clone() {
                    return Err(reason.to_error());
                }

                tokio::select! {
                    changed = connected.changed() => changed.map_err(|_| Error::Disconnected)?,
                    changed = stopped.changed() => changed.map_err(|_| Error::Disconnected)?,
                }
            }
        };

        match tokio::time::timeout(wait, ready).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::connection(format!(
                "Not connected within {}ms",
                wait.as_millis()
            ))),
        }
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Stops the supervisor and closes the live connection.
    ///
    /// Outstanding commands fail with [`Error::Disconnected`].
    ///
    /// # Errors
    ///
    /// Returns the fault that stopped the supervisor earlier, if any.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.shutdown.send_replace(true);

        let handle = self.inner.supervisor.lock().take();
        match handle {
            Some(handle) => {
                if let Err(e) = handle.await {
                    error!(error = %e, "Supervisor task failed");
                }
            }
            None => {
                // Never started: nothing to stop.
                self.inner
                    .shared
                    .stopped
                    .send_if_modified(|stopped| {
                        if stopped.is_none() {
                            *stopped = Some(StopReason::Shutdown);
                            true
                        } else {
                            false
                        }
                    });
            }
        }

        info!("Client shut down");
        self.stop_result()
    }

    /// Waits until the supervisor has stopped.
    ///
    /// # Errors
    ///
    /// - [`Error::Unauthorized`] if it stopped on a rejected token
    /// - [`Error::Connection`] if it gave up after too many attempts
    pub async fn closed(&self) -> Result<()> {
        let mut stopped = self.inner.shared.stopped.subscribe();
        let reason = match stopped.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone(),
            Err(_) => Some(StopReason::Shutdown),
        };
        reason.unwrap_or(StopReason::Shutdown).into_result()
    }

    fn stop_result(&self) -> Result<()> {
        let reason = self.inner.shared.stopped.borrow().clone();
        reason.unwrap_or(StopReason::Shutdown).into_result()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.inner.shared.config.endpoint)
            .field("connection", &self.current_connection().map(|c| c.id()))
            .field("subscriptions", &self.inner.shared.dispatcher.subscription_count())
            .finish()
    }
}
