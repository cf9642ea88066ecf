//! Reconnect supervision.
//!
//! The supervisor runs one [`ConnectionAttempt`] per epoch, publishes the
//! resulting connection, waits for it to end and decides whether and when
//! to try again:
//!
//! | Outcome | Action |
//! |---------|--------|
//! | `Unauthorized` with `StopOnUnauthorized` | stop with a fatal fault |
//! | `UserRequested` / shutdown signal | stop cleanly |
//! | anything else | retry after the next backoff delay |
//!
//! The backoff resets once a connection stayed up for `stable_after`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Instant, sleep};
use tracing::{error, info, warn};

use crate::config::Backoff;
use crate::error::{Error, Result};
use crate::identifiers::ConnectionId;
use crate::transport::{Connection, ConnectionAttempt, DisconnectReason};

use super::core::{ClientShared, ConnectionEvent};

// ============================================================================
// StopReason
// ============================================================================

/// Why the supervisor stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown was requested, or every client handle was dropped.
    Shutdown,

    /// The server rejected the token under `StopOnUnauthorized`.
    Unauthorized {
        /// Message reported by the server.
        message: String,
    },

    /// `max_attempts` consecutive attempts failed.
    AttemptsExhausted {
        /// Number of failed attempts.
        attempts: u32,
    },
}

impl StopReason {
    /// Returns `true` for stops that indicate a fault.
    #[inline]
    #[must_use]
    pub fn is_fault(&self) -> bool {
        !matches!(self, Self::Shutdown)
    }

    /// Error describing this stop; [`Error::Disconnected`] for a clean one.
    #[must_use]
    pub fn to_error(&self) -> Error {
        match self {
            Self::Shutdown => Error::Disconnected,
            Self::Unauthorized { message } => Error::unauthorized(message.clone()),
            Self::AttemptsExhausted { attempts } => Error::connection(format!(
                "Gave up after {attempts} failed connection attempts"
            )),
        }
    }

    /// `Ok` for a clean stop, the fault otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`to_error`](Self::to_error) for faults.
    pub fn into_result(self) -> Result<()> {
        if self.is_fault() {
            Err(self.to_error())
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shutdown => f.write_str("shutdown"),
            Self::Unauthorized { message } => write!(f, "unauthorized: {message}"),
            Self::AttemptsExhausted { attempts } => write!(f, "gave up after {attempts} attempts"),
        }
    }
}

// ============================================================================
// ReconnectSupervisor
// ============================================================================

/// Connection loop of one client.
pub(crate) struct ReconnectSupervisor {
    shared: Arc<ClientShared>,
    shutdown: watch::Receiver<bool>,
    backoff: Backoff,
    /// Consecutive attempts that did not reach `Connected`.
    failures: u32,
}

impl ReconnectSupervisor {
    pub(crate) fn new(shared: Arc<ClientShared>, shutdown: watch::Receiver<bool>) -> Self {
        let backoff = Backoff::new(&shared.config.reconnect);
        Self {
            shared,
            shutdown,
            backoff,
            failures: 0,
        }
    }

    /// Runs until a stop condition is met.
    pub(crate) async fn run(mut self) -> StopReason {
        let policy = self.shared.config.reconnect.policy;

        loop {
            if self.shutdown_requested() {
                return StopReason::Shutdown;
            }

            let id = ConnectionId::next(&self.shared.epochs);
            let mut attempt = ConnectionAttempt::new(
                id,
                Arc::clone(&self.shared.config),
                Arc::clone(&self.shared.connector),
                self.shared.dispatcher.clone(),
            );

            let mut shutdown = self.shutdown.clone();
            let outcome = tokio::select! {
                outcome = attempt.establish() => outcome,
                () = shutdown_signalled(&mut shutdown) => {
                    info!(connection = %id, "Shutdown during connection attempt");
                    attempt.abandon().await;
                    return StopReason::Shutdown;
                }
            };

            match outcome {
                Ok(connection) => {
                    self.failures = 0;
                    let reason = self.serve(connection).await;

                    if policy.gives_up_on(reason) {
                        return StopReason::Shutdown;
                    }
                }

                Err(failure) => {
                    self.shared.publish(ConnectionEvent::AttemptFailed {
                        connection: id,
                        reason: failure.reason,
                    });

                    if policy.gives_up_on(failure.reason) {
                        error!(connection = %id, error = %failure.error, "Giving up: access token rejected");
                        let message = match failure.error {
                            Error::Unauthorized { message } => message,
                            other => other.to_string(),
                        };
                        return StopReason::Unauthorized { message };
                    }

                    self.failures += 1;
                    if let Some(max) = self.shared.config.reconnect.max_attempts
                        && self.failures >= max
                    {
                        error!(attempts = self.failures, "Giving up: too many failed attempts");
                        return StopReason::AttemptsExhausted {
                            attempts: self.failures,
                        };
                    }
                }
            }

            let delay = self.backoff.next_delay();
            info!(
                delay_ms = delay.as_millis() as u64,
                attempt = self.backoff.attempt(),
                "Reconnecting after delay"
            );

            let mut shutdown = self.shutdown.clone();
            tokio::select! {
                () = sleep(delay) => {}
                () = shutdown_signalled(&mut shutdown) => return StopReason::Shutdown,
            }
        }
    }

    /// Publishes `connection`, waits for it to end and returns why.
    async fn serve(&mut self, connection: Connection) -> DisconnectReason {
        let id = connection.id();
        let connected_at = Instant::now();

        *self.shared.current.write() = Some(connection.clone());
        self.shared.connected.send_replace(true);
        self.shared.publish(ConnectionEvent::Connected { connection: id });

        let mut shutdown = self.shutdown.clone();
        let reason = tokio::select! {
            reason = connection.closed() => reason,
            () = shutdown_signalled(&mut shutdown) => {
                connection.close(DisconnectReason::UserRequested).await;
                connection.closed().await
            }
        };

        {
            let mut current = self.shared.current.write();
            if current.as_ref().is_some_and(|c| c.id() == id) {
                *current = None;
            }
        }
        self.shared.connected.send_replace(false);
        self.shared.publish(ConnectionEvent::Disconnected {
            connection: id,
            reason,
        });

        let uptime = connected_at.elapsed();
        if uptime >= self.shared.config.reconnect.stable_after {
            self.backoff.reset();
        }
        warn!(connection = %id, %reason, uptime_ms = uptime.as_millis() as u64, "Disconnected");

        reason
    }

    fn shutdown_requested(&self) -> bool {
        // A dropped sender means every client handle is gone.
        *self.shutdown.borrow() || self.shutdown.has_changed().is_err()
    }
}

/// Resolves once shutdown is requested or every client handle is gone.
async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    // The returned guard is not `Send`; drop it before the caller awaits.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use serde_json::json;

    use crate::client::Client;
    use crate::config::{ClientConfig, EndpointConfig, ReconnectPolicy};
    use crate::transport::testing::{PairConnector, ServerEnd};

    fn client(connector: PairConnector, policy: ReconnectPolicy) -> Client {
        let endpoint = EndpointConfig::new("localhost", 8123, "secret-token")
            .with_handshake_timeout(Duration::from_secs(1));
        let mut config = ClientConfig::new(endpoint);
        config.reconnect.policy = policy;
        config.reconnect.initial_delay = Duration::from_millis(10);
        config.reconnect.max_delay = Duration::from_millis(20);
        Client::new(config, Arc::new(connector)).unwrap()
    }

    async fn accept(server: &mut ServerEnd) {
        server.accept_auth().await;
        server.reply_next(json!(null)).await;
        server.reply_next(json!({ "state": "RUNNING" })).await;
    }

    #[test]
    fn test_stop_reason_results() {
        assert!(StopReason::Shutdown.into_result().is_ok());

        let err = StopReason::Unauthorized {
            message: "Invalid access token".into(),
        }
        .into_result()
        .unwrap_err();
        assert!(err.is_fatal());

        let err = StopReason::AttemptsExhausted { attempts: 3 }.to_error();
        assert!(err.to_string().contains("3 failed"));
    }

    #[test]
    fn test_clean_stop_is_not_fault() {
        assert!(!StopReason::Shutdown.is_fault());
        assert!(StopReason::AttemptsExhausted { attempts: 1 }.is_fault());
    }

    #[tokio::test]
    async fn test_reconnects_after_remote_close() {
        let (connector, mut servers) = PairConnector::new();
        let client = client(connector, ReconnectPolicy::StopOnUnauthorized);
        let mut events = client.connection_events();
        client.start().unwrap();

        let mut first = servers.recv().await.unwrap();
        accept(&mut first).await;
        let ConnectionEvent::Connected { connection: one } = events.recv().await.unwrap() else {
            panic!("expected Connected");
        };
        assert!(client.is_connected());

        first.close().await;
        assert_eq!(
            events.recv().await.unwrap(),
            ConnectionEvent::Disconnected {
                connection: one,
                reason: DisconnectReason::RemoteClosed,
            }
        );

        let mut second = servers.recv().await.unwrap();
        accept(&mut second).await;
        let ConnectionEvent::Connected { connection: two } = events.recv().await.unwrap() else {
            panic!("expected Connected");
        };
        assert!(two > one);

        client.shutdown().await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            ConnectionEvent::Disconnected {
                reason: DisconnectReason::UserRequested,
                ..
            }
        ));
    }

    fn assert_gap(gap: Duration, expected_ms: u64) {
        let expected = Duration::from_millis(expected_ms);
        assert!(
            gap + Duration::from_millis(1) >= expected && gap < expected + Duration::from_millis(50),
            "expected about {expected:?} before reconnecting, waited {gap:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_resets_only_after_stable_uptime() {
        let (connector, mut servers) = PairConnector::new();
        let endpoint = EndpointConfig::new("localhost", 8123, "secret-token")
            .with_handshake_timeout(Duration::from_secs(5));
        let mut config = ClientConfig::new(endpoint);
        config.reconnect.initial_delay = Duration::from_millis(100);
        config.reconnect.max_delay = Duration::from_secs(10);
        config.reconnect.factor = 2.0;
        config.reconnect.stable_after = Duration::from_secs(1);
        let client = Client::new(config, Arc::new(connector)).unwrap();
        let mut events = client.connection_events();
        client.start().unwrap();

        // Drops before `stable_after` keep growing the delay.
        let mut server = servers.recv().await.unwrap();
        for expected_ms in [100, 200] {
            accept(&mut server).await;
            assert!(matches!(events.recv().await.unwrap(), ConnectionEvent::Connected { .. }));
            server.close().await;
            let dropped_at = Instant::now();
            server = servers.recv().await.unwrap();
            assert_gap(dropped_at.elapsed(), expected_ms);
            assert!(matches!(events.recv().await.unwrap(), ConnectionEvent::Disconnected { .. }));
        }

        // A connection that outlives `stable_after` starts over at the initial delay.
        accept(&mut server).await;
        assert!(matches!(events.recv().await.unwrap(), ConnectionEvent::Connected { .. }));
        sleep(Duration::from_secs(2)).await;
        server.close().await;
        let dropped_at = Instant::now();
        let mut server = servers.recv().await.unwrap();
        assert_gap(dropped_at.elapsed(), 100);

        accept(&mut server).await;
        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_always_retry_survives_rejected_token() {
        let (connector, mut servers) = PairConnector::new();
        let client = client(connector, ReconnectPolicy::AlwaysRetry);
        let mut events = client.connection_events();
        client.start().unwrap();

        let mut first = servers.recv().await.unwrap();
        first
            .send_json(json!({ "type": "auth_required", "ha_version": "2024.6.0" }))
            .await;
        first.recv_json().await.unwrap();
        first
            .send_json(json!({ "type": "auth_invalid", "message": "Invalid access token" }))
            .await;

        assert!(matches!(
            events.recv().await.unwrap(),
            ConnectionEvent::AttemptFailed {
                reason: DisconnectReason::Unauthorized,
                ..
            }
        ));

        // Second attempt is opened but never answered; shutdown abandons it.
        let _second = servers.recv().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), client.shutdown())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            ConnectionEvent::Stopped {
                reason: StopReason::Shutdown
            }
        );
    }
}
