//! In-process Home Assistant stand-in for integration tests.
//!
//! Listens on `127.0.0.1:0`, speaks the auth handshake, answers a handful
//! of commands and lets the test push events or drop live connections.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hass_link::{Client, ClientBuilder};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;

// ============================================================================
// Constants
// ============================================================================

pub const TOKEN: &str = "test-token";
pub const HA_VERSION: &str = "2024.6.0";

/// Command type the server never answers.
pub const SILENT: &str = "test/silent";

// ============================================================================
// Logging
// ============================================================================

/// Installs a test subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hass_link=debug")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MockServer
// ============================================================================

#[derive(Debug, Clone)]
enum Control {
    Push(Value),
    Drop,
}

struct State {
    connections: AtomicUsize,
    auth_attempts: AtomicUsize,
    commands: Mutex<Vec<Value>>,
    control: broadcast::Sender<Control>,
}

/// Handle to a running mock server.
#[derive(Clone)]
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<State>,
}

impl MockServer {
    /// Binds an ephemeral port and starts accepting.
    pub async fn start() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (control, _) = broadcast::channel(64);
        let state = Arc::new(State {
            connections: AtomicUsize::new(0),
            auth_attempts: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
            control,
        });

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = Arc::clone(&accept_state);
                tokio::spawn(async move {
                    let _ = serve(stream, state).await;
                });
            }
        });

        Ok(Self { addr, state })
    }

    /// Builder pointed at this server with fast retries.
    pub fn client_builder(&self) -> ClientBuilder {
        Client::builder()
            .host("127.0.0.1")
            .port(self.addr.port())
            .token(TOKEN)
            .handshake_timeout(Duration::from_secs(2))
            .reconnect_delay(Duration::from_millis(20), Duration::from_millis(100))
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Auth frames received so far.
    pub fn auth_attempts(&self) -> usize {
        self.state.auth_attempts.load(Ordering::SeqCst)
    }

    /// Command types received so far, in order.
    pub fn command_types(&self) -> Vec<String> {
        self.state
            .commands
            .lock()
            .iter()
            .filter_map(|c| c["type"].as_str().map(str::to_string))
            .collect()
    }

    /// Sends an event to every live connection.
    pub fn push_event(&self, event_type: &str, data: Value) {
        let _ = self.state.control.send(Control::Push(json!({
            "event_type": event_type,
            "data": data,
            "origin": "LOCAL",
            "time_fired": "2024-06-01T12:00:00+00:00"
        })));
    }

    /// Closes every live connection from the server side.
    pub fn drop_connections(&self) {
        let _ = self.state.control.send(Control::Drop);
    }

    /// Waits until a command of `command_type` has been received.
    pub async fn wait_for_command(&self, command_type: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !self.command_types().iter().any(|t| t == command_type) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("command never arrived");
    }
}

async fn serve(stream: TcpStream, state: Arc<State>) -> anyhow::Result<()> {
    let mut ws = tokio_tungstenite::accept_async(stream).await?;
    state.connections.fetch_add(1, Ordering::SeqCst);

    ws.send(text(json!({ "type": "auth_required", "ha_version": HA_VERSION })))
        .await?;

    let auth = loop {
        match ws.next().await {
            Some(Ok(Message::Text(frame))) => break serde_json::from_str::<Value>(&frame)?,
            Some(Ok(_)) => continue,
            _ => return Ok(()),
        }
    };
    state.auth_attempts.fetch_add(1, Ordering::SeqCst);

    if auth["access_token"] != TOKEN {
        ws.send(text(json!({ "type": "auth_invalid", "message": "Invalid access token" })))
            .await?;
        ws.close(None).await?;
        return Ok(());
    }

    let mut control = state.control.subscribe();
    ws.send(text(json!({ "type": "auth_ok", "ha_version": HA_VERSION })))
        .await?;

    let mut subscription = Value::Null;
    loop {
        tokio::select! {
            frame = ws.next() => {
                let Some(Ok(frame)) = frame else { return Ok(()) };
                let Message::Text(frame) = frame else { continue };
                let command: Value = serde_json::from_str(&frame)?;
                state.commands.lock().push(command.clone());

                let id = command["id"].clone();
                if command["type"] == "subscribe_events" {
                    subscription = id.clone();
                }
                if let Some(reply) = reply_to(&command) {
                    ws.send(text(reply)).await?;
                }
            }
            control = control.recv() => match control {
                Ok(Control::Push(event)) => {
                    ws.send(text(json!({ "id": subscription, "type": "event", "event": event })))
                        .await?;
                }
                Ok(Control::Drop) | Err(_) => {
                    let _ = ws.close(None).await;
                    return Ok(());
                }
            },
        }
    }
}

fn reply_to(command: &Value) -> Option<Value> {
    let id = command["id"].clone();
    let success = |result: Value| json!({ "id": id, "type": "result", "success": true, "result": result });

    let reply = match command["type"].as_str().unwrap_or_default() {
        SILENT => return None,
        "ping" => json!({ "id": id, "type": "pong" }),
        "subscribe_events" | "fire_event" => success(Value::Null),
        "get_config" => success(json!({
            "state": "RUNNING",
            "version": HA_VERSION,
            "location_name": "Home",
            "time_zone": "UTC",
            "components": ["light"]
        })),
        "get_states" => success(json!([
            { "entity_id": "light.kitchen", "state": "on", "attributes": { "brightness": 200 } },
            { "entity_id": "sensor.temp", "state": "21.5", "attributes": {} }
        ])),
        "call_service" if command["domain"] == "light" => {
            success(json!({ "context": { "id": "ctx-1" } }))
        }
        "input_boolean/create" => success(json!({
            "id": command["name"].as_str().unwrap_or_default().to_lowercase(),
            "name": command["name"]
        })),
        "input_boolean/list" => success(json!([{ "id": "away", "name": "Away" }])),
        "input_number/list" => success(Value::Null),
        "input_number/delete" if command["input_number_id"] == "volume" => success(Value::Null),
        "call_service" => json!({
            "id": id,
            "type": "result",
            "success": false,
            "error": { "code": "not_found", "message": "Service not found." }
        }),
        _ => json!({
            "id": id,
            "type": "result",
            "success": false,
            "error": { "code": "unknown_command", "message": "Unknown command." }
        }),
    };
    Some(reply)
}

fn text(value: Value) -> Message {
    Message::Text(value.to_string().into())
}
