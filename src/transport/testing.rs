//! In-memory WebSocket pairs for unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::DuplexStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::Role;

use crate::config::EndpointConfig;
use crate::error::{Error, Result};

use super::websocket::{Connector, Transport, WsTransport};

/// Server side of an in-memory pair, driven by the test.
pub(crate) struct ServerEnd {
    ws: WebSocketStream<DuplexStream>,
}

impl ServerEnd {
    pub(crate) async fn send_text(&mut self, text: &str) {
        self.ws.send(WsMessage::Text(text.to_string().into())).await.expect("server send");
    }

    pub(crate) async fn send_json(&mut self, value: Value) {
        self.send_text(&value.to_string()).await;
    }

    /// Next text frame, `None` once the client is gone.
    pub(crate) async fn recv_text(&mut self) -> Option<String> {
        while let Some(frame) = self.ws.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => return Some(text.to_string()),
                Ok(WsMessage::Close(_)) | Err(_) => return None,
                Ok(_) => {}
            }
        }
        None
    }

    pub(crate) async fn recv_json(&mut self) -> Option<Value> {
        let text = self.recv_text().await?;
        Some(serde_json::from_str(&text).expect("client sent JSON"))
    }

    /// Sends `auth_required`, consumes `auth` and answers `auth_ok`.
    pub(crate) async fn accept_auth(&mut self) -> Value {
        self.send_json(serde_json::json!({ "type": "auth_required", "ha_version": "2024.6.0" }))
            .await;
        let auth = self.recv_json().await.expect("auth frame");
        self.send_json(serde_json::json!({ "type": "auth_ok", "ha_version": "2024.6.0" }))
            .await;
        auth
    }

    /// Answers the next command with a successful result, returning it.
    pub(crate) async fn reply_next(&mut self, result: Value) -> Value {
        let command = self.recv_json().await.expect("command frame");
        self.send_json(serde_json::json!({
            "id": command["id"],
            "type": "result",
            "success": true,
            "result": result,
        }))
        .await;
        command
    }

    pub(crate) async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Creates a connected client transport and its server end.
pub(crate) async fn pair() -> (Arc<WsTransport<DuplexStream>>, ServerEnd) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;
    let server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;

    (Arc::new(WsTransport::new(client)), ServerEnd { ws: server })
}

/// Connector handing each opened pair's server end to the test.
pub(crate) struct PairConnector {
    servers: mpsc::UnboundedSender<ServerEnd>,
}

impl PairConnector {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        let (servers, rx) = mpsc::unbounded_channel();
        (Self { servers }, rx)
    }
}

#[async_trait]
impl Connector for PairConnector {
    async fn open(&self, _endpoint: &EndpointConfig) -> Result<Arc<dyn Transport>> {
        let (transport, server) = pair().await;
        self.servers
            .send(server)
            .map_err(|_| Error::connection("test server gone"))?;
        Ok(transport)
    }
}

/// How a [`StubTransport`] answers writes.
#[derive(Debug, Clone, Copy)]
pub(crate) enum WriteBehavior {
    /// The write never completes.
    Stall,
    /// The write fails with a transport error.
    Fail,
}

/// Transport that delivers no frames and misbehaves on write.
pub(crate) struct StubTransport {
    write: WriteBehavior,
    closed: watch::Sender<bool>,
}

impl StubTransport {
    pub(crate) fn new(write: WriteBehavior) -> Arc<Self> {
        let (closed, _) = watch::channel(false);
        Arc::new(Self { write, closed })
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn read_frame(&self) -> Result<String> {
        let mut closed = self.closed.subscribe();
        let _ = closed.wait_for(|closed| *closed).await;
        Err(Error::ConnectionClosed)
    }

    async fn write_frame(&self, _frame: String) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        match self.write {
            WriteBehavior::Stall => std::future::pending().await,
            WriteBehavior::Fail => Err(Error::connection("broken pipe")),
        }
    }

    async fn close(&self) {
        self.closed.send_replace(true);
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}
