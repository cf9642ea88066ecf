//! Framed duplex transport over WebSocket.
//!
//! [`Transport`] is the seam between the protocol machinery and the
//! socket: one reader loop calls [`Transport::read_frame`], any number of
//! tasks call [`Transport::write_frame`] concurrently and are serialized
//! by a single writer section.
//!
//! A read failure or a local `close` marks the transport closed. A reader
//! blocked in `read_frame` is woken, and every later call fails fast with
//! [`Error::ConnectionClosed`]. A write failure is only reported; the
//! caller decides how the transport ends.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::config::EndpointConfig;
use crate::error::{Error, Result};

// ============================================================================
// Traits
// ============================================================================

/// A framed, duplex text transport.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Reads the next text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the transport is or becomes closed
    /// - [`Error::WebSocket`] on a transport failure
    async fn read_frame(&self) -> Result<String>;

    /// Writes one text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the transport is closed
    /// - [`Error::WebSocket`] on a transport failure; the transport stays
    ///   open until [`close`](Self::close) is called
    async fn write_frame(&self, frame: String) -> Result<()>;

    /// Closes the transport. Idempotent.
    async fn close(&self);

    /// Returns `true` once the transport is closed.
    fn is_closed(&self) -> bool;
}

/// Opens transports to an endpoint.
///
/// Cancel an in-flight `open` by dropping its future.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens a new transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] or [`Error::Config`] if the endpoint
    /// cannot be reached.
    async fn open(&self, endpoint: &EndpointConfig) -> Result<Arc<dyn Transport>>;
}

// ============================================================================
// WsConnector
// ============================================================================

/// Default connector using `tokio-tungstenite`.
///
/// `wss://` endpoints need the `tls` cargo feature.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, endpoint: &EndpointConfig) -> Result<Arc<dyn Transport>> {
        let url = endpoint.ws_url()?;
        info!(url = %url, "Connecting to websocket");

        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| Error::connection(format!("WebSocket connect to {url} failed: {e}")))?;

        debug!(url = %url, "WebSocket opened");

        Ok(Arc::new(WsTransport::new(stream)))
    }
}

// ============================================================================
// WsTransport
// ============================================================================

/// Upper bound for flushing the close handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// [`Transport`] over a split `WebSocketStream`.
pub struct WsTransport<S = MaybeTlsStream<TcpStream>> {
    /// Read half, used by the single reader loop.
    reader: Mutex<SplitStream<WebSocketStream<S>>>,
    /// Write half; the lock is the writer section.
    writer: Mutex<SplitSink<WebSocketStream<S>, WsMessage>>,
    /// Closed flag; also wakes a blocked reader.
    closed: watch::Sender<bool>,
}

impl<S> WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps an open WebSocket stream.
    #[must_use]
    pub fn new(stream: WebSocketStream<S>) -> Self {
        let (writer, reader) = stream.split();
        let (closed, _) = watch::channel(false);

        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed,
        }
    }

    /// Marks the transport closed, returning `true` if it was open.
    fn mark_closed(&self) -> bool {
        !self.closed.send_replace(true)
    }

    /// Sends or acknowledges the close frame and flushes the sink.
    async fn close_writer(&self) {
        let closing = async {
            let mut writer = self.writer.lock().await;
            writer.close().await
        };

        match timeout(CLOSE_TIMEOUT, closing).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "WebSocket close handshake failed"),
            Err(_) => debug!("WebSocket close handshake timed out"),
        }
    }
}

#[async_trait]
impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read_frame(&self) -> Result<String> {
        let mut closed_rx = self.closed.subscribe();
        if *closed_rx.borrow_and_update() {
            return Err(Error::ConnectionClosed);
        }

        let mut reader = self.reader.lock().await;

        loop {
            let next = tokio::select! {
                next = reader.next() => next,
                _ = closed_rx.wait_for(|closed| *closed) => return Err(Error::ConnectionClosed),
            };

            match next {
                Some(Ok(WsMessage::Text(text))) => return Ok(text.to_string()),

                Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Ok(text),
                    Err(_) => warn!(len = bytes.len(), "Dropping non-UTF-8 binary frame"),
                },

                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(?frame, "WebSocket closed by remote");
                    if self.mark_closed() {
                        self.close_writer().await;
                    }
                    return Err(Error::ConnectionClosed);
                }

                Some(Ok(_)) => trace!("Skipping control frame"),

                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket read failed");
                    self.mark_closed();
                    return Err(Error::WebSocket(e));
                }

                None => {
                    debug!("WebSocket stream ended");
                    self.mark_closed();
                    return Err(Error::ConnectionClosed);
                }
            }
        }
    }

    async fn write_frame(&self, frame: String) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.send(WsMessage::Text(frame.into())).await {
            warn!(error = %e, "WebSocket write failed");
            return Err(Error::WebSocket(e));
        }

        Ok(())
    }

    async fn close(&self) {
        if self.mark_closed() {
            self.close_writer().await;
        }
    }

    #[inline]
    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::transport::testing::pair;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (transport, mut server) = pair().await;

        server.send_text("{\"type\":\"auth_required\"}").await;
        assert_eq!(transport.read_frame().await.unwrap(), "{\"type\":\"auth_required\"}");

        transport.write_frame("{\"type\":\"auth\"}".into()).await.unwrap();
        assert_eq!(server.recv_text().await.as_deref(), Some("{\"type\":\"auth\"}"));
    }

    #[tokio::test]
    async fn test_remote_close_marks_closed() {
        let (transport, mut server) = pair().await;

        server.close().await;
        let err = transport.read_frame().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        assert!(transport.is_closed());

        let err = transport.write_frame("x".into()).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_remote_close_is_acknowledged() {
        let (transport, mut server) = pair().await;

        server.close().await;
        assert!(matches!(transport.read_frame().await, Err(Error::ConnectionClosed)));

        let next = tokio::time::timeout(Duration::from_secs(1), server.recv_text()).await;
        assert_eq!(next.expect("close handshake completed"), None);
    }

    #[tokio::test]
    async fn test_local_close_wakes_blocked_reader() {
        let (transport, _server) = pair().await;

        let reader = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.read_frame().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        transport.close().await;
        let result = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("reader woke")
            .expect("join");
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_concurrent_writers_are_serialized() {
        let (transport, mut server) = pair().await;

        let mut handles = Vec::new();
        for i in 0..20 {
            let transport = Arc::clone(&transport);
            handles.push(tokio::spawn(async move {
                transport.write_frame(format!("{{\"n\":{i}}}")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..20 {
            let text = server.recv_text().await.unwrap();
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            seen.push(value["n"].as_u64().unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_connector_reports_connect_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = EndpointConfig::new("127.0.0.1", port, "t");
        let err = WsConnector.open(&endpoint).await.err().expect("connect fails");
        assert!(matches!(err, Error::Connection { .. }));
    }
}
