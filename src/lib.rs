//! hass-link - Persistent WebSocket RPC client for Home Assistant.
//!
//! One long-lived [`Client`] keeps an authenticated connection to a Home
//! Assistant server, sends commands and waits for their replies, and fans
//! server events out to subscriptions that survive reconnects.
//!
//! # Architecture
//!
//! ```text
//! Client ──► ReconnectSupervisor ──► ConnectionAttempt ──► Connection (epoch)
//!    │                                                        │
//!    ├── send_command ─────────────────► CommandCorrelator ◄──┤ read loop
//!    └── subscribe ────────────────────► EventDispatcher   ◄──┘
//! ```
//!
//! Key properties:
//!
//! - Every connection is a numbered epoch; nothing crosses epochs
//! - Command ids are unique per epoch and start at 1
//! - A reply resolves exactly one waiter; late replies are dropped
//! - A slow or failing subscriber never stalls the read loop
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use hass_link::{Client, EventFilter, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder()
//!         .host("homeassistant.local")
//!         .token("long-lived-access-token")
//!         .build()?;
//!
//!     client.subscribe_sequential(EventFilter::entity("light.kitchen"), |event| async move {
//!         println!("{}", event.kind());
//!         Ok(())
//!     });
//!
//!     client.start()?;
//!     client.wait_connected(Duration::from_secs(10)).await?;
//!
//!     let states = client.get_states().await?;
//!     println!("{} entities", states.len());
//!
//!     client.shutdown().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Client`], [`ClientBuilder`], reconnect supervision |
//! | [`config`] | Endpoint, timeouts, reconnect policy |
//! | [`dispatch`] | Event filters, delivery modes, dispatcher |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire message types and codec |
//! | [`transport`] | WebSocket transport, handshake, connections |
//!
//! # Features
//!
//! - `tls`: `wss://` endpoints via rustls with webpki roots

// ============================================================================
// Modules
// ============================================================================

/// Client facade and reconnect supervision.
///
/// Use [`Client::builder()`] to create a configured client.
pub mod client;

/// Client configuration.
pub mod config;

/// Event dispatch to subscriptions.
pub mod dispatch;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Wire protocol message types.
pub mod protocol;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ClientBuilder, ConnectionEvent, StopReason};

// Configuration types
pub use config::{ClientConfig, EndpointConfig, ReconnectConfig, ReconnectPolicy};

// Dispatch types
pub use dispatch::{Delivery, DeliveryMode, EventFilter, SubscriberFault, SubscriptionHandle};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CommandId, ConnectionId, SubscriptionId};

// Protocol types
pub use protocol::{
    Command, HassArea, HassConfig, HassDevice, HassEntity, HassEvent, HassState, InputBooleanHelper,
    InputNumberHelper, InputNumberMode, NewInputNumber, RawCommand, ServerEvent, ServiceTarget,
    StateChange,
};

// Transport types
pub use transport::{Connection, ConnectionState, Connector, DisconnectReason, Transport, WsConnector};
