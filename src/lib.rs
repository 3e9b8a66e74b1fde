//! MQTT Client Network Transport
//!
//! Turns raw byte-stream connections into the connection contract an MQTT
//! client engine expects. [`NetworkTransport::connect`] obtains a raw
//! connection from a pluggable factory, relays its diagnostics, resolves and
//! connects, then starts delivering received data and breaks to handlers that
//! can be swapped at any time.
//!
//! ```no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use mqtt_network_transport::{Connection, NetworkTransport};
//!
//! # async fn run() -> Result<(), mqtt_network_transport::ConnectError> {
//! let transport = NetworkTransport::default();
//! let connection = transport
//!     .connect(
//!         "mqtt",
//!         "broker.local",
//!         1883,
//!         Arc::new(|data: Bytes| println!("received {} bytes", data.len())),
//!         Arc::new(|graceful: bool| println!("broken, graceful={}", graceful)),
//!     )
//!     .await?;
//! connection.send(Bytes::from_static(&[0xC0, 0x00]));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod transport;

pub use client::{ConnectError, NetworkTransport, TransportConfig};
pub use connection::{format_peer_id, ConnectionAdapter};
pub use transport::{ConnectionFactory, NetworkConnection, TcpConfig};

pub use mqtt_transport_shared::{
    level, BrokenHandler, ClientTransportLayer, Connection, DataReceivedHandler,
    DiagnosticsSender, Unsubscribe,
};
