//! Raw network connection abstraction for pluggable backends

use crate::transport::tcp::resolve_ipv4;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use mqtt_transport_shared::{BrokenHandler, DataReceivedHandler, DiagnosticHandler, Unsubscribe};
use std::sync::Arc;

/// A byte-stream connection, independent of any protocol on top of it
///
/// Notifications passed to `process` are invoked from the connection's own
/// execution context, never from the caller of `process`.
#[async_trait]
pub trait NetworkConnection: Send + Sync + 'static {
    /// IPv4 address of the peer, 0 until connected
    fn peer_address(&self) -> u32;

    /// Port of the peer, 0 until connected
    fn peer_port(&self) -> u16;

    /// Translate a host name or dotted-quad literal into an IPv4 address
    async fn resolve_host(&self, host: &str) -> Option<u32> {
        resolve_ipv4(host).await
    }

    /// Establish the connection
    async fn connect(&self, address: u32, port: u16) -> Result<()>;

    /// Start delivering received data and the eventual close to the handlers
    fn process(&self, on_data: DataReceivedHandler, on_broken: BrokenHandler) -> Result<()>;

    /// Queue bytes for the peer
    fn send(&self, data: Bytes);

    /// Close the connection
    fn close(&self, graceful: bool);

    /// Subscribe to diagnostics published by this connection
    fn subscribe_to_diagnostics(&self, handler: DiagnosticHandler, min_level: usize)
        -> Unsubscribe;

    /// Human-readable name for this backend
    fn name(&self) -> &'static str;
}

/// Creates raw connections from `(scheme, host)`
pub type ConnectionFactory =
    Arc<dyn Fn(&str, &str) -> Option<Box<dyn NetworkConnection>> + Send + Sync>;
