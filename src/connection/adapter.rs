//! Connection adapter over a raw network connection

use crate::connection::ConnectionDelegates;
use crate::transport::NetworkConnection;
use bytes::Bytes;
use mqtt_transport_shared::{BrokenHandler, Connection, DataReceivedHandler};
use std::sync::Arc;

/// Format a peer as `a.b.c.d:port`, most significant octet first
pub fn format_peer_id(address: u32, port: u16) -> String {
    format!(
        "{}.{}.{}.{}:{}",
        (address >> 24) & 0xFF,
        (address >> 16) & 0xFF,
        (address >> 8) & 0xFF,
        address & 0xFF,
        port
    )
}

/// The connection handed to the MQTT engine
///
/// Owns the raw connection outright. The handler registry is shared with the
/// closures running the raw connection's notifications, so those closures
/// stay valid however the adapter is torn down.
pub struct ConnectionAdapter {
    raw: Box<dyn NetworkConnection>,
    delegates: Arc<ConnectionDelegates>,
}

impl ConnectionAdapter {
    pub(crate) fn new(raw: Box<dyn NetworkConnection>) -> Self {
        Self {
            raw,
            delegates: Arc::new(ConnectionDelegates::default()),
        }
    }

    pub(crate) fn raw(&self) -> &dyn NetworkConnection {
        self.raw.as_ref()
    }

    pub(crate) fn delegates(&self) -> &Arc<ConnectionDelegates> {
        &self.delegates
    }
}

impl Connection for ConnectionAdapter {
    fn peer_id(&self) -> String {
        format_peer_id(self.raw.peer_address(), self.raw.peer_port())
    }

    fn set_data_received_handler(&self, handler: DataReceivedHandler) {
        self.delegates.set_data_received(Some(handler));
    }

    fn set_broken_handler(&self, handler: BrokenHandler) {
        self.delegates.set_broken(Some(handler));
    }

    fn send(&self, data: Bytes) {
        self.raw.send(data);
    }

    fn close(&self, graceful: bool) {
        self.raw.close(graceful);
    }
}

impl Drop for ConnectionAdapter {
    fn drop(&mut self) {
        // Silence the handlers first; the raw connection is released right
        // after, when the fields drop.
        self.delegates.clear();
    }
}
