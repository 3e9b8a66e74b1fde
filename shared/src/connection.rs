//! Connection contracts consumed by the MQTT protocol engine

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Called with each chunk of bytes received from the peer
pub type DataReceivedHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Called once when the connection breaks; `true` means the close was graceful
pub type BrokenHandler = Arc<dyn Fn(bool) + Send + Sync>;

/// A connected byte stream to an MQTT peer
///
/// Handlers may be replaced at any time, including from inside a handler and
/// while the transport is delivering a notification on another thread.
pub trait Connection: Send + Sync {
    /// Identity of the remote endpoint, as `a.b.c.d:port`
    fn peer_id(&self) -> String;

    /// Replace the handler for received data
    fn set_data_received_handler(&self, handler: DataReceivedHandler);

    /// Replace the handler for a broken connection
    fn set_broken_handler(&self, handler: BrokenHandler);

    /// Queue bytes for the peer
    ///
    /// Failures are not reported here; they surface later through the broken
    /// handler.
    fn send(&self, data: Bytes);

    /// Close the connection, gracefully or abruptly
    fn close(&self, graceful: bool);
}

/// Something that can open connections for the protocol engine
#[async_trait]
pub trait ClientTransportLayer: Send + Sync {
    /// Why a connection could not be opened
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connect to `host:port` and start delivering events to the handlers
    async fn connect(
        &self,
        scheme: &str,
        host: &str,
        port: u16,
        on_data: DataReceivedHandler,
        on_broken: BrokenHandler,
    ) -> Result<Box<dyn Connection>, Self::Error>;
}
