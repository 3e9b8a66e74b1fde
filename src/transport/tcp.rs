//! TCP transport implementation, the default raw connection

use crate::transport::traits::{ConnectionFactory, NetworkConnection};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use mqtt_transport_shared::{
    level, BrokenHandler, DataReceivedHandler, DiagnosticHandler, DiagnosticsSender, Unsubscribe,
};
use parking_lot::Mutex;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Schemes a broker usually serves over TLS
const TLS_SCHEMES: &[&str] = &["mqtts", "ssl", "tls"];

/// Configuration for TCP connections
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Size of the buffer each read fills
    pub read_buffer_size: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_buffer_size: 4096,
        }
    }
}

/// Work for the writer task, in order
enum Outbound {
    Data(Bytes),
    Shutdown,
}

#[derive(Default)]
struct State {
    peer: Option<SocketAddrV4>,
    /// Connected but not yet processing
    stream: Option<TcpStream>,
    outbound_tx: Option<mpsc::UnboundedSender<Outbound>>,
    abort_tx: Option<oneshot::Sender<()>>,
    tasks: Vec<JoinHandle<()>>,
}

/// Raw connection over a tokio TCP stream
///
/// Once processing starts, a reader task delivers data and the final close,
/// and a writer task drains queued sends. Dropping the connection aborts both.
pub struct TcpConnection {
    config: TcpConfig,
    diagnostics: DiagnosticsSender,
    state: Mutex<State>,
}

impl TcpConnection {
    pub fn new(config: TcpConfig) -> Self {
        Self {
            config,
            diagnostics: DiagnosticsSender::new("TcpConnection"),
            state: Mutex::new(State::default()),
        }
    }
}

impl Default for TcpConnection {
    fn default() -> Self {
        Self::new(TcpConfig::default())
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        for task in self.state.get_mut().tasks.drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl NetworkConnection for TcpConnection {
    fn peer_address(&self) -> u32 {
        self.state.lock().peer.map(|p| u32::from(*p.ip())).unwrap_or(0)
    }

    fn peer_port(&self) -> u16 {
        self.state.lock().peer.map(|p| p.port()).unwrap_or(0)
    }

    async fn connect(&self, address: u32, port: u16) -> Result<()> {
        {
            let state = self.state.lock();
            if state.stream.is_some() || state.outbound_tx.is_some() {
                bail!("already connected to {:?}", state.peer);
            }
        }

        let peer = SocketAddrV4::new(Ipv4Addr::from(address), port);
        let stream = match timeout(self.config.connect_timeout, TcpStream::connect(peer)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.diagnostics
                    .send(level::WARNING, format!("connect to {} failed: {}", peer, e));
                return Err(anyhow!("connect to {} failed: {}", peer, e));
            }
            Err(_) => {
                let limit = self.config.connect_timeout;
                self.diagnostics.send(
                    level::WARNING,
                    format!("connect to {} timed out after {:?}", peer, limit),
                );
                return Err(anyhow!("connect to {} timed out", peer));
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("[TCP] Could not disable Nagle for {}: {}", peer, e);
        }

        {
            let mut state = self.state.lock();
            state.peer = Some(peer);
            state.stream = Some(stream);
        }
        self.diagnostics.send(level::INFO, format!("connected to {}", peer));
        Ok(())
    }

    fn process(&self, on_data: DataReceivedHandler, on_broken: BrokenHandler) -> Result<()> {
        let runtime = Handle::try_current().map_err(|e| anyhow!("no tokio runtime: {}", e))?;

        let mut state = self.state.lock();
        let stream = state
            .stream
            .take()
            .ok_or_else(|| anyhow!("not connected, or already processing"))?;
        let (reader, writer) = stream.into_split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (abort_tx, abort_rx) = oneshot::channel();

        let read_task = runtime.spawn(read_loop(
            reader,
            self.config.read_buffer_size.max(1),
            abort_rx,
            on_data,
            on_broken,
            self.diagnostics.clone(),
        ));
        let write_task = runtime.spawn(write_loop(writer, outbound_rx, self.diagnostics.clone()));

        state.tasks.push(read_task);
        state.tasks.push(write_task);
        state.outbound_tx = Some(outbound_tx);
        state.abort_tx = Some(abort_tx);
        Ok(())
    }

    fn send(&self, data: Bytes) {
        let outbound_tx = self.state.lock().outbound_tx.clone();
        match outbound_tx {
            Some(tx) => {
                let len = data.len();
                if tx.send(Outbound::Data(data)).is_err() {
                    debug!("[TCP] Dropping {} bytes, writer has stopped", len);
                }
            }
            None => self.diagnostics.send(
                level::WARNING,
                format!("dropping {} bytes, connection is not open", data.len()),
            ),
        }
    }

    fn close(&self, graceful: bool) {
        let mut state = self.state.lock();
        // Closing before processing started just releases the socket.
        state.stream = None;
        let outbound_tx = state.outbound_tx.take();
        let abort_tx = if graceful { None } else { state.abort_tx.take() };
        drop(state);

        if graceful {
            if let Some(tx) = outbound_tx {
                let _ = tx.send(Outbound::Shutdown);
            }
        } else if let Some(abort) = abort_tx {
            let _ = abort.send(());
        }
    }

    fn subscribe_to_diagnostics(
        &self,
        handler: DiagnosticHandler,
        min_level: usize,
    ) -> Unsubscribe {
        self.diagnostics.subscribe(
            move |name: &str, level: usize, message: &str| handler(name, level, message),
            min_level,
        )
    }

    fn name(&self) -> &'static str {
        "TCP"
    }
}

/// Deliver received bytes until the peer closes, a read fails or an abrupt
/// close is requested, then report the break once.
async fn read_loop(
    mut reader: OwnedReadHalf,
    buffer_size: usize,
    mut abort_rx: oneshot::Receiver<()>,
    on_data: DataReceivedHandler,
    on_broken: BrokenHandler,
    diagnostics: DiagnosticsSender,
) {
    let mut read_buf = vec![0u8; buffer_size];

    let graceful = loop {
        tokio::select! {
            aborted = &mut abort_rx => {
                if aborted.is_err() {
                    // The connection itself is gone; nobody is left to notify.
                    debug!("[TCP] Connection released, reader stopping");
                    return;
                }
                diagnostics.send(level::INFO, "connection closed abruptly");
                break false;
            }

            result = reader.read(&mut read_buf) => {
                match result {
                    Ok(0) => {
                        diagnostics.send(level::INFO, "connection closed by peer");
                        break true;
                    }
                    Ok(n) => on_data(Bytes::copy_from_slice(&read_buf[..n])),
                    Err(e) => {
                        diagnostics.send(level::WARNING, format!("read error: {}", e));
                        break false;
                    }
                }
            }
        }
    };

    on_broken(graceful);
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    diagnostics: DiagnosticsSender,
) {
    while let Some(outbound) = outbound_rx.recv().await {
        match outbound {
            Outbound::Data(data) => {
                if let Err(e) = writer.write_all(&data).await {
                    diagnostics.send(level::WARNING, format!("write error: {}", e));
                    break;
                }
            }
            Outbound::Shutdown => {
                if let Err(e) = writer.shutdown().await {
                    diagnostics.send(level::WARNING, format!("shutdown error: {}", e));
                }
                break;
            }
        }
    }
}

/// Resolve `host` to the first usable IPv4 address
///
/// Returns `None` when the lookup fails or yields only IPv6 or unspecified
/// addresses.
pub async fn resolve_ipv4(host: &str) -> Option<u32> {
    let addrs = match lookup_host((host, 0)).await {
        Ok(addrs) => addrs,
        Err(e) => {
            debug!("[TCP] Lookup of '{}' failed: {}", host, e);
            return None;
        }
    };

    addrs
        .filter_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
        .find(|ip| !ip.is_unspecified())
        .map(u32::from)
}

/// Connection factory producing plain TCP connections
///
/// The scheme does not select a backend: every scheme gets a plain connection.
/// TLS schemes are only logged, since the bytes still travel in the clear.
pub fn tcp_connection_factory(config: TcpConfig) -> ConnectionFactory {
    Arc::new(
        move |scheme: &str, host: &str| -> Option<Box<dyn NetworkConnection>> {
            if TLS_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) {
                warn!("[TCP] Scheme '{}' for {} served without TLS", scheme, host);
            }
            Some(Box::new(TcpConnection::new(config.clone())))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (TcpConnection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let connection = TcpConnection::default();
        let (connect, accept) = tokio::join!(
            connection.connect(u32::from(Ipv4Addr::LOCALHOST), port),
            listener.accept()
        );
        connect.unwrap();
        (connection, accept.unwrap().0)
    }

    fn channel_handlers() -> (
        DataReceivedHandler,
        BrokenHandler,
        mpsc::UnboundedReceiver<Bytes>,
        mpsc::UnboundedReceiver<bool>,
    ) {
        let (data_tx, data_rx) = mpsc::unbounded_channel();
        let (broken_tx, broken_rx) = mpsc::unbounded_channel();
        let on_data: DataReceivedHandler = Arc::new(move |data: Bytes| {
            let _ = data_tx.send(data);
        });
        let on_broken: BrokenHandler = Arc::new(move |graceful: bool| {
            let _ = broken_tx.send(graceful);
        });
        (on_data, on_broken, data_rx, broken_rx)
    }

    #[test]
    fn test_default_config() {
        let config = TcpConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.read_buffer_size, 4096);
    }

    #[tokio::test]
    async fn test_resolve_literal() {
        assert_eq!(resolve_ipv4("127.0.0.1").await, Some(0x7F00_0001));
        assert_eq!(resolve_ipv4("0.0.0.0").await, None);
    }

    #[test]
    fn test_factory_ignores_scheme() {
        let factory = tcp_connection_factory(TcpConfig::default());
        for scheme in ["mqtt", "mqtts", "SSL", "tcp", ""] {
            let connection = factory(scheme, "broker.example").unwrap();
            assert_eq!(connection.name(), "TCP");
        }
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connection = TcpConnection::default();
        let result = connection.connect(u32::from(Ipv4Addr::LOCALHOST), port).await;
        assert!(result.is_err());
        assert_eq!(connection.peer_address(), 0);
    }

    #[tokio::test]
    async fn test_peer_identity_after_connect() {
        let (connection, server) = connected_pair().await;
        assert_eq!(connection.peer_address(), 0x7F00_0001);
        assert_eq!(connection.peer_port(), server.local_addr().unwrap().port());
    }

    #[tokio::test]
    async fn test_exchange_and_graceful_break() {
        let (connection, mut server) = connected_pair().await;
        let (on_data, on_broken, mut data_rx, mut broken_rx) = channel_handlers();
        connection.process(on_data, on_broken).unwrap();

        server.write_all(b"hello").await.unwrap();
        assert_eq!(data_rx.recv().await.unwrap(), Bytes::from_static(b"hello"));

        connection.send(Bytes::from_static(b"ping"));
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        drop(server);
        assert_eq!(broken_rx.recv().await, Some(true));
    }

    #[tokio::test]
    async fn test_graceful_close_flushes_then_shuts_down() {
        let (connection, mut server) = connected_pair().await;
        let (on_data, on_broken, _data_rx, _broken_rx) = channel_handlers();
        connection.process(on_data, on_broken).unwrap();

        connection.send(Bytes::from_static(b"bye"));
        connection.close(true);

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"bye");
    }

    #[tokio::test]
    async fn test_abrupt_close_reports_ungraceful() {
        let (connection, _server) = connected_pair().await;
        let (on_data, on_broken, _data_rx, mut broken_rx) = channel_handlers();
        connection.process(on_data, on_broken).unwrap();

        connection.close(false);
        assert_eq!(broken_rx.recv().await, Some(false));
    }

    #[tokio::test]
    async fn test_process_requires_connect() {
        let connection = TcpConnection::default();
        let (on_data, on_broken, _data_rx, _broken_rx) = channel_handlers();
        assert!(connection.process(on_data, on_broken).is_err());
    }
}
