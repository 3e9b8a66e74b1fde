//! Client network transport: opens connections for the MQTT engine

use crate::connection::ConnectionAdapter;
use crate::transport::{tcp_connection_factory, ConnectionFactory, TcpConfig};
use async_trait::async_trait;
use bytes::Bytes;
use mqtt_transport_shared::{
    level, BrokenHandler, ClientTransportLayer, Connection, DataReceivedHandler,
    DiagnosticsSender, Unsubscribe,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Why `connect` produced no connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("unable to create connection to '{peer}'")]
    Factory { peer: String },

    #[error("no address for '{host}'")]
    Resolution { host: String },

    #[error("unable to connect to '{peer}'")]
    Connect { peer: String, reason: String },

    #[error("unable to start processing messages for '{peer}'")]
    ProcessStart { peer: String, reason: String },
}

/// Configuration for the client transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Name our diagnostics are published under
    pub sender_name: String,
    /// Lowest level of raw connection diagnostics relayed to our subscribers
    pub relay_min_level: usize,
    /// Settings for connections made by the default factory
    pub tcp: TcpConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            sender_name: "MqttClientNetworkTransport".into(),
            relay_min_level: level::INFO,
            tcp: TcpConfig::default(),
        }
    }
}

/// Opens raw connections and adapts them for the MQTT engine
pub struct NetworkTransport {
    config: TransportConfig,
    diagnostics: DiagnosticsSender,
    connection_factory: ConnectionFactory,
}

impl NetworkTransport {
    /// Create a transport making plain TCP connections
    pub fn new(config: TransportConfig) -> Self {
        let connection_factory = tcp_connection_factory(config.tcp.clone());
        Self {
            diagnostics: DiagnosticsSender::new(config.sender_name.clone()),
            connection_factory,
            config,
        }
    }

    /// Use `factory` instead of the default TCP factory
    pub fn with_connection_factory(mut self, factory: ConnectionFactory) -> Self {
        self.connection_factory = factory;
        self
    }

    /// Replace the factory used by later `connect` calls
    pub fn set_connection_factory(&mut self, factory: ConnectionFactory) {
        self.connection_factory = factory;
    }

    /// Configuration this transport was built with
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Subscribe to diagnostics from this transport and its connections
    pub fn subscribe_to_diagnostics<F>(&self, handler: F, min_level: usize) -> Unsubscribe
    where
        F: Fn(&str, usize, &str) + Send + Sync + 'static,
    {
        self.diagnostics.subscribe(handler, min_level)
    }

    /// Open a connection to `host:port` and start delivering its events
    ///
    /// The handlers are in place before the first notification can arrive.
    /// Each failure is published as an error diagnostic and ends the attempt;
    /// nothing is retried.
    pub async fn connect(
        &self,
        scheme: &str,
        host: &str,
        port: u16,
        on_data: DataReceivedHandler,
        on_broken: BrokenHandler,
    ) -> Result<ConnectionAdapter, ConnectError> {
        let peer = format!("{}:{}", host, port);
        debug!("[TRANSPORT] Connecting to {} ({})", peer, scheme);

        let raw = (self.connection_factory)(scheme, host)
            .ok_or_else(|| self.report(ConnectError::Factory { peer: peer.clone() }))?;
        let adapter = ConnectionAdapter::new(raw);

        // Relay the raw connection's diagnostics under our name, tagged with
        // the peer. The subscription lasts as long as the raw connection.
        let relay = self.diagnostics.clone();
        let prefix = peer.clone();
        adapter.raw().subscribe_to_diagnostics(
            Arc::new(move |_sender: &str, level: usize, message: &str| {
                relay.send(level, format!("{}: {}", prefix, message));
            }),
            self.config.relay_min_level,
        );

        let address = adapter.raw().resolve_host(host).await.ok_or_else(|| {
            self.report(ConnectError::Resolution {
                host: host.to_string(),
            })
        })?;

        if let Err(e) = adapter.raw().connect(address, port).await {
            return Err(self.report(ConnectError::Connect {
                peer,
                reason: e.to_string(),
            }));
        }

        let delegates = adapter.delegates();
        delegates.set_data_received(Some(on_data));
        delegates.set_broken(Some(on_broken));

        let data_delegates = Arc::clone(delegates);
        let broken_delegates = Arc::clone(delegates);
        if let Err(e) = adapter.raw().process(
            Arc::new(move |data: Bytes| data_delegates.data_received(data)),
            Arc::new(move |graceful: bool| broken_delegates.broken(graceful)),
        ) {
            return Err(self.report(ConnectError::ProcessStart {
                peer,
                reason: e.to_string(),
            }));
        }

        info!(
            "[TRANSPORT] Connected to {} via {}",
            adapter.peer_id(),
            adapter.raw().name()
        );
        Ok(adapter)
    }

    fn report(&self, error: ConnectError) -> ConnectError {
        match &error {
            ConnectError::Connect { reason, .. } | ConnectError::ProcessStart { reason, .. } => {
                debug!("[TRANSPORT] {}: {}", error, reason);
            }
            _ => {}
        }
        self.diagnostics.send(level::ERROR, error.to_string());
        error
    }
}

impl Default for NetworkTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

#[async_trait]
impl ClientTransportLayer for NetworkTransport {
    type Error = ConnectError;

    async fn connect(
        &self,
        scheme: &str,
        host: &str,
        port: u16,
        on_data: DataReceivedHandler,
        on_broken: BrokenHandler,
    ) -> Result<Box<dyn Connection>, ConnectError> {
        let adapter =
            NetworkTransport::connect(self, scheme, host, port, on_data, on_broken).await?;
        Ok(Box::new(adapter))
    }
}
