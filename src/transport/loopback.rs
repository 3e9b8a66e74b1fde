//! In-memory raw connection driven from a handle instead of a socket
//!
//! Useful wherever a real network is unwanted: the handle plays the peer and
//! the I/O thread, delivering data and breaks, scripting failures, and
//! inspecting what the connection was asked to do.

use crate::transport::traits::{ConnectionFactory, NetworkConnection};
use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use mqtt_transport_shared::{
    BrokenHandler, DataReceivedHandler, DiagnosticHandler, DiagnosticsSender, Unsubscribe,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

#[derive(Default)]
struct State {
    hosts: HashMap<String, u32>,
    peer: Option<(u32, u16)>,
    fail_connect: bool,
    fail_process: bool,
    connect_attempts: usize,
    on_data: Option<DataReceivedHandler>,
    on_broken: Option<BrokenHandler>,
    sent: Vec<Bytes>,
    closed: Option<bool>,
    released: bool,
}

struct Shared {
    diagnostics: DiagnosticsSender,
    state: Mutex<State>,
}

/// Raw connection whose peer is a [`LoopbackHandle`]
pub struct LoopbackConnection {
    shared: Arc<Shared>,
}

/// The far side of a [`LoopbackConnection`]
#[derive(Clone)]
pub struct LoopbackHandle {
    shared: Arc<Shared>,
}

impl LoopbackConnection {
    /// Create a connection and the handle that drives it
    pub fn pair() -> (Self, LoopbackHandle) {
        let shared = Arc::new(Shared {
            diagnostics: DiagnosticsSender::new("LoopbackConnection"),
            state: Mutex::new(State::default()),
        });
        (
            Self {
                shared: shared.clone(),
            },
            LoopbackHandle { shared },
        )
    }
}

impl Drop for LoopbackConnection {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.released = true;
        state.on_data = None;
        state.on_broken = None;
    }
}

#[async_trait]
impl NetworkConnection for LoopbackConnection {
    fn peer_address(&self) -> u32 {
        self.shared.state.lock().peer.map(|(address, _)| address).unwrap_or(0)
    }

    fn peer_port(&self) -> u16 {
        self.shared.state.lock().peer.map(|(_, port)| port).unwrap_or(0)
    }

    async fn resolve_host(&self, host: &str) -> Option<u32> {
        if let Some(address) = self.shared.state.lock().hosts.get(host) {
            return Some(*address);
        }
        host.parse::<Ipv4Addr>()
            .ok()
            .filter(|ip| !ip.is_unspecified())
            .map(u32::from)
    }

    async fn connect(&self, address: u32, port: u16) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.connect_attempts += 1;
        if state.fail_connect {
            bail!("loopback connect refused");
        }
        state.peer = Some((address, port));
        Ok(())
    }

    fn process(&self, on_data: DataReceivedHandler, on_broken: BrokenHandler) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.fail_process {
            bail!("loopback processing refused");
        }
        if state.peer.is_none() {
            bail!("loopback not connected");
        }
        state.on_data = Some(on_data);
        state.on_broken = Some(on_broken);
        Ok(())
    }

    fn send(&self, data: Bytes) {
        self.shared.state.lock().sent.push(data);
    }

    fn close(&self, graceful: bool) {
        self.shared.state.lock().closed = Some(graceful);
    }

    fn subscribe_to_diagnostics(
        &self,
        handler: DiagnosticHandler,
        min_level: usize,
    ) -> Unsubscribe {
        self.shared.diagnostics.subscribe(
            move |name: &str, level: usize, message: &str| handler(name, level, message),
            min_level,
        )
    }

    fn name(&self) -> &'static str {
        "Loopback"
    }
}

impl LoopbackHandle {
    /// Make `host` resolve to `address`
    pub fn map_host(&self, host: impl Into<String>, address: u32) {
        self.shared.state.lock().hosts.insert(host.into(), address);
    }

    /// Make every later `connect` fail
    pub fn fail_connect(&self) {
        self.shared.state.lock().fail_connect = true;
    }

    /// Make every later `process` fail
    pub fn fail_process(&self) {
        self.shared.state.lock().fail_process = true;
    }

    /// Deliver bytes as if received from the network
    pub fn deliver(&self, data: impl Into<Bytes>) {
        let on_data = self.shared.state.lock().on_data.clone();
        if let Some(on_data) = on_data {
            on_data(data.into());
        }
    }

    /// Report a broken connection as the I/O side would
    pub fn break_connection(&self, graceful: bool) {
        let on_broken = self.shared.state.lock().on_broken.clone();
        if let Some(on_broken) = on_broken {
            on_broken(graceful);
        }
    }

    /// Publish a diagnostic from the connection
    pub fn emit_diagnostic(&self, level: usize, message: impl AsRef<str>) {
        self.shared.diagnostics.send(level, message);
    }

    /// Everything sent through the connection so far
    pub fn sent(&self) -> Vec<Bytes> {
        self.shared.state.lock().sent.clone()
    }

    /// `Some(graceful)` once the connection has been closed
    pub fn closed(&self) -> Option<bool> {
        self.shared.state.lock().closed
    }

    pub fn connect_attempts(&self) -> usize {
        self.shared.state.lock().connect_attempts
    }

    /// Whether processing has started and not been released
    pub fn is_processing(&self) -> bool {
        self.shared.state.lock().on_data.is_some()
    }

    /// Whether the connection object has been dropped
    pub fn is_released(&self) -> bool {
        self.shared.state.lock().released
    }
}

/// A factory that hands out one prepared loopback connection
///
/// Later calls yield nothing.
pub fn loopback_factory() -> (ConnectionFactory, LoopbackHandle) {
    let (connection, handle) = LoopbackConnection::pair();
    let slot = Mutex::new(Some(connection));
    let factory: ConnectionFactory = Arc::new(
        move |_scheme: &str, _host: &str| -> Option<Box<dyn NetworkConnection>> {
            slot.lock()
                .take()
                .map(|connection| Box::new(connection) as Box<dyn NetworkConnection>)
        },
    );
    (factory, handle)
}
