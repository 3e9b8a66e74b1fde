#![allow(dead_code)]

use bytes::Bytes;
use mqtt_network_transport::{BrokenHandler, DataReceivedHandler, NetworkTransport};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub type Diagnostics = Arc<Mutex<Vec<(String, usize, String)>>>;

/// Route `tracing` output to the test harness; safe to call from every test
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(EnvFilter::from_default_env())
        .try_init();
}

/// Collect every diagnostic the transport publishes at or above `min_level`
pub fn record_diagnostics(transport: &NetworkTransport, min_level: usize) -> Diagnostics {
    let seen: Diagnostics = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    transport.subscribe_to_diagnostics(
        move |name: &str, level: usize, message: &str| {
            sink.lock().push((name.to_string(), level, message.to_string()));
        },
        min_level,
    );
    seen
}

/// Handlers that forward every event into channels
pub fn channel_handlers() -> (
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

/// Handlers that record every event in memory
pub fn recording_handlers() -> (
    DataReceivedHandler,
    BrokenHandler,
    Arc<Mutex<Vec<Bytes>>>,
    Arc<Mutex<Vec<bool>>>,
) {
    let data = Arc::new(Mutex::new(Vec::new()));
    let breaks = Arc::new(Mutex::new(Vec::new()));
    let data_sink = data.clone();
    let breaks_sink = breaks.clone();
    let on_data: DataReceivedHandler = Arc::new(move |bytes: Bytes| data_sink.lock().push(bytes));
    let on_broken: BrokenHandler =
        Arc::new(move |graceful: bool| breaks_sink.lock().push(graceful));
    (on_data, on_broken, data, breaks)
}
