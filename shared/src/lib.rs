//! MQTT Transport Shared Contracts
//!
//! This crate provides the contracts an MQTT protocol engine expects from its
//! transport layer, and the diagnostics channel used to report on it.

pub mod connection;
pub mod diagnostics;

// Re-export commonly used types at crate root
pub use connection::{BrokenHandler, ClientTransportLayer, Connection, DataReceivedHandler};
pub use diagnostics::{DiagnosticHandler, DiagnosticsSender, Unsubscribe};

/// Diagnostic severity levels
///
/// Larger values are more severe. Subscribers receive every message whose
/// level is at least the minimum they subscribed with.
pub mod level {
    /// Chatty internals, off for every subscriber with a non-zero threshold
    pub const DEBUG: usize = 0;

    /// Normal operational messages
    pub const INFO: usize = 1;

    /// Something unexpected that the component recovered from
    pub const WARNING: usize = 5;

    /// An operation failed
    pub const ERROR: usize = 10;
}
