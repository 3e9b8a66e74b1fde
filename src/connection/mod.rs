//! Adapting raw connections to the MQTT engine's connection contract
//!
//! This module handles:
//! - Thread-safe storage of the user's data and broken handlers
//! - Peer identity formatting
//! - Forwarding sends and closes to the raw connection

mod adapter;
mod delegates;

pub use adapter::{format_peer_id, ConnectionAdapter};
pub(crate) use delegates::ConnectionDelegates;
