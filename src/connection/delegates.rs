//! Registry of the user's connection handlers

use bytes::Bytes;
use mqtt_transport_shared::{BrokenHandler, DataReceivedHandler};
use parking_lot::Mutex;

#[derive(Default)]
struct Slots {
    data_received: Option<DataReceivedHandler>,
    broken: Option<BrokenHandler>,
}

/// Holds the data and broken handlers behind one lock
///
/// Handlers are never called with the lock held, so a handler may replace
/// itself or its sibling without deadlocking.
#[derive(Default)]
pub(crate) struct ConnectionDelegates {
    slots: Mutex<Slots>,
}

impl ConnectionDelegates {
    pub fn set_data_received(&self, handler: Option<DataReceivedHandler>) {
        self.slots.lock().data_received = handler;
    }

    pub fn set_broken(&self, handler: Option<BrokenHandler>) {
        self.slots.lock().broken = handler;
    }

    /// Drop both handlers; later notifications are ignored
    pub fn clear(&self) {
        let mut slots = self.slots.lock();
        slots.data_received = None;
        slots.broken = None;
    }

    /// Pass received bytes to the current data handler, if any
    pub fn data_received(&self, data: Bytes) {
        let handler = self.slots.lock().data_received.clone();
        if let Some(handler) = handler {
            handler(data);
        }
    }

    /// Report a broken connection to the current broken handler, if any
    pub fn broken(&self, graceful: bool) {
        let handler = self.slots.lock().broken.clone();
        if let Some(handler) = handler {
            handler(graceful);
        }
    }
}
