//! Leveled publish/subscribe channel for diagnostic messages
//!
//! A `DiagnosticsSender` has a name and a list of subscribers. Each published
//! message is delivered to every subscriber whose minimum level it meets, and
//! is mirrored into `tracing` so that nothing is lost when no one subscribes.

use crate::level;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Callback receiving `(sender_name, level, message)`
pub type DiagnosticHandler = Arc<dyn Fn(&str, usize, &str) + Send + Sync>;

struct Subscriber {
    id: u64,
    min_level: usize,
    handler: DiagnosticHandler,
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<Subscriber>,
}

struct Inner {
    name: String,
    subscribers: Mutex<Subscribers>,
}

/// Named publisher of diagnostic messages
///
/// Cloning is cheap; clones publish to the same subscriber list.
#[derive(Clone)]
pub struct DiagnosticsSender {
    inner: Arc<Inner>,
}

impl DiagnosticsSender {
    /// Create a sender that tags its messages with `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                subscribers: Mutex::new(Subscribers::default()),
            }),
        }
    }

    /// Name attached to every message from this sender
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Subscribe to messages at or above `min_level`
    ///
    /// The returned handle ends the subscription when `unsubscribe` is called.
    /// Dropping the handle leaves the subscription in place.
    pub fn subscribe<F>(&self, handler: F, min_level: usize) -> Unsubscribe
    where
        F: Fn(&str, usize, &str) + Send + Sync + 'static,
    {
        let mut subscribers = self.inner.subscribers.lock();
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers.entries.push(Subscriber {
            id,
            min_level,
            handler: Arc::new(handler),
        });

        Unsubscribe {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().entries.len()
    }

    /// Publish a message at the given level
    ///
    /// Handlers run on the caller's thread, after the subscriber list lock is
    /// released, so a handler may subscribe or unsubscribe.
    pub fn send(&self, level: usize, message: impl AsRef<str>) {
        let message = message.as_ref();
        trace_message(&self.inner.name, level, message);

        let handlers: Vec<DiagnosticHandler> = self
            .inner
            .subscribers
            .lock()
            .entries
            .iter()
            .filter(|s| level >= s.min_level)
            .map(|s| s.handler.clone())
            .collect();

        for handler in handlers {
            handler(&self.inner.name, level, message);
        }
    }
}

impl std::fmt::Debug for DiagnosticsSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticsSender")
            .field("name", &self.inner.name)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Handle that ends one diagnostics subscription
pub struct Unsubscribe {
    inner: Weak<Inner>,
    id: u64,
}

impl Unsubscribe {
    /// Stop delivering messages to this subscriber
    ///
    /// Other subscribers are unaffected. Does nothing if the sender is gone.
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.subscribers.lock().entries.retain(|s| s.id != self.id);
        }
    }
}

fn trace_message(name: &str, severity: usize, message: &str) {
    if severity >= level::ERROR {
        tracing::error!(sender = name, level = severity, "{}", message);
    } else if severity >= level::WARNING {
        tracing::warn!(sender = name, level = severity, "{}", message);
    } else if severity >= level::INFO {
        tracing::info!(sender = name, level = severity, "{}", message);
    } else {
        tracing::debug!(sender = name, level = severity, "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Seen = Arc<Mutex<Vec<(String, usize, String)>>>;

    fn collector() -> (Seen, impl Fn(&str, usize, &str) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = move |name: &str, level: usize, message: &str| {
            sink.lock().push((name.to_string(), level, message.to_string()));
        };
        (seen, handler)
    }

    #[test]
    fn test_delivers_name_level_and_message() {
        let sender = DiagnosticsSender::new("Widget");
        let (seen, handler) = collector();
        let _sub = sender.subscribe(handler, level::DEBUG);

        sender.send(level::WARNING, "disk nearly full");

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], ("Widget".into(), level::WARNING, "disk nearly full".into()));
    }

    #[test]
    fn test_min_level_filters() {
        let sender = DiagnosticsSender::new("Widget");
        let (seen, handler) = collector();
        let _sub = sender.subscribe(handler, level::WARNING);

        sender.send(level::INFO, "ignored");
        sender.send(level::WARNING, "kept");
        sender.send(level::ERROR, "also kept");

        let levels: Vec<usize> = seen.lock().iter().map(|(_, l, _)| *l).collect();
        assert_eq!(levels, vec![level::WARNING, level::ERROR]);
    }

    #[test]
    fn test_unsubscribe_leaves_other_subscribers() {
        let sender = DiagnosticsSender::new("Widget");
        let (first_seen, first) = collector();
        let (second_seen, second) = collector();
        let first_sub = sender.subscribe(first, 0);
        let _second_sub = sender.subscribe(second, 0);

        sender.send(level::INFO, "one");
        first_sub.unsubscribe();
        sender.send(level::INFO, "two");

        assert_eq!(first_seen.lock().len(), 1);
        assert_eq!(second_seen.lock().len(), 2);
        assert_eq!(sender.subscriber_count(), 1);
    }

    #[test]
    fn test_clones_share_subscribers() {
        let sender = DiagnosticsSender::new("Widget");
        let (seen, handler) = collector();
        let _sub = sender.subscribe(handler, 0);

        sender.clone().send(level::INFO, "from a clone");

        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let sender = DiagnosticsSender::new("Widget");
        let slot: Arc<Mutex<Option<Unsubscribe>>> = Arc::new(Mutex::new(None));
        let slot_in_handler = slot.clone();
        let sub = sender.subscribe(
            move |_, _, _| {
                if let Some(sub) = slot_in_handler.lock().take() {
                    sub.unsubscribe();
                }
            },
            0,
        );
        *slot.lock() = Some(sub);

        sender.send(level::INFO, "first");
        sender.send(level::INFO, "second");

        assert_eq!(sender.subscriber_count(), 0);
    }

    #[test]
    fn test_unsubscribe_after_sender_dropped() {
        let sender = DiagnosticsSender::new("Widget");
        let sub = sender.subscribe(|_, _, _| {}, 0);
        drop(sender);
        sub.unsubscribe();
    }
}
