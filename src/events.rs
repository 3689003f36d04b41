//! # Event Bus
//!
//! A small topic-keyed publish/subscribe bus, grounded on the original's
//! `nsts.events` module: subscribers register a callback against a topic
//! name, and senders publish a [`Notification`] carrying an optional sender
//! tag and a bag of extra values. Publishing to a topic with no subscribers
//! is a silent no-op, matching the original's behavior — event delivery is
//! diagnostic, never load-bearing for protocol correctness.
//!
//! A process-wide [`dispatcher`] singleton is exposed alongside the plain
//! [`Dispatcher`] type so call sites that want isolation (tests, mainly) can
//! build their own instance instead of sharing global state.

use crate::value::Value;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// One published event.
#[derive(Debug, Clone)]
pub struct Notification {
    pub event_name: String,
    pub sender: Option<String>,
    pub extra: BTreeMap<String, Value>,
}

type Callback = Box<dyn Fn(&Notification) + Send + Sync>;

/// A topic-keyed publish/subscribe bus.
#[derive(Default)]
pub struct Dispatcher {
    subscribers: Mutex<HashMap<String, Vec<Callback>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` to run whenever `event_name` is sent.
    pub fn connect(&self, event_name: impl Into<String>, callback: Callback) {
        self.subscribers
            .lock()
            .unwrap()
            .entry(event_name.into())
            .or_default()
            .push(callback);
    }

    /// Publish an event. A no-op if nothing is subscribed to `event_name`.
    pub fn send(
        &self,
        event_name: &str,
        sender: Option<String>,
        extra: BTreeMap<String, Value>,
    ) {
        let subscribers = self.subscribers.lock().unwrap();
        let Some(callbacks) = subscribers.get(event_name) else {
            return;
        };
        let notification = Notification {
            event_name: event_name.to_string(),
            sender,
            extra,
        };
        for cb in callbacks {
            cb(&notification);
        }
    }
}

static GLOBAL: OnceLock<Dispatcher> = OnceLock::new();

/// The process-wide dispatcher instance, lazily initialized on first use.
pub fn dispatcher() -> &'static Dispatcher {
    GLOBAL.get_or_init(Dispatcher::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn send_invokes_connected_callback() {
        let d = Dispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        d.connect("sample.event", Box::new(move |_n| {
            count2.fetch_add(1, Ordering::SeqCst);
        }));
        d.send("sample.event", None, BTreeMap::new());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn send_to_unknown_topic_is_a_no_op() {
        let d = Dispatcher::new();
        // Must not panic.
        d.send("nothing.listens.here", None, BTreeMap::new());
    }
}
