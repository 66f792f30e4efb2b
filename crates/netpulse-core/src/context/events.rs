//! Event bus owned by the plugin context.
//!
//! Events are named by host-defined strings and carry structured
//! [`Value`] payloads whose shape is a contract between the publishing
//! host subsystem and its subscribers; the bus itself treats them as
//! opaque.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

/// Well-known event names published by the host.
pub mod names {
    /// A processed ping result is available.
    pub const PING_RESULT: &str = "ping.result";

    /// An alert was raised by the monitoring engine.
    pub const ALERT_RAISED: &str = "alert.raised";

    /// A network scan finished.
    pub const SCAN_COMPLETE: &str = "scan.complete";
}

/// Callback invoked with the payload of each matching published event.
pub type EventCallback = Arc<dyn Fn(&Value) + Send + Sync>;

struct Subscription {
    id: u64,
    event: String,
    callback: EventCallback,
}

/// Publish/subscribe bus with snapshot-before-dispatch semantics.
///
/// Subscription ids are monotonic, host-wide unique, and never reused.
/// `publish` copies the matching callbacks out under the lock and then
/// invokes them with the lock released, so a callback may freely
/// subscribe, unsubscribe, or publish without deadlocking, and a
/// subscriber removed concurrently with a publish either runs to
/// completion or not at all.
pub struct EventBus {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            subscriptions: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe a callback to an event name. Returns the subscription id.
    pub fn subscribe<F>(&self, event: impl Into<String>, callback: F) -> u64
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscriptions.lock().push(Subscription {
            id,
            event: event.into(),
            callback: Arc::new(callback),
        });
        id
    }

    /// Remove a subscription. Returns `false` if the id is unknown.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut subs = self.subscriptions.lock();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() < before
    }

    /// Publish a payload to all subscribers of `event`.
    ///
    /// Callbacks run sequentially on the calling thread, in subscription
    /// order as of the snapshot. A panicking callback is logged and does
    /// not prevent delivery to the remaining subscribers. Returns the
    /// number of callbacks invoked.
    pub fn publish(&self, event: &str, payload: &Value) -> usize {
        let snapshot: Vec<(u64, EventCallback)> = {
            let subs = self.subscriptions.lock();
            subs.iter()
                .filter(|s| s.event == event)
                .map(|s| (s.id, Arc::clone(&s.callback)))
                .collect()
        };

        for (id, callback) in &snapshot {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(payload);
            }));
            if let Err(panic) = result {
                tracing::warn!(
                    target: "netpulse::plugin",
                    event,
                    subscription = id,
                    "event callback panicked: {}",
                    crate::plugin::panic_message(panic)
                );
            }
        }

        snapshot.len()
    }

    /// Number of active subscriptions across all event names.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_subscription_ids_are_monotonic() {
        let bus = EventBus::new();
        let a = bus.subscribe("x", |_| {});
        let b = bus.subscribe("y", |_| {});
        let c = bus.subscribe("x", |_| {});
        assert!(a < b && b < c);
    }

    #[test]
    fn test_publish_reaches_matching_subscribers_in_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            bus.subscribe("x", move |_| order.lock().push(tag));
        }
        bus.subscribe("y", |_| panic!("wrong event"));

        let delivered = bus.publish("x", &Value::Null);
        assert_eq!(delivered, 3);
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let id = bus.subscribe("x", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish("x", &Value::Null);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish("x", &Value::Null);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_callback_does_not_stop_dispatch() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        bus.subscribe("x", |_| panic!("subscriber fault"));
        let c = Arc::clone(&count);
        bus.subscribe("x", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.publish("x", &Value::Null), 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_during_dispatch_misses_current_publish() {
        let bus = Arc::new(EventBus::new());
        let late_calls = Arc::new(AtomicUsize::new(0));

        let bus2 = Arc::clone(&bus);
        let late = Arc::clone(&late_calls);
        bus.subscribe("x", move |_| {
            let late = Arc::clone(&late);
            bus2.subscribe("x", move |_| {
                late.fetch_add(1, Ordering::SeqCst);
            });
        });

        bus.publish("x", &Value::Null);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);

        bus.publish("x", &Value::Null);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }
}
