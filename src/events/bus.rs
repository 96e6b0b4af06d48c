//! Synchronous in-process publish/subscribe bus.

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;

use super::traits::{Event, EventListener};

struct ListenerSlot {
    id: u64,
    active: AtomicBool,
    listener: Arc<dyn EventListener>,
}

struct BusInner {
    slots: Mutex<Vec<Arc<ListenerSlot>>>,
    next_id: AtomicU64,
    publish_count: AtomicU64,
}

/// Process-wide activity bus.
///
/// `publish` never awaits: listeners run on the caller's task, in
/// subscription order, against a snapshot of the listener list taken when
/// the event is published. Cloning the bus shares the same listeners.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                slots: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                publish_count: AtomicU64::new(0),
            }),
        }
    }

    /// Build an event stamped with the current time and dispatch it.
    ///
    /// Returns the number of listeners that handled it without error.
    pub fn publish(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        user_id: Option<&str>,
    ) -> usize {
        self.dispatch(&Event::new(event_type, payload, user_id))
    }

    /// Dispatch an already-built event to every active listener.
    pub fn dispatch(&self, event: &Event) -> usize {
        self.inner.publish_count.fetch_add(1, Ordering::Relaxed);

        // Listeners may (un)subscribe from inside a callback; never hold the lock while calling out.
        let snapshot: Vec<Arc<ListenerSlot>> = self.inner.slots.lock().clone();

        let mut delivered = 0;
        for slot in snapshot {
            if !slot.active.load(Ordering::Acquire) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| slot.listener.on_event(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(error)) => {
                    tracing::warn!(
                        listener_id = slot.id,
                        event_type = %event.event_type,
                        "Event listener failed: {error:#}"
                    );
                }
                Err(panic) => {
                    tracing::warn!(
                        listener_id = slot.id,
                        event_type = %event.event_type,
                        "Event listener panicked: {}",
                        panic_message(panic.as_ref())
                    );
                }
            }
        }
        delivered
    }

    /// Register a listener. Keep the returned handle to remove it later.
    pub fn subscribe<L>(&self, listener: L) -> Subscription
    where
        L: EventListener + 'static,
    {
        self.subscribe_arc(Arc::new(listener))
    }

    pub fn subscribe_arc(&self, listener: Arc<dyn EventListener>) -> Subscription {
        let slot = Arc::new(ListenerSlot {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            active: AtomicBool::new(true),
            listener,
        });
        self.inner.slots.lock().push(Arc::clone(&slot));
        Subscription {
            slot,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Bridge the bus to an async consumer through a bounded broadcast
    /// channel. A consumer that falls more than `capacity` events behind
    /// skips the events it missed.
    pub fn subscribe_channel(&self, capacity: usize) -> EventStream {
        let (tx, receiver) = broadcast::channel(capacity.max(1));
        let subscription = self.subscribe(move |event: &Event| -> anyhow::Result<()> {
            // No live receiver is not a delivery failure.
            let _ = tx.send(event.clone());
            Ok(())
        });
        EventStream {
            receiver,
            subscription,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.slots.lock().len()
    }

    /// Total number of events dispatched since the bus was created.
    pub fn publish_count(&self) -> u64 {
        self.inner.publish_count.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Capability to remove one listener from the bus.
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
pub struct Subscription {
    slot: Arc<ListenerSlot>,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Remove the listener. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        if !self.slot.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            bus.slots.lock().retain(|s| s.id != self.slot.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.slot.active.load(Ordering::Acquire)
    }
}

/// Async view of the bus. Unsubscribes when dropped.
pub struct EventStream {
    receiver: broadcast::Receiver<Event>,
    subscription: Subscription,
}

impl EventStream {
    /// Next event, or `None` once the bus is gone. Lagged events are skipped.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use serde_json::json;

    fn recorder() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn publish_with_no_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.publish("x", json!({"n": 1}), None), 0);
        assert_eq!(bus.publish_count(), 1);
    }

    #[test]
    fn delivers_in_subscription_order_even_when_first_fails() {
        let bus = EventBus::new();
        let seen = recorder();

        let first = Arc::clone(&seen);
        let _a = bus.subscribe(move |event: &Event| -> Result<()> {
            first.lock().push(format!("first:{}", event.payload["n"]));
            bail!("listener exploded")
        });
        let second = Arc::clone(&seen);
        let _b = bus.subscribe(move |event: &Event| -> Result<()> {
            second.lock().push(format!("second:{}", event.payload["n"]));
            Ok(())
        });

        let delivered = bus.publish("x", json!({"n": 1}), None);

        assert_eq!(delivered, 1);
        assert_eq!(*seen.lock(), vec!["first:1", "second:1"]);
    }

    #[test]
    fn panicking_listener_is_isolated() {
        let bus = EventBus::new();
        let seen = recorder();

        let _a = bus.subscribe(|_: &Event| -> Result<()> { panic!("boom") });
        let after = Arc::clone(&seen);
        let _b = bus.subscribe(move |event: &Event| -> Result<()> {
            after.lock().push(event.event_type.clone());
            Ok(())
        });

        assert_eq!(bus.publish("x", json!(null), Some("u1")), 1);
        assert_eq!(*seen.lock(), vec!["x"]);
    }

    #[test]
    fn unsubscribe_stops_delivery_and_is_idempotent() {
        let bus = EventBus::new();
        let seen = recorder();
        let sink = Arc::clone(&seen);
        let sub = bus.subscribe(move |event: &Event| -> Result<()> {
            sink.lock().push(event.event_type.clone());
            Ok(())
        });

        bus.publish("before", json!(null), None);
        sub.unsubscribe();
        sub.unsubscribe();
        bus.publish("after", json!(null), None);

        assert!(!sub.is_active());
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(*seen.lock(), vec!["before"]);
    }

    #[test]
    fn unsubscribe_removes_only_that_listener() {
        let bus = EventBus::new();
        let sub_a = bus.subscribe(|_: &Event| -> Result<()> { Ok(()) });
        let _sub_b = bus.subscribe(|_: &Event| -> Result<()> { Ok(()) });

        sub_a.unsubscribe();
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.publish("x", json!(null), None), 1);
    }

    #[test]
    fn listener_removed_during_dispatch_does_not_receive_event() {
        let bus = EventBus::new();
        let seen = recorder();

        let victim_slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let remover = Arc::clone(&victim_slot);
        let _first = bus.subscribe(move |_: &Event| -> Result<()> {
            if let Some(sub) = remover.lock().as_ref() {
                sub.unsubscribe();
            }
            Ok(())
        });
        let sink = Arc::clone(&seen);
        let victim = bus.subscribe(move |event: &Event| -> Result<()> {
            sink.lock().push(event.event_type.clone());
            Ok(())
        });
        *victim_slot.lock() = Some(victim);

        assert_eq!(bus.publish("x", json!(null), None), 1);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn listener_added_during_dispatch_waits_for_next_event() {
        let bus = EventBus::new();
        let seen = recorder();

        let bus_handle = bus.clone();
        let sink = Arc::clone(&seen);
        let added: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));
        let added_handle = Arc::clone(&added);
        let _adder = bus.subscribe(move |_: &Event| -> Result<()> {
            let mut added = added_handle.lock();
            if added.is_empty() {
                let sink = Arc::clone(&sink);
                added.push(bus_handle.subscribe(move |event: &Event| -> Result<()> {
                    sink.lock().push(event.event_type.clone());
                    Ok(())
                }));
            }
            Ok(())
        });

        bus.publish("first", json!(null), None);
        bus.publish("second", json!(null), None);

        assert_eq!(*seen.lock(), vec!["second"]);
    }

    #[test]
    fn unsubscribe_after_bus_dropped_is_harmless() {
        let bus = EventBus::new();
        let sub = bus.subscribe(|_: &Event| -> Result<()> { Ok(()) });
        drop(bus);
        sub.unsubscribe();
        assert!(!sub.is_active());
    }

    #[tokio::test]
    async fn channel_bridge_receives_events_and_unsubscribes_on_drop() {
        let bus = EventBus::new();
        let mut stream = bus.subscribe_channel(16);
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish("fulfillment", json!({"intent": "dashboard"}), Some("u1"));

        let event = stream.recv().await.unwrap();
        assert_eq!(event.event_type, "fulfillment");
        assert_eq!(event.user_id.as_deref(), Some("u1"));

        drop(stream);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
