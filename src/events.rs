// Handlers are compared by identity. Dispatch runs on a snapshot of the
// listener list.

use crate::lock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    RawValues,
    NormalizedRawValues,
    Values,
    NormalizedValues,
}

/// Every value event carries one number per channel, in channel order.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Connected,
    Disconnected,
    RawValues { values: Vec<f64> },
    NormalizedRawValues { values: Vec<f64> },
    Values { values: Vec<f64> },
    NormalizedValues { values: Vec<f64> },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Connected => EventKind::Connected,
            Event::Disconnected => EventKind::Disconnected,
            Event::RawValues { .. } => EventKind::RawValues,
            Event::NormalizedRawValues { .. } => EventKind::NormalizedRawValues,
            Event::Values { .. } => EventKind::Values,
            Event::NormalizedValues { .. } => EventKind::NormalizedValues,
        }
    }

    pub fn values(&self) -> Option<&[f64]> {
        match self {
            Event::Connected | Event::Disconnected => None,
            Event::RawValues { values }
            | Event::NormalizedRawValues { values }
            | Event::Values { values }
            | Event::NormalizedValues { values } => Some(values),
        }
    }
}

#[derive(Clone)]
pub struct Handler(Arc<dyn Fn(&Event) + Send + Sync>);

impl Handler {
    pub fn new(f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    fn is(&self, other: &Handler) -> bool {
        // Compare data pointers only; vtable pointers are not unique.
        Arc::as_ptr(&self.0) as *const () == Arc::as_ptr(&other.0) as *const ()
    }

    fn call(&self, event: &Event) {
        (self.0)(event)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

#[derive(Clone)]
struct Listener {
    handler: Handler,
    // Set for one-shot listeners; flips on the first delivery.
    fired: Option<Arc<AtomicBool>>,
}

#[derive(Clone, Default)]
pub struct EventHub {
    listeners: Arc<Mutex<HashMap<EventKind, Vec<Listener>>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registering the same handler twice for one kind is a no-op.
    pub fn subscribe(&self, kind: EventKind, handler: &Handler) {
        self.register(kind, handler, None);
    }

    /// Like [`subscribe`](Self::subscribe), but the handler is removed
    /// right before its first delivery. A handler already registered for
    /// `kind` keeps its existing registration, plain or one-shot.
    pub fn subscribe_once(&self, kind: EventKind, handler: &Handler) {
        self.register(kind, handler, Some(Arc::new(AtomicBool::new(false))));
    }

    fn register(&self, kind: EventKind, handler: &Handler, fired: Option<Arc<AtomicBool>>) {
        let mut listeners = lock(&self.listeners);
        let list = listeners.entry(kind).or_default();
        if !list.iter().any(|l| l.handler.is(handler)) {
            list.push(Listener {
                handler: handler.clone(),
                fired,
            });
        }
    }

    pub fn unsubscribe(&self, kind: EventKind, handler: &Handler) {
        let mut listeners = lock(&self.listeners);
        if let Some(list) = listeners.get_mut(&kind) {
            list.retain(|l| !l.handler.is(handler));
        }
    }

    pub fn has_subscriber(&self, kind: EventKind, handler: &Handler) -> bool {
        lock(&self.listeners)
            .get(&kind)
            .is_some_and(|list| list.iter().any(|l| l.handler.is(handler)))
    }

    pub fn publish(&self, event: &Event) {
        let kind = event.kind();
        let snapshot = match lock(&self.listeners).get(&kind) {
            Some(list) if !list.is_empty() => list.clone(),
            _ => return,
        };

        for listener in snapshot {
            if let Some(fired) = &listener.fired {
                if fired.swap(true, Ordering::SeqCst) {
                    continue;
                }
                self.unsubscribe(kind, &listener.handler);
            }
            listener.handler.call(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Handler) {
        let count = Arc::new(AtomicUsize::new(0));
        let clone = Arc::clone(&count);
        let handler = Handler::new(move |_| {
            clone.fetch_add(1, Ordering::SeqCst);
        });
        (count, handler)
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let hub = EventHub::new();
        hub.publish(&Event::Connected);
        let (count, handler) = counter();
        hub.subscribe(EventKind::Disconnected, &handler);
        hub.publish(&Event::Connected);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn duplicate_subscription_is_ignored() {
        let hub = EventHub::new();
        let (count, handler) = counter();
        hub.subscribe(EventKind::Connected, &handler);
        hub.subscribe(EventKind::Connected, &handler.clone());
        hub.publish(&Event::Connected);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn distinct_closures_are_distinct_handlers() {
        let hub = EventHub::new();
        let (first_count, first) = counter();
        let (second_count, second) = counter();
        hub.subscribe(EventKind::Connected, &first);
        hub.subscribe(EventKind::Connected, &second);
        hub.unsubscribe(EventKind::Connected, &first);
        hub.publish(&Event::Connected);
        assert_eq!(first_count.load(Ordering::SeqCst), 0);
        assert_eq!(second_count.load(Ordering::SeqCst), 1);
        assert!(!hub.has_subscriber(EventKind::Connected, &first));
        assert!(hub.has_subscriber(EventKind::Connected, &second));
    }

    #[test]
    fn handlers_run_in_subscription_order() {
        let hub = EventHub::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for id in 0..3 {
            let order = Arc::clone(&order);
            hub.subscribe(
                EventKind::Values,
                &Handler::new(move |_| order.lock().unwrap().push(id)),
            );
        }
        hub.publish(&Event::Values { values: vec![1.0] });
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn once_handler_fires_exactly_once() {
        let hub = EventHub::new();
        let (count, handler) = counter();
        hub.subscribe_once(EventKind::Disconnected, &handler);
        assert!(hub.has_subscriber(EventKind::Disconnected, &handler));
        hub.publish(&Event::Disconnected);
        hub.publish(&Event::Disconnected);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!hub.has_subscriber(EventKind::Disconnected, &handler));
    }

    #[test]
    fn once_handler_survives_reentrant_publish() {
        let hub = EventHub::new();
        let (count, once) = counter();
        let inner = hub.clone();
        let republish = Handler::new(move |event| {
            if let Event::RawValues { values } = event {
                if values[0] == 0.0 {
                    inner.publish(&Event::RawValues { values: vec![1.0] });
                }
            }
        });
        hub.subscribe(EventKind::RawValues, &republish);
        hub.subscribe_once(EventKind::RawValues, &once);
        hub.publish(&Event::RawValues { values: vec![0.0] });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_during_dispatch_keeps_snapshot() {
        let hub = EventHub::new();
        let (count, second) = counter();
        let inner = hub.clone();
        let victim = second.clone();
        let first = Handler::new(move |_| inner.unsubscribe(EventKind::Connected, &victim));
        hub.subscribe(EventKind::Connected, &first);
        hub.subscribe(EventKind::Connected, &second);

        hub.publish(&Event::Connected);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        hub.publish(&Event::Connected);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn event_payloads() {
        let event = Event::NormalizedValues {
            values: vec![0.0, 0.5],
        };
        assert_eq!(event.kind(), EventKind::NormalizedValues);
        assert_eq!(event.values(), Some(&[0.0, 0.5][..]));
        assert_eq!(Event::Connected.values(), None);
    }

    #[test]
    fn once_after_plain_subscription_keeps_plain() {
        let hub = EventHub::new();
        let (count, handler) = counter();
        hub.subscribe(EventKind::Connected, &handler);
        hub.subscribe_once(EventKind::Connected, &handler);
        hub.publish(&Event::Connected);
        hub.publish(&Event::Connected);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(hub.has_subscriber(EventKind::Connected, &handler));
    }
}
