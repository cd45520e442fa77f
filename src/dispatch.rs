//! Ordered subscriber fan-out with explicit disposers.
//!
//! Subscribers are kept in registration order. Delivery iterates over a
//! snapshot taken when the emission starts, so subscribing or disposing
//! from inside a handler only affects later emissions. A handler that
//! returns an error or panics is logged and skipped; later subscribers still
//! receive the value.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, Weak},
};

use tracing::warn;

use crate::sync::lock;

/// Error type returned by subscriber callbacks.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type Handler<T> = Arc<dyn Fn(&T) -> Result<(), HandlerError> + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    subscribers: Vec<(u64, Handler<T>)>,
}

/// Broadcasts values of type `T` to registered subscribers.
pub struct EventDispatcher<T> {
    name: &'static str,
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T> EventDispatcher<T> {
    /// Create an empty dispatcher; `name` labels its log output.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Register `handler` after all existing subscribers.
    pub fn subscribe<F>(&self, handler: F) -> Disposer
    where
        F: Fn(&T) -> Result<(), HandlerError> + Send + Sync + 'static,
        T: 'static,
    {
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.push((id, Arc::new(handler)));
        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Disposer {
            remove: Some(Box::new(move || {
                if let Some(registry) = weak.upgrade() {
                    lock(&registry).subscribers.retain(|(sid, _)| *sid != id);
                }
            })),
        }
    }

    /// Deliver `value` to every subscriber registered when the call starts.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Handler<T>> = lock(&self.registry)
            .subscribers
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(value))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => warn!(dispatcher = self.name, %error, "subscriber failed"),
                Err(_) => warn!(dispatcher = self.name, "subscriber panicked"),
            }
        }
    }

    /// Drop every subscriber.
    pub fn clear(&self) { lock(&self.registry).subscribers.clear(); }

    /// Number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize { lock(&self.registry).subscribers.len() }

    /// Whether no subscribers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// Removes one subscription when [`Disposer::dispose`] is called.
///
/// Dropping a disposer without calling `dispose` leaves the subscription in
/// place for the lifetime of the dispatcher.
#[must_use = "dropping a Disposer keeps the subscription alive; call dispose() to remove it"]
pub struct Disposer {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Disposer {
    /// Remove exactly the subscriber this token was issued for.
    pub fn dispose(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use tracing::Level;

    use super::*;
    use crate::test_helpers::tracing::capture_events;

    type Log = Arc<Mutex<Vec<String>>>;

    #[fixture]
    fn log() -> Log { Arc::default() }

    fn recorder(log: &Log, label: &'static str) -> impl Fn(&u32) -> Result<(), HandlerError> + use<> {
        let entries = Arc::clone(log);
        move |value| {
            lock(&entries).push(format!("{label}:{value}"));
            Ok(())
        }
    }

    #[rstest]
    fn delivers_in_registration_order(log: Log) {
        let dispatcher = EventDispatcher::new("test");
        let _a = dispatcher.subscribe(recorder(&log, "a"));
        let _b = dispatcher.subscribe(recorder(&log, "b"));
        let _c = dispatcher.subscribe(recorder(&log, "c"));

        dispatcher.emit(&1);

        assert_eq!(*lock(&log), ["a:1", "b:1", "c:1"]);
    }

    #[rstest]
    fn dispose_removes_only_that_subscriber(log: Log) {
        let dispatcher = EventDispatcher::new("test");
        let _a = dispatcher.subscribe(recorder(&log, "a"));
        let b = dispatcher.subscribe(recorder(&log, "b"));
        let _c = dispatcher.subscribe(recorder(&log, "c"));

        b.dispose();
        dispatcher.emit(&2);

        assert_eq!(*lock(&log), ["a:2", "c:2"]);
        assert_eq!(dispatcher.len(), 2);
    }

    #[rstest]
    fn failing_subscribers_do_not_stop_delivery(log: Log) {
        let dispatcher = EventDispatcher::new("requests");
        let _a = dispatcher.subscribe(|_: &u32| Err("boom".into()));
        let _b = dispatcher.subscribe(|_: &u32| panic!("handler panicked"));
        let _c = dispatcher.subscribe(recorder(&log, "c"));

        let events = capture_events(|| dispatcher.emit(&3));

        assert_eq!(*lock(&log), ["c:3"]);
        assert_eq!(events.len(), 2);
        let failed = events.first().expect("failure event");
        assert_eq!(failed.level(), Level::WARN);
        assert_eq!(failed.field("dispatcher"), Some("requests"));
        assert_eq!(failed.field("error"), Some("boom"));
        assert_eq!(
            events.get(1).and_then(|event| event.message()),
            Some("subscriber panicked")
        );
    }

    #[rstest]
    fn subscribing_during_emit_waits_for_next_emission(log: Log) {
        let dispatcher = Arc::new(EventDispatcher::new("test"));
        let inner_log = Arc::clone(&log);
        let weak = Arc::downgrade(&dispatcher);
        let _outer = dispatcher.subscribe(move |value: &u32| {
            if let Some(live) = weak.upgrade() {
                let _late = live.subscribe(recorder(&inner_log, "late"));
            }
            lock(&inner_log).push(format!("outer:{value}"));
            Ok(())
        });

        dispatcher.emit(&1);
        assert_eq!(*lock(&log), ["outer:1"]);
        assert_eq!(dispatcher.len(), 2);
    }

    #[rstest]
    fn disposer_outliving_dispatcher_is_harmless() {
        let dispatcher = EventDispatcher::<u32>::new("test");
        let token = dispatcher.subscribe(|_| Ok(()));
        drop(dispatcher);
        token.dispose();
    }

    #[rstest]
    fn clear_drops_every_subscriber(log: Log) {
        let dispatcher = EventDispatcher::new("test");
        let _a = dispatcher.subscribe(recorder(&log, "a"));
        dispatcher.clear();
        dispatcher.emit(&9);
        assert!(dispatcher.is_empty());
        assert!(lock(&log).is_empty());
    }
}
