//! Per-channel listener registry keyed by event name.
//!
//! Used for both published messages (keyed by message name) and presence
//! events (keyed by presence action name). Listener identity is the `Arc`
//! pointer, so the same closure can be registered under several filters and
//! removed selectively.

use std::sync::Arc;

/// A listener invoked on the dispatcher task for every matching event.
///
/// Listeners should return quickly: they run inline with channel processing.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Subscription<T> {
    filter: Option<String>,
    listener: Listener<T>,
}

/// Ordered (filter, listener) registrations for one event type.
pub(crate) struct Subscriptions<T> {
    entries: Vec<Subscription<T>>,
}

impl<T> Default for Subscriptions<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T> Subscriptions<T> {
    /// Register `listener` for `filter` (`None` matches every event).
    pub fn add(&mut self, filter: Option<String>, listener: Listener<T>) {
        self.entries.push(Subscription { filter, listener });
    }

    /// Remove registrations matching both arguments; `None` matches anything.
    ///
    /// Returns the number of registrations removed.
    pub fn remove(&mut self, filter: Option<&str>, listener: Option<&Listener<T>>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| {
            let filter_matches = filter.map_or(true, |f| entry.filter.as_deref() == Some(f));
            let listener_matches = listener.map_or(true, |l| Arc::ptr_eq(&entry.listener, l));
            !(filter_matches && listener_matches)
        });
        before - self.entries.len()
    }

    /// Listeners interested in an event named `name`, in subscription order.
    ///
    /// The result is a snapshot: later changes to the registry do not affect
    /// a delivery pass already in progress.
    pub fn matching(&self, name: Option<&str>) -> Vec<Listener<T>> {
        self.entries
            .iter()
            .filter(|entry| match entry.filter.as_deref() {
                None => true,
                Some(filter) => name == Some(filter),
            })
            .map(|entry| Arc::clone(&entry.listener))
            .collect()
    }

    /// Deliver `event` to every matching listener.
    pub fn dispatch(&self, name: Option<&str>, event: &T) -> usize {
        let listeners = self.matching(name);
        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
