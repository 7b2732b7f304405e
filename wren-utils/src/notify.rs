//
// Copyright (c) The Wren Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::{Arc, Mutex};

/// A synchronous event channel connecting one notifier to any number of
/// notifiees.
///
/// Callbacks run on the notifying thread. The subscriber list is snapshotted
/// before dispatch, so a callback may subscribe or drop subscriptions without
/// invalidating the iteration. Callbacks must not call back into the
/// emitting object while it holds its own lock.
pub struct Notifier<E> {
    subscribers: Mutex<Vec<Arc<dyn Fn(&E) + Send + Sync>>>,
}

// ===== impl Notifier =====

impl<E> Notifier<E> {
    pub fn new() -> Notifier<E> {
        Notifier {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a callback invoked on every subsequent event.
    pub fn subscribe<F>(&self, cb: F)
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribers.lock().unwrap().push(Arc::new(cb));
    }

    /// Delivers `event` to all subscribers registered at the time of the
    /// call.
    pub fn notify(&self, event: &E) {
        let subscribers = self.subscribers.lock().unwrap().clone();
        for subscriber in subscribers {
            subscriber(event);
        }
    }
}

impl<E> Default for Notifier<E> {
    fn default() -> Notifier<E> {
        Notifier::new()
    }
}

impl<E> std::fmt::Debug for Notifier<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.subscribers.lock().unwrap().len())
            .finish()
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn delivers_to_all_subscribers() {
        let notifier = Notifier::<u32>::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count = count.clone();
            notifier.subscribe(move |event| {
                count.fetch_add(*event as usize, Ordering::Relaxed);
            });
        }
        notifier.notify(&2);
        assert_eq!(count.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn subscription_during_dispatch_is_deferred() {
        let notifier = Arc::new(Notifier::<()>::new());
        let count = Arc::new(AtomicUsize::new(0));
        {
            let notifier = notifier.clone();
            let count = count.clone();
            notifier.clone().subscribe(move |_| {
                count.fetch_add(1, Ordering::Relaxed);
                let count = count.clone();
                notifier.subscribe(move |_| {
                    count.fetch_add(10, Ordering::Relaxed);
                });
            });
        }
        // The callback registered mid-dispatch only sees the next event.
        notifier.notify(&());
        assert_eq!(count.load(Ordering::Relaxed), 1);
        notifier.notify(&());
        assert_eq!(count.load(Ordering::Relaxed), 12);
    }
}
