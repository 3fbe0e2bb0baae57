//! Typed change notifications with explicit unsubscription.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::models::LayoutId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutManagerEvent {
    /// A layout was created, edited, synced or removed.
    Changed { id: LayoutId },
    BusyChanged(bool),
    OnlineChanged(bool),
    /// The last background error, or `None` once a pass succeeds again.
    ErrorChanged(Option<String>),
}

type Callback = Arc<dyn Fn(&LayoutManagerEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<u64, Callback>>,
}

/// Set of registered callbacks. Cloning shares the registry.
#[derive(Clone, Default)]
pub struct Listeners {
    registry: Arc<Registry>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&LayoutManagerEvent) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut callbacks) = self.registry.callbacks.lock() {
            callbacks.insert(id, Arc::new(callback));
        }
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Delivers `event` synchronously to every callback.
    ///
    /// Callbacks run outside the registry lock, so they may subscribe or
    /// unsubscribe without deadlocking.
    pub fn emit(&self, event: LayoutManagerEvent) {
        let callbacks: Vec<Callback> = match self.registry.callbacks.lock() {
            Ok(callbacks) => callbacks.values().cloned().collect(),
            Err(_) => return,
        };
        for callback in callbacks {
            callback(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.registry
            .callbacks
            .lock()
            .map(|callbacks| callbacks.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps a callback registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if let Ok(mut callbacks) = registry.callbacks.lock() {
                callbacks.remove(&self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(listeners: &Listeners) -> (Subscription, Arc<Mutex<Vec<LayoutManagerEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = listeners.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        (sub, seen)
    }

    #[test]
    fn test_emit_reaches_subscribers() {
        let listeners = Listeners::new();
        let (_sub, seen) = recorder(&listeners);

        listeners.emit(LayoutManagerEvent::OnlineChanged(true));
        listeners.emit(LayoutManagerEvent::Changed {
            id: LayoutId::from("L1"),
        });

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                LayoutManagerEvent::OnlineChanged(true),
                LayoutManagerEvent::Changed {
                    id: LayoutId::from("L1")
                },
            ]
        );
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let listeners = Listeners::new();
        let (sub, seen) = recorder(&listeners);
        let (_other, other_seen) = recorder(&listeners);
        assert_eq!(listeners.len(), 2);

        sub.unsubscribe();
        listeners.emit(LayoutManagerEvent::BusyChanged(true));

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(other_seen.lock().unwrap().len(), 1);
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let listeners = Listeners::new();
        {
            let (_sub, _seen) = recorder(&listeners);
            assert!(!listeners.is_empty());
        }
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_subscription_outlives_listeners() {
        let listeners = Listeners::new();
        let (sub, _seen) = recorder(&listeners);
        drop(listeners);
        sub.unsubscribe();
    }
}
