//! Session listener interface
//!
//! Defines the listener trait for session events and the registry that
//! fans events out to every registered listener.

use crate::core::event::SessionEvent;
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

/// Handle for a registered session listener.
///
/// Uniquely identifies a listener subscription. Can be used to unsubscribe
/// from session events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerHandle(pub String);

/// Listener trait for session events
///
/// Called synchronously from whichever operation produced the event, so
/// implementations must return quickly.
pub trait SessionListener: Send + Sync {
    /// Called for every event the session emits
    fn on_event(&self, event: &SessionEvent);
}

impl<F> SessionListener for F
where
    F: Fn(&SessionEvent) + Send + Sync,
{
    fn on_event(&self, event: &SessionEvent) {
        self(event)
    }
}

/// Registered listeners in registration order, each tagged with its handle
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    listeners: Arc<RwLock<Vec<(String, Arc<dyn SessionListener>)>>>,
}

impl ListenerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener, returning the handle to remove it again
    pub fn register(&self, listener: Arc<dyn SessionListener>) -> ListenerHandle {
        let id = Uuid::new_v4().to_string();
        self.listeners.write().push((id.clone(), listener));
        tracing::debug!("Listener {} added", id);
        ListenerHandle(id)
    }

    /// Remove a listener; unknown handles are ignored
    pub fn unregister(&self, handle: &ListenerHandle) {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(id, _)| id != &handle.0);
        if listeners.len() < before {
            tracing::debug!("Listener {} removed", handle.0);
        }
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Check if no listener is registered
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Deliver an event to every listener, in registration order
    pub fn emit(&self, event: SessionEvent) {
        // Clone the listener list so a listener may (un)register without deadlocking.
        let listeners: Vec<Arc<dyn SessionListener>> =
            self.listeners.read().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener.on_event(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_register_unregister_listener() {
        let registry = ListenerRegistry::new();
        let handle = registry.register(Arc::new(|_: &SessionEvent| {}));
        assert_eq!(registry.len(), 1);
        registry.unregister(&handle);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_emit_follows_registration_order() {
        let registry = ListenerRegistry::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for name in ["c", "a", "d", "b"] {
            let calls = calls.clone();
            registry.register(Arc::new(move |event: &SessionEvent| {
                calls.lock().push(format!("{}:{}", name, event));
            }));
        }

        registry.emit(SessionEvent::Disconnected);
        assert_eq!(
            *calls.lock(),
            vec![
                "c:Disconnected",
                "a:Disconnected",
                "d:Disconnected",
                "b:Disconnected"
            ]
        );
    }

    #[test]
    fn test_unregister_keeps_order_of_the_rest() {
        let registry = ListenerRegistry::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for name in ["a", "b", "c"] {
            let calls = calls.clone();
            handles.push(registry.register(Arc::new(move |_: &SessionEvent| {
                calls.lock().push(name);
            })));
        }
        registry.unregister(&handles[1]);
        registry.unregister(&ListenerHandle("unknown".to_string()));

        registry.emit(SessionEvent::Disconnected);
        assert_eq!(registry.len(), 2);
        assert_eq!(*calls.lock(), vec!["a", "c"]);
    }
}
