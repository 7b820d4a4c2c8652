//! Named-event listener registry.
//!
//! Registrations are kept per event name in insertion order. Every
//! registration gets a process-unique [`ListenerId`]; [`EventBus::on`]
//! returns a [`ListenerHandle`] that removes exactly that registration.
//!
//! `emit` copies the listener list for the event, releases the lock and then
//! calls each listener, so listeners may register or remove listeners
//! (including themselves) while a dispatch is running. Such changes take
//! effect from the next `emit`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

/// Listener callback.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener_{}", self.0)
    }
}

/// Deregistration handle returned by [`EventBus::on`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    event: String,
    id: ListenerId,
}

impl ListenerHandle {
    /// Event the listener is registered on.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Registration identity.
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

struct Registration {
    id: ListenerId,
    callback: Listener,
}

/// Listener registry keyed by event name.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<HashMap<String, Vec<Registration>>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener for `event`.
    pub fn on<F>(&self, event: &str, callback: F) -> ListenerHandle
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = ListenerId::next();
        self.listeners
            .lock()
            .entry(event.to_owned())
            .or_default()
            .push(Registration {
                id,
                callback: Arc::new(callback),
            });
        ListenerHandle {
            event: event.to_owned(),
            id,
        }
    }

    /// Remove the registration behind `handle`.
    ///
    /// Returns `false` if it was already removed.
    pub fn off(&self, handle: &ListenerHandle) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(regs) = listeners.get_mut(&handle.event) else {
            return false;
        };
        let before = regs.len();
        regs.retain(|r| r.id != handle.id);
        let removed = regs.len() != before;
        if regs.is_empty() {
            let _ = listeners.remove(&handle.event);
        }
        removed
    }

    /// Call every listener registered for `event`, in registration order.
    ///
    /// Returns the number of listeners invoked.
    pub fn emit(&self, event: &str, data: &Value) -> usize {
        let snapshot: Vec<Listener> = match self.listeners.lock().get(event) {
            Some(regs) => regs.iter().map(|r| Arc::clone(&r.callback)).collect(),
            None => return 0,
        };
        for callback in &snapshot {
            callback(data);
        }
        snapshot.len()
    }

    /// Remove every listener for `event`. Returns how many were removed.
    pub fn destroy(&self, event: &str) -> usize {
        self.listeners.lock().remove(event).map_or(0, |regs| regs.len())
    }

    /// Whether at least one listener is registered for `event`.
    pub fn has_listeners(&self, event: &str) -> bool {
        self.listeners.lock().contains_key(event)
    }

    /// Number of listeners registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.lock().get(event).map_or(0, Vec::len)
    }

    /// Names of every event with at least one listener.
    pub fn events(&self) -> Vec<String> {
        let mut names: Vec<String> = self.listeners.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("events", &self.events())
            .finish()
    }
}
