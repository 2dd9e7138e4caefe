//! Event-type keyed listener registry with ordered, fault-isolated dispatch.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::warn;

/// Callback invoked with an event payload.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle identifying one registration, returned by `on`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ListenerId(u64);

/// Ordered listener lists per event type.
///
/// Every registration gets its own [`ListenerId`], so registering the same
/// closure twice yields two independent entries that both fire.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<String, Vec<(ListenerId, Listener)>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `callback` to the list for `event_type`.
    pub fn on<F>(&self, event_type: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(event_type.to_string())
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Removes the registration `id` from `event_type`.
    ///
    /// Returns `false` when nothing matched.
    pub fn off(&self, event_type: &str, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let Some(entries) = listeners.get_mut(event_type) else {
            return false;
        };
        let Some(index) = entries.iter().position(|(entry_id, _)| *entry_id == id) else {
            return false;
        };
        entries.remove(index);
        if entries.is_empty() {
            listeners.remove(event_type);
        }
        true
    }

    /// Invokes every listener for `event_type` in registration order.
    ///
    /// The list is snapshotted first, so listeners may register or remove
    /// listeners while being dispatched; such changes apply to the next emit.
    /// A panicking listener is logged and skipped. Returns how many listeners
    /// ran to completion.
    pub fn emit(&self, event_type: &str, payload: &Value) -> usize {
        let snapshot: Vec<(ListenerId, Listener)> = match self.lock().get(event_type) {
            Some(entries) => entries.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(payload))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(
                    event = "listener_panicked",
                    event_type,
                    listener_id = id.0
                ),
            }
        }
        delivered
    }

    /// Registrations currently held for `event_type`.
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.lock().get(event_type).map_or(0, Vec::len)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<(ListenerId, Listener)>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<String, usize> = self
            .lock()
            .iter()
            .map(|(event_type, entries)| (event_type.clone(), entries.len()))
            .collect();
        f.debug_struct("ListenerRegistry")
            .field("listeners", &counts)
            .finish()
    }
}
