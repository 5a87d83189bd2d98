//! Listener registry
//!
//! Remembers every [`ServerListener`] registered by the host and keeps them
//! attached to whichever controller is currently active.
//!
//! ## Concurrency
//!
//! Listeners are added and removed from arbitrary threads while the
//! coordinator's worker swaps controllers. The listener list is copy-on-write
//! (readers get a consistent snapshot without locking). The active-controller
//! slot is guarded so that "attach to the active controller" and
//! "activate a new controller with every known listener" never interleave,
//! which is what rules out both missed and duplicate attachments.

use arc_swap::ArcSwap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::traits::{ServerController, ServerListener, same_listener};

type ListenerList = Vec<Arc<dyn ServerListener>>;

/// Thread-safe set of listeners re-attached to each active controller
pub struct ListenerRegistry {
    /// Known listeners, in registration order
    listeners: ArcSwap<ListenerList>,

    /// Controller the listeners are currently attached to
    active: Mutex<Option<Arc<dyn ServerController>>>,
}

impl ListenerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
            active: Mutex::new(None),
        }
    }

    /// Remember `listener` and attach it to the active controller, if any
    ///
    /// # Returns
    ///
    /// `false` if the listener was already registered (nothing changes)
    pub fn add(&self, listener: Arc<dyn ServerListener>) -> bool {
        let active = self.lock_active();

        if self.contains(&listener) {
            debug!("Listener already registered, ignoring");
            return false;
        }

        self.listeners.rcu(|current| {
            let mut next = ListenerList::clone(current);
            next.push(Arc::clone(&listener));
            next
        });

        if let Some(controller) = active.as_ref() {
            debug!("Attaching listener to active controller {}", controller.name());
            controller.add_listener(listener);
        }

        true
    }

    /// Detach `listener` from the active controller and forget it
    ///
    /// # Returns
    ///
    /// `false` if the listener was not registered
    pub fn remove(&self, listener: &Arc<dyn ServerListener>) -> bool {
        let active = self.lock_active();

        if !self.contains(listener) {
            return false;
        }

        if let Some(controller) = active.as_ref() {
            controller.remove_listener(listener);
        }

        self.listeners.rcu(|current| {
            current
                .iter()
                .filter(|known| !same_listener(known, listener))
                .cloned()
                .collect::<ListenerList>()
        });

        true
    }

    /// Whether `listener` is registered
    pub fn contains(&self, listener: &Arc<dyn ServerListener>) -> bool {
        self.listeners
            .load()
            .iter()
            .any(|known| same_listener(known, listener))
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.load().len()
    }

    /// Whether no listener is registered
    pub fn is_empty(&self) -> bool {
        self.listeners.load().is_empty()
    }

    /// Controller the listeners are currently attached to
    pub fn active_controller(&self) -> Option<Arc<dyn ServerController>> {
        self.lock_active().clone()
    }

    /// Attach every known listener to `controller` and make it the active one
    ///
    /// Called by the coordinator's worker for each newly built controller,
    /// before the controller is configured and published.
    pub(crate) fn activate(&self, controller: Arc<dyn ServerController>) {
        let mut active = self.lock_active();

        if let Some(previous) = active.take() {
            detach_all(&previous, &self.listeners.load());
        }

        for listener in self.listeners.load().iter() {
            controller.add_listener(Arc::clone(listener));
        }
        *active = Some(controller);
    }

    /// Detach every known listener from the active controller and clear it
    ///
    /// Called by the coordinator's worker before a controller is stopped.
    pub(crate) fn deactivate(&self) -> Option<Arc<dyn ServerController>> {
        let mut active = self.lock_active();
        let controller = active.take()?;
        detach_all(&controller, &self.listeners.load());
        Some(controller)
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<Arc<dyn ServerController>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn detach_all(controller: &Arc<dyn ServerController>, listeners: &ListenerList) {
    for listener in listeners {
        controller.remove_listener(listener);
    }
}
