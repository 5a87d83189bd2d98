// # Server Listener Trait
//
// Observers that want to follow the server lifecycle implement
// `ServerListener`. They are registered once with the coordinator's
// `ListenerRegistry` and are re-attached to whichever controller is active,
// so a listener survives any number of reconfigurations.

use std::sync::Arc;

use crate::traits::controller::ControllerState;

/// Event delivered to a [`ServerListener`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// The controller entered a new lifecycle state
    StateChanged {
        /// Controller name
        controller: String,
        /// State just entered
        state: ControllerState,
    },

    /// The controller failed to configure or start
    Failed {
        /// Controller name
        controller: String,
        /// Failure description
        message: String,
    },
}

impl ServerEvent {
    /// Name of the controller that emitted the event
    pub fn controller(&self) -> &str {
        match self {
            ServerEvent::StateChanged { controller, .. } => controller,
            ServerEvent::Failed { controller, .. } => controller,
        }
    }
}

/// External observer of the active server controller
///
/// Implementations are called from whatever task drives the controller and
/// must not block.
pub trait ServerListener: Send + Sync {
    /// Receive a lifecycle event
    fn on_event(&self, event: &ServerEvent);
}

/// Listener identity: two handles are the same listener when they share an allocation
pub fn same_listener(a: &Arc<dyn ServerListener>, b: &Arc<dyn ServerListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
