// # Server Controller Trait
//
// Defines the interface of one running server engine as seen by the
// coordinator.
//
// ## Implementations
//
// Controllers are supplied by backend crates through a `BackendFactory`.
// The coordinator never looks inside them: it only drives the lifecycle and
// attaches listeners.
//
// ## Lifecycle
//
// ```text
// NEW ──configure()──▶ CONFIGURED ──start()──▶ STARTED
//  │                       │                      │
//  └───────────────────────┴──────stop()──────────┴──▶ STOPPED (terminal)
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::traits::listener::ServerListener;

/// Lifecycle state of a [`ServerController`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    /// Created, not configured yet
    New,
    /// Configured, not accepting traffic yet
    Configured,
    /// Running
    Started,
    /// Stopped; a stopped controller is never restarted
    Stopped,
}

impl ControllerState {
    /// Whether moving from `self` to `next` is a legal lifecycle step
    ///
    /// Staying in `Stopped` is legal so that `stop()` can be idempotent.
    pub fn can_transition_to(self, next: ControllerState) -> bool {
        use ControllerState::*;
        matches!(
            (self, next),
            (New, Configured) | (Configured, Started) | (_, Stopped)
        )
    }

    /// Whether the state is terminal
    pub fn is_terminal(self) -> bool {
        self == ControllerState::Stopped
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerState::New => "new",
            ControllerState::Configured => "configured",
            ControllerState::Started => "started",
            ControllerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Trait for server controller implementations
///
/// A controller wraps exactly one server engine instance. It is created by a
/// [`BackendFactory`](crate::traits::BackendFactory) from a configuration
/// snapshot and is then driven by the coordinator through
/// `configure()` → `start()` → `stop()`.
///
/// # Thread Safety
///
/// All methods take `&self`. The coordinator's worker drives the lifecycle
/// while the listener registry may attach or detach listeners from any
/// thread, so implementations keep their mutable state behind their own
/// synchronization.
///
/// # Contract
///
/// - `configure()` is called exactly once, before `start()`
/// - `start()` is called at most once, only after a successful `configure()`
/// - `stop()` may be called in any state and must be idempotent
/// - an error from `configure()` or `start()` aborts the build; the
///   coordinator then calls `stop()` to release whatever was acquired
#[async_trait]
pub trait ServerController: Send + Sync {
    /// Human-readable controller name used in logs and façade properties
    fn name(&self) -> &str;

    /// Current lifecycle state
    fn state(&self) -> ControllerState;

    /// Prepare the server without accepting traffic
    async fn configure(&self) -> Result<(), crate::Error>;

    /// Start accepting traffic
    async fn start(&self) -> Result<(), crate::Error>;

    /// Stop the server and release its resources
    async fn stop(&self) -> Result<(), crate::Error>;

    /// Attach a listener; it receives every later state change
    fn add_listener(&self, listener: Arc<dyn ServerListener>);

    /// Detach a listener previously attached with [`add_listener`](Self::add_listener)
    fn remove_listener(&self, listener: &Arc<dyn ServerListener>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        use ControllerState::*;

        assert!(New.can_transition_to(Configured));
        assert!(Configured.can_transition_to(Started));
        assert!(Started.can_transition_to(Stopped));
        assert!(New.can_transition_to(Stopped));
        assert!(Stopped.can_transition_to(Stopped));

        assert!(!New.can_transition_to(Started));
        assert!(!Started.can_transition_to(Configured));
        assert!(!Stopped.can_transition_to(Started));
        assert!(Stopped.is_terminal());
    }
}
