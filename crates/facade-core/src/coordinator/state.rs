// # Reconciliation State
//
// The coordinator's single source of truth about what is currently running.
//
// `ReconciliationState` is owned by the worker task and never shared: no
// other code path can write it, so it needs no locking. What the rest of the
// world sees is `RuntimeStatus`, an immutable copy the worker republishes
// after every reconciliation through `RuntimeView`.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::lifecycle::ActiveServer;
use crate::lifecycle::properties::Redactor;
use crate::snapshot::ConfigSnapshot;
use crate::traits::{ControllerState, FactoryHandle};

/// The worker-owned tuple (snapshot, factory, controller + registrations, initialized)
#[derive(Default)]
pub(crate) struct ReconciliationState {
    /// Last snapshot applied; `None` until a configuration arrives
    pub snapshot: Option<ConfigSnapshot>,

    /// Factory currently in use
    pub factory: Option<FactoryHandle>,

    /// Running controller and its registrations, created and torn down together
    pub active: Option<ActiveServer>,

    /// Flips to `true` on the first reconciliation attempt, exactly once
    pub initialized: bool,

    /// Error of the last failed build, cleared by the next successful one
    pub last_error: Option<String>,

    /// Number of reconciliations that changed something
    pub generation: u64,
}

impl ReconciliationState {
    /// Whether `(snapshot, factory)` is what is already applied
    ///
    /// Snapshots compare by value, factories by identity.
    pub fn is_current(&self, snapshot: Option<&ConfigSnapshot>, factory: Option<&FactoryHandle>) -> bool {
        self.snapshot.as_ref() == snapshot && self.factory.as_ref() == factory
    }

    /// Immutable copy for introspection, with secrets redacted by `redactor`
    pub fn status(&self, redactor: &Redactor) -> RuntimeStatus {
        let controller = self.active.as_ref().map(|a| &a.controller);
        RuntimeStatus {
            initialized: self.initialized,
            snapshot: self.snapshot.as_ref().map(|s| redactor.redact(s)),
            backend: self.factory.as_ref().map(|f| f.name().to_string()),
            controller: controller.map(|c| c.name().to_string()),
            controller_state: controller.map(|c| c.state()),
            facade_published: self.active.is_some(),
            last_error: self.last_error.clone(),
            generation: self.generation,
            updated_at: Utc::now(),
        }
    }
}

/// Point-in-time view of the reconciliation state
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeStatus {
    /// Whether the bootstrap reconciliation has happened
    pub initialized: bool,
    /// Snapshot currently applied, secret values redacted
    pub snapshot: Option<ConfigSnapshot>,
    /// Name of the backend factory in use
    pub backend: Option<String>,
    /// Name of the active controller
    pub controller: Option<String>,
    /// Lifecycle state of the active controller
    pub controller_state: Option<ControllerState>,
    /// Whether the façade is currently published
    pub facade_published: bool,
    /// Error of the last failed build
    pub last_error: Option<String>,
    /// Number of reconciliations that changed something
    pub generation: u64,
    /// When this status was captured
    pub updated_at: DateTime<Utc>,
}

impl RuntimeStatus {
    /// Status before any reconciliation ran
    pub fn empty() -> Self {
        Self {
            initialized: false,
            snapshot: None,
            backend: None,
            controller: None,
            controller_state: None,
            facade_published: false,
            last_error: None,
            generation: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Read-only, live handle on the coordinator's runtime status
///
/// This is the service published under the runtime capability. Every call to
/// [`current`](RuntimeView::current) returns the latest status without
/// blocking the worker.
#[derive(Clone)]
pub struct RuntimeView {
    status: Arc<ArcSwap<RuntimeStatus>>,
}

impl RuntimeView {
    pub(crate) fn new() -> Self {
        Self {
            status: Arc::new(ArcSwap::from_pointee(RuntimeStatus::empty())),
        }
    }

    /// Latest published status
    pub fn current(&self) -> Arc<RuntimeStatus> {
        self.status.load_full()
    }

    pub(crate) fn publish(&self, status: RuntimeStatus) {
        self.status.store(Arc::new(status));
    }
}

impl fmt::Debug for RuntimeView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RuntimeView").field(&self.current()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_state_matches_nothing_but_empty_pair() {
        let state = ReconciliationState::default();
        assert!(state.is_current(None, None));

        let snapshot = ConfigSnapshot::new();
        assert!(!state.is_current(Some(&snapshot), None));
    }

    #[test]
    fn test_view_sees_latest_publication() {
        let view = RuntimeView::new();
        let reader = view.clone();
        assert!(!reader.current().initialized);

        let state = ReconciliationState {
            initialized: true,
            generation: 3,
            ..Default::default()
        };
        view.publish(state.status(&Redactor::new(["password"])));

        let status = reader.current();
        assert!(status.initialized);
        assert_eq!(status.generation, 3);
        assert!(!status.facade_published);
    }

    #[test]
    fn test_status_never_carries_secrets() {
        let state = ReconciliationState {
            snapshot: Some(
                ConfigSnapshot::new()
                    .with("http.port", 8080)
                    .with("http.keystore.password", "hunter2"),
            ),
            initialized: true,
            ..Default::default()
        };

        let status = state.status(&Redactor::new(["password"]));
        let json = serde_json::to_string(&status).unwrap();
        assert!(!json.contains("hunter2"), "secret leaked: {}", json);
        assert!(json.contains("8080"));

        // the worker's own copy stays intact
        assert_eq!(
            state.snapshot.as_ref().and_then(|s| s.get_str("http.keystore.password")),
            Some("hunter2")
        );
    }
}
