// # Backend Factory Trait
//
// A backend factory is the pluggable capability that turns a configuration
// snapshot into a server controller. Backend crates register one with the
// `FactoryRegistry`; the coordinator holds at most one of them at a time.
//
// ## Identity
//
// Factories are compared by identity, never by value. Two handles are "the
// same factory" only if they point to the same registered instance, which is
// what `FactoryHandle`'s `PartialEq` implements.

use std::fmt;
use std::sync::Arc;

use crate::snapshot::ConfigSnapshot;
use crate::traits::controller::ServerController;

/// Trait for backend factory implementations
///
/// # Contract
///
/// - `create()` builds a controller in the `New` state; it must not start it
/// - `create()` may fail; the coordinator logs the error and publishes no
///   façade until the next successful reconciliation
/// - the factory must not keep references to the controllers it created
pub trait BackendFactory: Send + Sync {
    /// Backend name (e.g., "undertow", "jetty")
    fn name(&self) -> &str;

    /// Create a controller for the given effective configuration
    fn create(&self, snapshot: &ConfigSnapshot) -> Result<Arc<dyn ServerController>, crate::Error>;
}

/// Shared handle to a registered [`BackendFactory`] with identity equality
#[derive(Clone)]
pub struct FactoryHandle(Arc<dyn BackendFactory>);

impl FactoryHandle {
    /// Wrap a factory
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        Self(factory)
    }

    /// Backend name of the wrapped factory
    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Create a controller through the wrapped factory
    pub fn create(&self, snapshot: &ConfigSnapshot) -> Result<Arc<dyn ServerController>, crate::Error> {
        self.0.create(snapshot)
    }

    /// Whether both handles refer to the same registered instance
    pub fn same(&self, other: &FactoryHandle) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl PartialEq for FactoryHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for FactoryHandle {}

impl fmt::Debug for FactoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FactoryHandle").field(&self.name()).finish()
    }
}

impl<F: BackendFactory + 'static> From<Arc<F>> for FactoryHandle {
    fn from(factory: Arc<F>) -> Self {
        Self(factory)
    }
}
