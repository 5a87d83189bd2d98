// # Service Registry Trait
//
// The host's publication surface. The coordinator publishes two services per
// active controller and retracts both before the controller is stopped:
//
// - the façade (`FACADE_CAPABILITY`): "the HTTP entry point is available",
//   carrying the redacted properties derived from the configuration
// - the runtime view (`RUNTIME_CAPABILITY`): read-only access to the live
//   reconciliation state
//
// The registry decides what "published" means (an in-process map, a service
// bus, ...). `InMemoryServiceRegistry` is the bundled implementation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::coordinator::RuntimeView;
use crate::traits::controller::ServerController;

/// Capability name of the façade registration
pub const FACADE_CAPABILITY: &str = "http.facade";

/// Capability name of the runtime/introspection registration
pub const RUNTIME_CAPABILITY: &str = "http.runtime";

/// Flattened, redacted properties published with the façade
pub type FacadeProperties = BTreeMap<String, String>;

/// The published HTTP entry point
#[derive(Clone)]
pub struct HttpFacade {
    /// Controller serving requests behind the façade
    pub controller: Arc<dyn ServerController>,
    /// Derived properties; secret-like values are already redacted
    pub properties: FacadeProperties,
}

impl fmt::Debug for HttpFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFacade")
            .field("controller", &self.controller.name())
            .field("properties", &self.properties)
            .finish()
    }
}

/// A service handed to the [`ServiceRegistry`]
#[derive(Debug, Clone)]
pub enum PublishedService {
    /// The HTTP façade
    Facade(HttpFacade),
    /// The read-only runtime view
    Runtime(RuntimeView),
}

/// Handle to a live registration
///
/// Dropping the handle without calling [`unregister`](Registration::unregister)
/// leaves the service published.
pub trait Registration: Send + Sync {
    /// Retract the service
    fn unregister(self: Box<Self>);
}

/// Trait for the host's publication surface
pub trait ServiceRegistry: Send + Sync {
    /// Publish `service` under `capability`
    fn register(
        &self,
        capability: &str,
        service: PublishedService,
    ) -> Result<Box<dyn Registration>, crate::Error>;
}
