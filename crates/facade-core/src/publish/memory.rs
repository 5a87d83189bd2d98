// # In-Memory Service Registry
//
// In-process implementation of ServiceRegistry.
//
// ## Purpose
//
// Keeps published services in a map owned by the host process. The host
// looks the façade up by capability; tests use the ordered history to check
// publication sequencing.
//
// ## When to Use
//
// - Embedding the coordinator in a single process
// - Testing environments

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use crate::coordinator::RuntimeView;
use crate::traits::{
    FACADE_CAPABILITY, HttpFacade, PublishedService, RUNTIME_CAPABILITY, Registration,
    ServiceRegistry,
};
use crate::Error;

/// One entry of the publication history
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationRecord {
    /// A service was published
    Registered {
        /// Registration id
        id: u64,
        /// Capability it was published under
        capability: String,
    },
    /// A service was retracted
    Unregistered {
        /// Registration id
        id: u64,
        /// Capability it was published under
        capability: String,
    },
}

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    live: RwLock<BTreeMap<u64, (String, PublishedService)>>,
    history: RwLock<Vec<RegistrationRecord>>,
}

impl Inner {
    fn remove(&self, id: u64) {
        let removed = self
            .live
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        if let Some((capability, _)) = removed {
            debug!("Unregistered {} (id {})", capability, id);
            self.history
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .push(RegistrationRecord::Unregistered { id, capability });
        }
    }
}

/// In-memory service registry
///
/// Cloning the registry yields another handle on the same services.
///
/// # Example
///
/// ```rust,no_run
/// use facade_core::publish::InMemoryServiceRegistry;
/// use facade_core::traits::{ServerController, ServiceRegistry};
/// use std::sync::Arc;
///
/// let registry = InMemoryServiceRegistry::new();
/// let services: Arc<dyn ServiceRegistry> = Arc::new(registry.clone());
///
/// // hand `services` to the coordinator, then:
/// if let Some(facade) = registry.facade() {
///     println!("serving through {}", facade.controller.name());
/// }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryServiceRegistry {
    inner: Arc<Inner>,
}

impl InMemoryServiceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Services currently published under `capability`, oldest first
    pub fn services(&self, capability: &str) -> Vec<PublishedService> {
        self.inner
            .live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|(cap, _)| cap == capability)
            .map(|(_, service)| service.clone())
            .collect()
    }

    /// The published façade, if any
    pub fn facade(&self) -> Option<HttpFacade> {
        self.services(FACADE_CAPABILITY)
            .into_iter()
            .find_map(|service| match service {
                PublishedService::Facade(facade) => Some(facade),
                PublishedService::Runtime(_) => None,
            })
    }

    /// The published runtime view, if any
    pub fn runtime(&self) -> Option<RuntimeView> {
        self.services(RUNTIME_CAPABILITY)
            .into_iter()
            .find_map(|service| match service {
                PublishedService::Runtime(view) => Some(view),
                PublishedService::Facade(_) => None,
            })
    }

    /// Number of live registrations
    pub fn len(&self) -> usize {
        self.inner
            .live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is published
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every registration and unregistration, in order
    pub fn history(&self) -> Vec<RegistrationRecord> {
        self.inner
            .history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ServiceRegistry for InMemoryServiceRegistry {
    fn register(
        &self,
        capability: &str,
        service: PublishedService,
    ) -> Result<Box<dyn Registration>, Error> {
        if capability.is_empty() {
            return Err(Error::registration("Capability name cannot be empty"));
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);

        self.inner
            .live
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, (capability.to_string(), service));
        self.inner
            .history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RegistrationRecord::Registered {
                id,
                capability: capability.to_string(),
            });

        debug!("Registered {} (id {})", capability, id);

        Ok(Box::new(MemoryRegistration {
            id,
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MemoryRegistration {
    id: u64,
    inner: Arc<Inner>,
}

impl Registration for MemoryRegistration {
    fn unregister(self: Box<Self>) {
        self.inner.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_unregister() {
        let registry = InMemoryServiceRegistry::new();
        assert!(registry.is_empty());

        let view = RuntimeView::new();
        let registration = registry
            .register(RUNTIME_CAPABILITY, PublishedService::Runtime(view))
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.runtime().is_some());
        assert!(registry.facade().is_none());

        registration.unregister();
        assert!(registry.is_empty());
        assert_eq!(
            registry.history(),
            vec![
                RegistrationRecord::Registered {
                    id: 0,
                    capability: RUNTIME_CAPABILITY.to_string()
                },
                RegistrationRecord::Unregistered {
                    id: 0,
                    capability: RUNTIME_CAPABILITY.to_string()
                },
            ]
        );
    }

    #[test]
    fn test_empty_capability_rejected() {
        let registry = InMemoryServiceRegistry::new();
        let result = registry.register("", PublishedService::Runtime(RuntimeView::new()));
        assert!(matches!(result, Err(Error::Registration(_))));
    }
}
