//! Controller lifecycle
//!
//! The [`LifecycleBuilder`] turns a `(snapshot, factory)` pair into a running,
//! published controller, and tears one down again.
//!
//! ## Build
//!
//! ```text
//! defaults ⊕ snapshot ──▶ factory.create() ──▶ attach listeners
//!                                                   │
//!        register runtime ◀── register façade ◀── start() ◀── configure()
//! ```
//!
//! Any failure aborts the build: listeners are detached, the half-built
//! controller is stopped, registrations made so far are retracted, and the
//! error goes back to the coordinator.
//!
//! ## Teardown
//!
//! Unregister façade, unregister runtime view, detach listeners, stop the
//! controller. A failing `stop()` is logged and teardown still completes.

pub mod properties;

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::coordinator::RuntimeView;
use crate::error::{Error, Result};
use crate::listeners::ListenerRegistry;
use crate::snapshot::ConfigSnapshot;
use crate::traits::{
    FACADE_CAPABILITY, FactoryHandle, HttpFacade, PublishedService, RUNTIME_CAPABILITY,
    Registration, ServerController, ServiceRegistry,
};
use properties::{Redactor, derive_properties};

/// Façade property naming the backend factory
pub const BACKEND_PROPERTY: &str = "facade.backend";

/// Façade property naming the controller
pub const CONTROLLER_PROPERTY: &str = "facade.controller";

/// A running controller together with the registrations published for it
pub struct ActiveServer {
    /// The running controller
    pub controller: Arc<dyn ServerController>,
    /// Name of the factory that built it
    pub backend: String,
    facade_registration: Box<dyn Registration>,
    runtime_registration: Box<dyn Registration>,
}

/// Builds and tears down controllers
pub struct LifecycleBuilder {
    services: Arc<dyn ServiceRegistry>,
    listeners: Arc<ListenerRegistry>,
    redactor: Redactor,
    defaults: ConfigSnapshot,
}

impl LifecycleBuilder {
    /// Create a builder publishing into `services`
    ///
    /// # Parameters
    ///
    /// - `services`: Host publication surface
    /// - `listeners`: Listeners attached to every controller built here
    /// - `redactor`: Decides which properties are secret
    /// - `defaults`: Properties layered under every snapshot
    pub fn new(
        services: Arc<dyn ServiceRegistry>,
        listeners: Arc<ListenerRegistry>,
        redactor: Redactor,
        defaults: ConfigSnapshot,
    ) -> Self {
        Self {
            services,
            listeners,
            redactor,
            defaults,
        }
    }

    /// Build, start and publish a controller
    ///
    /// # Parameters
    ///
    /// - `snapshot`: Raw configuration snapshot (`None` before any arrived)
    /// - `factory`: Factory to build the controller with
    /// - `runtime`: Live view published as the runtime registration
    pub async fn build(
        &self,
        snapshot: Option<&ConfigSnapshot>,
        factory: &FactoryHandle,
        runtime: &RuntimeView,
    ) -> Result<ActiveServer> {
        let effective = ConfigSnapshot::overlay(&self.defaults, snapshot);

        let controller = factory
            .create(&effective)
            .map_err(|e| Error::factory(format!("{}: {}", factory.name(), e)))?;

        // listeners first, so they observe configure() and start()
        self.listeners.activate(Arc::clone(&controller));

        match self
            .bring_up(&controller, factory, &effective, runtime)
            .await
        {
            Ok((facade_registration, runtime_registration)) => Ok(ActiveServer {
                controller,
                backend: factory.name().to_string(),
                facade_registration,
                runtime_registration,
            }),
            Err(e) => {
                self.listeners.deactivate();
                if let Err(stop_err) = controller.stop().await {
                    warn!(
                        "Problem stopping server controller {} after failed build: {}",
                        controller.name(),
                        stop_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn bring_up(
        &self,
        controller: &Arc<dyn ServerController>,
        factory: &FactoryHandle,
        effective: &ConfigSnapshot,
        runtime: &RuntimeView,
    ) -> Result<(Box<dyn Registration>, Box<dyn Registration>)> {
        info!("Configuring server controller {}", controller.name());
        controller.configure().await?;

        info!("Starting server controller {}", controller.name());
        controller.start().await?;

        let mut properties = derive_properties(effective, &self.redactor);
        for (key, value) in [
            (BACKEND_PROPERTY, factory.name()),
            (CONTROLLER_PROPERTY, controller.name()),
        ] {
            if properties.insert(key.to_string(), value.to_string()).is_some() {
                warn!("Configuration property {} is reserved and has been replaced", key);
            }
        }

        info!("Registering HTTP facade");
        let facade = self.services.register(
            FACADE_CAPABILITY,
            PublishedService::Facade(HttpFacade {
                controller: Arc::clone(controller),
                properties,
            }),
        )?;

        info!("Registering HTTP runtime view");
        let runtime = match self
            .services
            .register(RUNTIME_CAPABILITY, PublishedService::Runtime(runtime.clone()))
        {
            Ok(registration) => registration,
            Err(e) => {
                facade.unregister();
                return Err(e);
            }
        };

        Ok((facade, runtime))
    }

    /// Retract the registrations of `active` and stop its controller
    pub async fn teardown(&self, active: ActiveServer) {
        let ActiveServer {
            controller,
            facade_registration,
            runtime_registration,
            ..
        } = active;

        info!("Unregistering current HTTP facade");
        facade_registration.unregister();

        info!("Unregistering current HTTP runtime view");
        runtime_registration.unregister();

        self.listeners.deactivate();

        info!("Stopping current server controller {}", controller.name());
        if let Err(e) = controller.stop().await {
            error!("Problem stopping server controller {}: {}", controller.name(), e);
        }
    }
}
