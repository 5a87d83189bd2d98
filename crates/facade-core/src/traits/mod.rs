//! Core traits for the facade coordinator
//!
//! This module defines the abstract interfaces of the coordinator's
//! collaborators.
//!
//! - [`ServerController`]: One running server engine
//! - [`BackendFactory`]: Builds controllers from configuration snapshots
//! - [`ServerListener`]: Observes the active controller
//! - [`ServiceRegistry`]: Publishes the façade and runtime registrations

pub mod controller;
pub mod factory;
pub mod listener;
pub mod service_registry;

pub use controller::{ControllerState, ServerController};
pub use factory::{BackendFactory, FactoryHandle};
pub use listener::{ServerEvent, ServerListener, same_listener};
pub use service_registry::{
    FACADE_CAPABILITY, FacadeProperties, HttpFacade, PublishedService, RUNTIME_CAPABILITY,
    Registration, ServiceRegistry,
};
