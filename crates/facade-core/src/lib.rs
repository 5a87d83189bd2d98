// # facade-core
//
// Core library of the HTTP serving facade.
//
// ## Architecture Overview
//
// Two independent, asynchronously arriving event streams drive the façade:
// administrative configuration changes and the availability of a pluggable
// backend factory. This crate serializes both into one ordered sequence of
// lifecycle transitions:
//
// - **Coordinator**: Single worker that owns all state and reconciles
// - **LifecycleBuilder**: Builds, starts, publishes and tears down controllers
// - **ListenerRegistry**: Keeps observers attached to the active controller
// - **FactoryRegistry**: Discovery side; picks the one active backend factory
// - **ServiceRegistry**: Trait for the host's publication surface
//
// ## Design Principles
//
// 1. **Single Writer**: Only the worker mutates reconciliation state; callers send messages
// 2. **One Active Server**: The old controller is stopped and retracted before a new one is published
// 3. **Plugin-Based**: Backends are factories behind a trait, found through a registry
// 4. **Library-First**: The daemon is a thin integration layer over this crate
// 5. **Idempotency**: Re-submitting the applied configuration changes nothing

pub mod config;
pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod listeners;
pub mod publish;
pub mod registry;
pub mod snapshot;
pub mod traits;

// Re-export core types for convenience
pub use config::CoordinatorSettings;
pub use coordinator::{Coordinator, CoordinatorEvent, RuntimeStatus, RuntimeView};
pub use error::{Error, Result};
pub use listeners::ListenerRegistry;
pub use publish::InMemoryServiceRegistry;
pub use registry::{FactoryRegistry, FactorySubscriber};
pub use snapshot::ConfigSnapshot;
pub use traits::{
    BackendFactory, ControllerState, FactoryHandle, ServerController, ServerEvent, ServerListener,
    ServiceRegistry,
};
