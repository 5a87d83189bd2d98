// # Service Registry Implementations
//
// This module provides implementations of the ServiceRegistry trait.

pub mod memory;

pub use memory::{InMemoryServiceRegistry, RegistrationRecord};
