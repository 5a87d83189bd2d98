//! Backend factory registry
//!
//! The registry is the discovery side of the system: backend crates register
//! their [`BackendFactory`](crate::traits::BackendFactory) here, and
//! subscribers (the [`Coordinator`](crate::Coordinator)) are told which
//! factory is active. The coordinator does not care how factories are found.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use facade_core::{Coordinator, FactoryRegistry};
//!
//! let registry = FactoryRegistry::new();
//! registry.subscribe(Arc::new(coordinator.clone())).await;
//!
//! // In a backend crate
//! registry.register(FactoryHandle::from(Arc::new(UndertowFactory::new()))).await?;
//! ```
//!
//! ## Selection
//!
//! At most one factory is active at a time. The first registered factory
//! becomes active; later ones wait as standby in registration order. When the
//! active factory is unregistered, subscribers first see `None` (and the
//! coordinator tears down synchronously), then the next standby is promoted.

use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::traits::FactoryHandle;

/// Receives active-factory changes
#[async_trait]
pub trait FactorySubscriber: Send + Sync {
    /// The active factory changed; `None` means no factory is available
    ///
    /// The registry awaits this call before publishing the next change.
    async fn factory_changed(&self, factory: Option<FactoryHandle>);
}

/// Registry of backend factories with single-active selection
///
/// ## Thread Safety
///
/// Registration changes are serialized: a change and the notifications it
/// causes complete before the next change is applied.
#[derive(Default)]
pub struct FactoryRegistry {
    /// Registered factories; the first one is active
    factories: Mutex<Vec<FactoryHandle>>,

    /// Subscribers notified about active-factory changes
    subscribers: RwLock<Vec<Arc<dyn FactorySubscriber>>>,
}

impl FactoryRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to active-factory changes
    ///
    /// If a factory is already active, the subscriber is told right away.
    pub async fn subscribe(&self, subscriber: Arc<dyn FactorySubscriber>) {
        let factories = self.factories.lock().await;

        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&subscriber));

        if let Some(active) = factories.first() {
            subscriber.factory_changed(Some(active.clone())).await;
        }
    }

    /// Register a backend factory
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Registered (active, or standby if another one is active)
    /// - `Err(Error)`: A factory with the same name is already registered
    pub async fn register(&self, factory: FactoryHandle) -> Result<()> {
        let mut factories = self.factories.lock().await;

        if factories.iter().any(|f| f.name() == factory.name()) {
            return Err(Error::config(format!(
                "Backend factory already registered: {}",
                factory.name()
            )));
        }

        factories.push(factory.clone());

        if factories.len() == 1 {
            info!("Backend factory {} registered and active", factory.name());
            self.notify(Some(factory)).await;
        } else {
            info!(
                "Backend factory {} registered as standby ({} active)",
                factory.name(),
                factories[0].name()
            );
        }

        Ok(())
    }

    /// Unregister a backend factory by name
    ///
    /// # Returns
    ///
    /// `true` if a factory with that name was registered
    pub async fn unregister(&self, name: &str) -> bool {
        let mut factories = self.factories.lock().await;

        let Some(position) = factories.iter().position(|f| f.name() == name) else {
            debug!("Backend factory {} is not registered", name);
            return false;
        };

        factories.remove(position);

        if position == 0 {
            info!("Active backend factory {} unregistered", name);
            self.notify(None).await;

            if let Some(next) = factories.first() {
                info!("Promoting standby backend factory {}", next.name());
                self.notify(Some(next.clone())).await;
            }
        } else {
            info!("Standby backend factory {} unregistered", name);
        }

        true
    }

    /// Withdraw the active factory from all subscribers and drop them
    ///
    /// Factories stay registered; a later subscriber would see the active one again.
    pub async fn close(&self) {
        let factories = self.factories.lock().await;

        if !factories.is_empty() {
            self.notify(None).await;
        }

        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Currently active factory
    pub async fn active(&self) -> Option<FactoryHandle> {
        self.factories.lock().await.first().cloned()
    }

    /// List registered factory names, active first
    pub async fn list(&self) -> Vec<String> {
        self.factories
            .lock()
            .await
            .iter()
            .map(|f| f.name().to_string())
            .collect()
    }

    /// Check if a factory name is registered
    pub async fn contains(&self, name: &str) -> bool {
        self.factories.lock().await.iter().any(|f| f.name() == name)
    }

    async fn notify(&self, factory: Option<FactoryHandle>) {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for subscriber in subscribers {
            subscriber.factory_changed(factory.clone()).await;
        }
    }
}
