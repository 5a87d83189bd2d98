//! Reconfiguration coordinator
//!
//! The Coordinator serializes two independent event streams, configuration
//! changes and backend factory changes, onto a single worker task that owns
//! all mutable state.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  Config source   │── submit_config_change ──┐
//! └──────────────────┘                          │
//!                                               ▼
//!                                    ┌────────────────────┐
//!                                    │  FIFO request queue│
//!                                    └────────────────────┘
//!                                               ▲       │
//! ┌──────────────────┐                          │       ▼
//! │ FactoryRegistry  │── submit_factory_change ─┘  ┌──────────┐
//! └──────────────────┘                             │  Worker  │── reconcile()
//!                                                  └──────────┘
//!                                                       │
//!                   ┌───────────────────────────────────┼────────────────────┐
//!                   ▼                                   ▼                    ▼
//!         ┌──────────────────┐             ┌──────────────────┐   ┌──────────────────┐
//!         │ LifecycleBuilder │             │ ListenerRegistry │   │   RuntimeView    │
//!         │ (teardown/build) │             │   (re-attach)    │   │  (introspection) │
//!         └──────────────────┘             └──────────────────┘   └──────────────────┘
//! ```
//!
//! ## Reconcile
//!
//! 1. First request ever: record snapshot and factory, build nothing
//! 2. Same snapshot (by value) and same factory (by identity): no-op
//! 3. Otherwise: tear down the active controller, record the new pair, and
//!    build a new controller unless the factory is gone
//!
//! ## Concurrency
//!
//! Producers enqueue and return. The one exception is the removal of the
//! backend factory, which waits (bounded) for its reconciliation to finish so
//! that shutdown sequencing is deterministic.

mod state;

pub use state::{RuntimeStatus, RuntimeView};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::CoordinatorSettings;
use crate::error::Result;
use crate::lifecycle::LifecycleBuilder;
use crate::lifecycle::properties::Redactor;
use crate::listeners::ListenerRegistry;
use crate::registry::FactorySubscriber;
use crate::snapshot::ConfigSnapshot;
use crate::traits::{FactoryHandle, ServiceRegistry};
use state::ReconciliationState;

/// Events emitted by the Coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    /// First reconciliation recorded the baseline; nothing was built
    Bootstrapped,

    /// Requested pair equals the applied one; nothing happened
    Unchanged,

    /// The façade and runtime registrations were retracted
    FacadeRetracted,

    /// A retired controller was stopped
    ControllerStopped {
        controller: String,
    },

    /// A new controller is running and the façade is published
    FacadePublished {
        backend: String,
        controller: String,
    },

    /// Building a controller failed; no façade is published
    BuildFailed {
        error: String,
    },

    /// No backend factory is available; no façade is published
    FactoryUnavailable,

    /// The worker finished its final teardown
    ShutDown,
}

/// A queued reconciliation request
enum Request {
    /// New configuration, paired with whatever factory is current at dequeue time
    Config(ConfigSnapshot),

    /// New factory, paired with whatever snapshot is current at dequeue time
    Factory {
        factory: Option<FactoryHandle>,
        done: Option<oneshot::Sender<()>>,
    },
}

struct Shared {
    settings: CoordinatorSettings,
    queue: Mutex<Option<mpsc::UnboundedSender<Request>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    stopping: Arc<AtomicBool>,
    stopped: watch::Sender<bool>,
    listeners: Arc<ListenerRegistry>,
    runtime: RuntimeView,
}

/// Handle on the reconfiguration coordinator
///
/// The handle is cheap to clone; every clone talks to the same worker.
///
/// ## Lifecycle
///
/// 1. Create with [`Coordinator::spawn()`] (inside a tokio runtime)
/// 2. Feed it with [`submit_config_change()`](Coordinator::submit_config_change)
///    and [`submit_factory_change()`](Coordinator::submit_factory_change)
/// 3. Stop with [`shutdown()`](Coordinator::shutdown); this performs the
///    final teardown
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Shared>,
}

impl Coordinator {
    /// Spawn the worker and return a handle on it
    ///
    /// # Parameters
    ///
    /// - `settings`: Coordinator settings
    /// - `services`: Host publication surface for the façade and runtime view
    ///
    /// # Returns
    ///
    /// A tuple of (coordinator, event_receiver) where event_receiver yields coordinator events
    pub fn spawn(
        settings: CoordinatorSettings,
        services: Arc<dyn ServiceRegistry>,
    ) -> Result<(Self, mpsc::Receiver<CoordinatorEvent>)> {
        settings.validate()?;

        let (event_tx, event_rx) = mpsc::channel(settings.event_channel_capacity);
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let listeners = Arc::new(ListenerRegistry::new());
        let runtime = RuntimeView::new();
        let stopping = Arc::new(AtomicBool::new(false));

        let redactor = Redactor::new(&settings.redacted_key_markers);
        let builder = LifecycleBuilder::new(
            services,
            Arc::clone(&listeners),
            redactor.clone(),
            settings.defaults.clone(),
        );

        let worker = Worker {
            state: ReconciliationState::default(),
            builder,
            redactor,
            runtime: runtime.clone(),
            events: event_tx,
            stopping: Arc::clone(&stopping),
        };
        let handle = tokio::spawn(worker.run(queue_rx));

        let managed = settings.managed_configuration;
        let coordinator = Self {
            inner: Arc::new(Shared {
                settings,
                queue: Mutex::new(Some(queue_tx)),
                worker: Mutex::new(Some(handle)),
                stopping,
                stopped: watch::Sender::new(false),
                listeners,
                runtime,
            }),
        };

        if !managed {
            info!("No configuration source, bootstrapping with default configuration");
            coordinator.enqueue(Request::Config(ConfigSnapshot::default()));
        }

        Ok((coordinator, event_rx))
    }

    /// Schedule a reconfiguration because the configuration changed
    ///
    /// Returns immediately; the current factory is kept.
    pub fn submit_config_change(&self, snapshot: ConfigSnapshot) {
        info!("Scheduling reconfiguration because configuration has changed");
        self.enqueue(Request::Config(snapshot));
    }

    /// Schedule a reconfiguration because the backend factory changed
    ///
    /// The current snapshot is kept. For `Some(factory)` this returns as soon
    /// as the request is queued. For `None` it additionally waits, up to the
    /// configured factory removal timeout, until the controller built by the
    /// departing factory has been torn down. A timeout is logged, never
    /// returned.
    pub async fn submit_factory_change(&self, factory: Option<FactoryHandle>) {
        let Some(factory) = factory else {
            info!("Scheduling reconfiguration because backend factory has been unregistered");
            self.remove_factory_and_wait().await;
            return;
        };

        info!(
            "Scheduling reconfiguration because backend factory {} is available",
            factory.name()
        );
        self.enqueue(Request::Factory {
            factory: Some(factory),
            done: None,
        });
    }

    async fn remove_factory_and_wait(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        let queued = self.enqueue(Request::Factory {
            factory: None,
            done: Some(done_tx),
        });
        if !queued {
            return;
        }

        let wait = self.inner.settings.factory_removal_timeout();
        match tokio::time::timeout(wait, done_rx).await {
            Ok(Ok(())) => debug!("Backend factory removal completed"),
            Ok(Err(_)) => {
                warn!("Coordinator stopped before backend factory removal completed")
            }
            Err(_) => warn!(
                "Timed out after {:?} waiting for backend factory removal",
                wait
            ),
        }
    }

    /// Latest runtime status
    pub fn status(&self) -> Arc<RuntimeStatus> {
        self.inner.runtime.current()
    }

    /// Live, read-only view on the runtime status
    pub fn runtime_view(&self) -> RuntimeView {
        self.inner.runtime.clone()
    }

    /// Registry of listeners kept attached to the active controller
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.inner.listeners
    }

    /// Settings the coordinator runs with
    pub fn settings(&self) -> &CoordinatorSettings {
        &self.inner.settings
    }

    /// Whether [`shutdown()`](Coordinator::shutdown) has been called
    pub fn is_stopping(&self) -> bool {
        self.inner.stopping.load(Ordering::SeqCst)
    }

    /// Stop the coordinator
    ///
    /// Closes the queue, lets the worker drain what is already queued and
    /// perform the final teardown within the grace period, then abandons
    /// whatever is left. Safe to call repeatedly and from any task: every
    /// caller returns once the first one has finished stopping the worker.
    pub async fn shutdown(&self) {
        let queue = self
            .inner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if queue.is_none() {
            self.wait_until_stopped().await;
            return;
        }

        info!("Stopping coordinator");
        self.inner.stopping.store(true, Ordering::SeqCst);
        drop(queue);

        let handle = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut handle) = handle {
            let grace = self.inner.settings.shutdown_grace_period();
            debug!("...entering {:?} grace period...", grace);
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => info!("Coordinator stopped"),
                Ok(Err(e)) => error!("Coordinator worker failed: {}", e),
                Err(_) => {
                    warn!(
                        "Grace period of {:?} elapsed, abandoning remaining queued work",
                        grace
                    );
                    handle.abort();
                }
            }
        }

        self.inner.stopped.send_replace(true);
    }

    /// Wait for the shutdown started by another caller
    ///
    /// Bounded by the grace period in case that caller was cancelled.
    async fn wait_until_stopped(&self) {
        let mut stopped = self.inner.stopped.subscribe();
        let grace = self.inner.settings.shutdown_grace_period();
        match tokio::time::timeout(grace, stopped.wait_for(|done| *done)).await {
            Ok(_) => debug!("Coordinator already shut down"),
            Err(_) => warn!("Timed out after {:?} waiting for coordinator shutdown", grace),
        }
    }

    fn enqueue(&self, request: Request) -> bool {
        let queue = self
            .inner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(tx) = queue.as_ref() else {
            warn!("Coordinator is shut down, dropping reconfiguration request");
            return false;
        };
        if tx.send(request).is_err() {
            warn!("Coordinator worker is gone, dropping reconfiguration request");
            return false;
        }
        true
    }
}

#[async_trait]
impl FactorySubscriber for Coordinator {
    async fn factory_changed(&self, factory: Option<FactoryHandle>) {
        self.submit_factory_change(factory).await;
    }
}

/// The single task allowed to touch the reconciliation state
struct Worker {
    state: ReconciliationState,
    builder: LifecycleBuilder,
    redactor: Redactor,
    runtime: RuntimeView,
    events: mpsc::Sender<CoordinatorEvent>,
    stopping: Arc<AtomicBool>,
}

impl Worker {
    async fn run(mut self, mut queue: mpsc::UnboundedReceiver<Request>) {
        while let Some(request) = queue.recv().await {
            let (trigger, snapshot, factory, done) = match request {
                Request::Config(snapshot) => (
                    "change config",
                    Some(snapshot),
                    self.state.factory.clone(),
                    None,
                ),
                Request::Factory { factory, done } => (
                    "change controller",
                    self.state.snapshot.clone(),
                    factory,
                    done,
                ),
            };

            self.reconcile(snapshot, factory)
                .instrument(info_span!("reconcile", trigger))
                .await;
            self.runtime.publish(self.state.status(&self.redactor));

            if let Some(done) = done {
                let _ = done.send(());
            }
        }

        self.finish().await;
    }

    /// The only place that modifies the reconciliation state
    async fn reconcile(&mut self, snapshot: Option<ConfigSnapshot>, factory: Option<FactoryHandle>) {
        if !self.state.initialized {
            debug!("Initial configuration, recording baseline without building a controller");
            self.state.initialized = true;
            self.state.snapshot = snapshot;
            self.state.factory = factory;
            self.emit_event(CoordinatorEvent::Bootstrapped);
            return;
        }

        if self.state.is_current(snapshot.as_ref(), factory.as_ref()) {
            debug!("No change in configuration");
            self.emit_event(CoordinatorEvent::Unchanged);
            return;
        }

        log_factory_change(self.state.factory.as_ref(), factory.as_ref());

        self.retire_active().await;

        let had_factory = self.state.factory.is_some();
        self.state.snapshot = snapshot;
        self.state.factory = factory;
        self.state.generation += 1;

        let Some(factory) = self.state.factory.clone() else {
            if had_factory {
                info!("Backend factory is gone, HTTP facade is not available now");
            }
            self.emit_event(CoordinatorEvent::FactoryUnavailable);
            return;
        };

        match self
            .builder
            .build(self.state.snapshot.as_ref(), &factory, &self.runtime)
            .await
        {
            Ok(active) => {
                let controller = active.controller.name().to_string();
                info!("HTTP facade published by {} ({})", controller, active.backend);
                self.emit_event(CoordinatorEvent::FacadePublished {
                    backend: active.backend.clone(),
                    controller,
                });
                self.state.last_error = None;
                self.state.active = Some(active);
            }
            Err(e) => {
                self.state.last_error = Some(e.to_string());
                if self.stopping.load(Ordering::SeqCst) {
                    return;
                }
                error!("Unable to start HTTP facade: {}", e);
                self.emit_event(CoordinatorEvent::BuildFailed {
                    error: e.to_string(),
                });
            }
        }
    }

    async fn retire_active(&mut self) {
        if let Some(active) = self.state.active.take() {
            let controller = active.controller.name().to_string();
            self.builder.teardown(active).await;
            self.emit_event(CoordinatorEvent::FacadeRetracted);
            self.emit_event(CoordinatorEvent::ControllerStopped { controller });
        }
    }

    /// Final teardown once the queue is closed and drained
    async fn finish(&mut self) {
        if self.state.active.is_some() {
            info!("Final teardown of HTTP facade");
            self.retire_active().await;
        }
        self.runtime.publish(self.state.status(&self.redactor));
        self.emit_event(CoordinatorEvent::ShutDown);
    }

    fn emit_event(&self, event: CoordinatorEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.events.try_send(event) {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

fn log_factory_change(previous: Option<&FactoryHandle>, next: Option<&FactoryHandle>) {
    match (previous, next) {
        (Some(old), None) => info!("Reconfiguring because backend factory {} has been unregistered", old.name()),
        (Some(old), Some(new)) if old != new => info!(
            "Reconfiguring because backend factory {} has been replaced by {}",
            old.name(),
            new.name()
        ),
        (None, Some(new)) => info!("Reconfiguring because backend factory {} has been registered", new.name()),
        _ => info!("Reconfiguring because configuration has changed"),
    }
}
