//! Test doubles and common utilities for coordinator contract tests
//!
//! The doubles share one ordered [`Journal`] so tests can assert on the exact
//! interleaving of factory, controller, listener and registry calls.

#![allow(dead_code)]

use async_trait::async_trait;
use facade_core::error::{Error, Result};
use facade_core::publish::InMemoryServiceRegistry;
use facade_core::traits::{
    BackendFactory, ControllerState, FactoryHandle, PublishedService, Registration,
    ServerController, ServerEvent, ServerListener, ServiceRegistry,
};
use facade_core::{
    ConfigSnapshot, Coordinator, CoordinatorEvent, CoordinatorSettings, RuntimeStatus,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Ordered log of calls shared by all doubles of one test
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Index of the first entry equal to `entry`
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    /// Number of entries starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.entries().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Tracks how many controllers are started at the same time
#[derive(Default)]
pub struct StartedGauge {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl StartedGauge {
    fn started(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn stopped(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// Knobs for injecting failures and delays into controllers
#[derive(Clone, Default)]
pub struct Behavior {
    pub fail_create: bool,
    pub fail_configure: bool,
    pub fail_start: bool,
    pub fail_stop: bool,
    pub start_delay: Option<Duration>,
    pub stop_delay: Option<Duration>,
}

/// A controller that journals every call and enforces the lifecycle
pub struct MockController {
    name: String,
    state: Mutex<ControllerState>,
    listeners: Mutex<Vec<Arc<dyn ServerListener>>>,
    behavior: Behavior,
    journal: Journal,
    gauge: Arc<StartedGauge>,
    snapshot: ConfigSnapshot,
}

impl MockController {
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Effective snapshot the controller was created with
    pub fn snapshot(&self) -> &ConfigSnapshot {
        &self.snapshot
    }

    fn transition(&self, next: ControllerState) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state == next {
            return false;
        }
        assert!(
            state.can_transition_to(next),
            "illegal transition {} -> {} on {}",
            *state,
            next,
            self.name
        );
        *state = next;
        true
    }

    fn notify(&self, event: ServerEvent) {
        let listeners = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            listener.on_event(&event);
        }
    }

    fn entered(&self, state: ControllerState) {
        self.notify(ServerEvent::StateChanged {
            controller: self.name.clone(),
            state,
        });
    }

    fn failed(&self, message: &str) -> Error {
        self.notify(ServerEvent::Failed {
            controller: self.name.clone(),
            message: message.to_string(),
        });
        Error::controller(&self.name, message)
    }
}

#[async_trait]
impl ServerController for MockController {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ControllerState {
        *self.state.lock().unwrap()
    }

    async fn configure(&self) -> Result<()> {
        self.journal.push(format!("configure:{}", self.name));
        if self.behavior.fail_configure {
            return Err(self.failed("configure failed"));
        }
        if self.transition(ControllerState::Configured) {
            self.entered(ControllerState::Configured);
        }
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.journal.push(format!("start:{}", self.name));
        if let Some(delay) = self.behavior.start_delay {
            tokio::time::sleep(delay).await;
        }
        if self.behavior.fail_start {
            return Err(self.failed("start failed"));
        }
        if self.transition(ControllerState::Started) {
            self.gauge.started();
            self.entered(ControllerState::Started);
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.journal.push(format!("stop:{}", self.name));
        if let Some(delay) = self.behavior.stop_delay {
            tokio::time::sleep(delay).await;
        }
        let was_started = self.state() == ControllerState::Started;
        if self.transition(ControllerState::Stopped) {
            if was_started {
                self.gauge.stopped();
            }
            self.entered(ControllerState::Stopped);
        }
        if self.behavior.fail_stop {
            return Err(Error::controller(&self.name, "stop failed"));
        }
        Ok(())
    }

    fn add_listener(&self, listener: Arc<dyn ServerListener>) {
        self.journal.push(format!("attach:{}", self.name));
        self.listeners.lock().unwrap().push(listener);
    }

    fn remove_listener(&self, listener: &Arc<dyn ServerListener>) {
        self.journal.push(format!("detach:{}", self.name));
        self.listeners
            .lock()
            .unwrap()
            .retain(|known| !facade_core::traits::same_listener(known, listener));
    }
}

/// A factory that builds [`MockController`]s named `<factory>#<n>`
pub struct MockFactory {
    name: &'static str,
    behavior: Mutex<Behavior>,
    journal: Journal,
    gauge: Arc<StartedGauge>,
    created: Mutex<Vec<Arc<MockController>>>,
}

impl MockFactory {
    pub fn new(name: &'static str, journal: &Journal, gauge: &Arc<StartedGauge>) -> Arc<Self> {
        Self::with_behavior(name, journal, gauge, Behavior::default())
    }

    pub fn with_behavior(
        name: &'static str,
        journal: &Journal,
        gauge: &Arc<StartedGauge>,
        behavior: Behavior,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            behavior: Mutex::new(behavior),
            journal: journal.clone(),
            gauge: Arc::clone(gauge),
            created: Mutex::new(Vec::new()),
        })
    }

    /// Change the behavior of controllers created from now on
    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn handle(self: &Arc<Self>) -> FactoryHandle {
        FactoryHandle::from(Arc::clone(self))
    }

    pub fn created(&self) -> Vec<Arc<MockController>> {
        self.created.lock().unwrap().clone()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<Arc<MockController>> {
        self.created.lock().unwrap().last().cloned()
    }
}

impl BackendFactory for MockFactory {
    fn name(&self) -> &str {
        self.name
    }

    fn create(&self, snapshot: &ConfigSnapshot) -> Result<Arc<dyn ServerController>> {
        let behavior = self.behavior.lock().unwrap().clone();
        if behavior.fail_create {
            self.journal.push(format!("create-failed:{}", self.name));
            return Err(Error::factory("create failed"));
        }

        let mut created = self.created.lock().unwrap();
        let name = format!("{}#{}", self.name, created.len() + 1);
        self.journal.push(format!("create:{}", name));

        let controller = Arc::new(MockController {
            name,
            state: Mutex::new(ControllerState::New),
            listeners: Mutex::new(Vec::new()),
            behavior,
            journal: self.journal.clone(),
            gauge: Arc::clone(&self.gauge),
            snapshot: snapshot.clone(),
        });
        created.push(Arc::clone(&controller));
        Ok(controller)
    }
}

/// A listener that journals `event:<listener>:<controller>:<state>`
pub struct RecordingListener {
    id: &'static str,
    journal: Journal,
    events: Mutex<Vec<ServerEvent>>,
}

impl RecordingListener {
    pub fn new(id: &'static str, journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            id,
            journal: journal.clone(),
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<ServerEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ServerListener for RecordingListener {
    fn on_event(&self, event: &ServerEvent) {
        let entry = match event {
            ServerEvent::StateChanged { controller, state } => {
                format!("event:{}:{}:{}", self.id, controller, state)
            }
            ServerEvent::Failed { controller, .. } => {
                format!("event:{}:{}:failed", self.id, controller)
            }
        };
        self.journal.push(entry);
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Wraps the in-memory registry and journals `register:` / `unregister:` calls
#[derive(Clone)]
pub struct JournalingServiceRegistry {
    pub inner: InMemoryServiceRegistry,
    journal: Journal,
    fail_capability: Arc<Mutex<Option<String>>>,
}

impl JournalingServiceRegistry {
    pub fn new(journal: &Journal) -> Self {
        Self {
            inner: InMemoryServiceRegistry::new(),
            journal: journal.clone(),
            fail_capability: Arc::new(Mutex::new(None)),
        }
    }

    /// Make every registration under `capability` fail
    pub fn fail_on(&self, capability: Option<&str>) {
        *self.fail_capability.lock().unwrap() = capability.map(String::from);
    }
}

impl ServiceRegistry for JournalingServiceRegistry {
    fn register(
        &self,
        capability: &str,
        service: PublishedService,
    ) -> Result<Box<dyn Registration>> {
        if self.fail_capability.lock().unwrap().as_deref() == Some(capability) {
            self.journal.push(format!("register-failed:{}", capability));
            return Err(Error::registration("injected failure"));
        }

        let registration = self.inner.register(capability, service)?;
        self.journal.push(format!("register:{}", capability));
        Ok(Box::new(JournalingRegistration {
            capability: capability.to_string(),
            journal: self.journal.clone(),
            inner: registration,
        }))
    }
}

struct JournalingRegistration {
    capability: String,
    journal: Journal,
    inner: Box<dyn Registration>,
}

impl Registration for JournalingRegistration {
    fn unregister(self: Box<Self>) {
        self.journal.push(format!("unregister:{}", self.capability));
        self.inner.unregister();
    }
}

/// Settings with short timeouts for tests
pub fn test_settings() -> CoordinatorSettings {
    CoordinatorSettings::default()
        .with_factory_removal_timeout(Duration::from_secs(2))
        .with_shutdown_grace_period(Duration::from_secs(2))
}

/// Receive the next coordinator event, failing the test after 5 seconds
pub async fn next_event(rx: &mut mpsc::Receiver<CoordinatorEvent>) -> CoordinatorEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("coordinator event within 5 seconds")
        .expect("event channel open")
}

/// Receive events until one matches `predicate`, returning everything seen
pub async fn events_until<F>(
    rx: &mut mpsc::Receiver<CoordinatorEvent>,
    predicate: F,
) -> Vec<CoordinatorEvent>
where
    F: Fn(&CoordinatorEvent) -> bool,
{
    let mut seen = Vec::new();
    loop {
        let event = next_event(rx).await;
        let done = predicate(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

/// Whether `event` is a published façade
pub fn is_published(event: &CoordinatorEvent) -> bool {
    matches!(event, CoordinatorEvent::FacadePublished { .. })
}

/// Snapshot helper: `http.port = port`
pub fn port_snapshot(port: u16) -> ConfigSnapshot {
    ConfigSnapshot::new().with("http.port", port)
}

/// Poll the coordinator's status until `predicate` holds, failing after 5 seconds
pub async fn wait_for_status<F>(coordinator: &Coordinator, predicate: F) -> Arc<RuntimeStatus>
where
    F: Fn(&RuntimeStatus) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let status = coordinator.status();
        if predicate(&status) {
            return status;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "status condition not reached, last status: {:?}",
            status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// A running coordinator wired to journaling doubles
pub struct Harness {
    pub journal: Journal,
    pub gauge: Arc<StartedGauge>,
    pub services: JournalingServiceRegistry,
    pub coordinator: Coordinator,
    pub events: mpsc::Receiver<CoordinatorEvent>,
}

impl Harness {
    /// Spawn a coordinator with [`test_settings`]
    pub fn start() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: CoordinatorSettings) -> Self {
        let journal = Journal::new();
        let services = JournalingServiceRegistry::new(&journal);
        let (coordinator, events) = Coordinator::spawn(settings, Arc::new(services.clone()))
            .expect("coordinator spawns");

        Self {
            journal,
            gauge: Arc::new(StartedGauge::default()),
            services,
            coordinator,
            events,
        }
    }

    pub fn factory(&self, name: &'static str) -> Arc<MockFactory> {
        MockFactory::new(name, &self.journal, &self.gauge)
    }

    pub fn factory_with(&self, name: &'static str, behavior: Behavior) -> Arc<MockFactory> {
        MockFactory::with_behavior(name, &self.journal, &self.gauge, behavior)
    }

    pub async fn next_event(&mut self) -> CoordinatorEvent {
        next_event(&mut self.events).await
    }

    pub async fn events_until<F>(&mut self, predicate: F) -> Vec<CoordinatorEvent>
    where
        F: Fn(&CoordinatorEvent) -> bool,
    {
        events_until(&mut self.events, predicate).await
    }

    /// Bootstrap a fresh coordinator with `snapshot` and `factory` and wait until
    /// the façade is published
    pub async fn publish(&mut self, snapshot: ConfigSnapshot, factory: &Arc<MockFactory>) {
        self.coordinator.submit_config_change(snapshot);
        self.coordinator
            .submit_factory_change(Some(factory.handle()))
            .await;
        self.events_until(is_published).await;
    }
}
