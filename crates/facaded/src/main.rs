// # facaded - HTTP Facade Daemon
//
// Thin integration layer hosting the facade coordinator. All reconciliation
// logic lives in facade-core; this binary only:
// 1. Reads configuration from environment variables
// 2. Initializes logging and the runtime
// 3. Wires the coordinator to the factory registry and publication surface
// 4. Shuts everything down in order on SIGTERM/SIGINT
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Coordinator
// - `FACADE_FACTORY_TIMEOUT_SECS`: Wait bound for backend factory removal (default 20)
// - `FACADE_SHUTDOWN_GRACE_SECS`: Grace period for queued work on shutdown (default 20)
// - `FACADE_MANAGED_CONFIG`: `false` to bootstrap with defaults only (default true)
// - `FACADE_REDACT_MARKERS`: Comma-separated secret key markers
//
// ### HTTP configuration
// - `FACADE_CFG_<KEY>`: One configuration property each; `FACADE_CFG_HTTP_PORT=8080`
//   becomes `http.port = 8080`. Values are parsed as JSON when possible.
//
// ### Logging
// - `FACADE_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export FACADE_CFG_HTTP_PORT=8080
// export FACADE_CFG_HTTP_KEYSTORE_PASSWORD=changeit
// export FACADE_LOG_LEVEL=debug
//
// facaded
// ```

use anyhow::Result;
use facade_core::{
    ConfigSnapshot, Coordinator, CoordinatorEvent, CoordinatorSettings, FactoryRegistry,
    InMemoryServiceRegistry,
};
use serde_json::Value;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Prefix of environment variables carrying configuration properties
const CONFIG_PREFIX: &str = "FACADE_CFG_";

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum FacadeExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<FacadeExitCode> for ExitCode {
    fn from(code: FacadeExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    settings: CoordinatorSettings,
    snapshot: ConfigSnapshot,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let mut settings = CoordinatorSettings::default();

        if let Some(secs) = parse_var("FACADE_FACTORY_TIMEOUT_SECS")? {
            settings.factory_removal_timeout_secs = secs;
        }
        if let Some(secs) = parse_var("FACADE_SHUTDOWN_GRACE_SECS")? {
            settings.shutdown_grace_period_secs = secs;
        }
        if let Some(managed) = parse_var("FACADE_MANAGED_CONFIG")? {
            settings.managed_configuration = managed;
        }
        if let Ok(markers) = env::var("FACADE_REDACT_MARKERS") {
            settings.redacted_key_markers = markers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        Ok(Self {
            settings,
            snapshot: snapshot_from_vars(env::vars()),
            log_level: env::var("FACADE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.settings.validate()?;

        if self.settings.factory_removal_timeout_secs > 300 {
            anyhow::bail!(
                "FACADE_FACTORY_TIMEOUT_SECS must be at most 300 seconds. Got: {}",
                self.settings.factory_removal_timeout_secs
            );
        }

        if self.settings.shutdown_grace_period_secs > 300 {
            anyhow::bail!(
                "FACADE_SHUTDOWN_GRACE_SECS must be at most 300 seconds. Got: {}",
                self.settings.shutdown_grace_period_secs
            );
        }

        if !self.settings.managed_configuration && !self.snapshot.is_empty() {
            anyhow::bail!(
                "FACADE_CFG_* properties require FACADE_MANAGED_CONFIG=true. \
                With an unmanaged configuration only defaults are used."
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "FACADE_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }
}

/// Parse an optional environment variable
fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", name, raw, e)),
        Err(_) => Ok(None),
    }
}

/// Collect `FACADE_CFG_<KEY>` variables into a snapshot
///
/// `FACADE_CFG_HTTP_PORT=8080` becomes `http.port = 8080`; values that are not
/// valid JSON are kept as strings.
fn snapshot_from_vars<I>(vars: I) -> ConfigSnapshot
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter()
        .filter_map(|(name, raw)| {
            let key = name.strip_prefix(CONFIG_PREFIX)?;
            if key.is_empty() {
                return None;
            }
            let key = key.to_lowercase().replace('_', ".");
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            Some((key, value))
        })
        .collect()
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return FacadeExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return FacadeExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return FacadeExitCode::ConfigError.into();
    }

    info!("Starting facaded daemon");
    info!("Configuration loaded: {} HTTP properties", config.snapshot.len());

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return FacadeExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {}", e);
            FacadeExitCode::RuntimeError
        } else {
            FacadeExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let managed = config.settings.managed_configuration;

    let services = InMemoryServiceRegistry::new();
    let (coordinator, events) = Coordinator::spawn(config.settings, Arc::new(services.clone()))?;
    let event_log = tokio::spawn(log_events(events));

    // Backend crates register their factories here
    let factories = FactoryRegistry::new();
    factories.subscribe(Arc::new(coordinator.clone())).await;

    if managed {
        coordinator.submit_config_change(config.snapshot);
    }

    if factories.active().await.is_none() {
        warn!("No backend factory registered, HTTP facade stays unavailable until one is");
    }

    info!("Daemon initialized successfully");

    let signal = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal);
    info!("Shutting down daemon");

    // withdrawing the factory tears the controller down synchronously
    factories.close().await;
    coordinator.shutdown().await;

    if let Some(facade) = services.facade() {
        warn!("HTTP facade still published by {}", facade.controller.name());
    }

    // the worker dropped its sender, so the log task ends on its own
    if let Err(e) = event_log.await {
        error!("Event log task failed: {}", e);
    }

    Ok(())
}

/// Forward coordinator events to the log
async fn log_events(mut events: mpsc::Receiver<CoordinatorEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            CoordinatorEvent::FacadePublished { backend, controller } => {
                info!("HTTP facade available through {} ({})", controller, backend)
            }
            CoordinatorEvent::BuildFailed { error } => {
                warn!("HTTP facade unavailable: {}", error)
            }
            CoordinatorEvent::FactoryUnavailable => {
                info!("HTTP facade unavailable: no backend factory")
            }
            CoordinatorEvent::ShutDown => info!("Coordinator finished final teardown"),
            other => tracing::debug!("Coordinator event: {:?}", other),
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    // Set up signal handlers for SIGTERM and SIGINT
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
