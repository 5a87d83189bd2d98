//! Configuration types for the facade coordinator
//!
//! This module defines the coordinator's own settings. The server
//! configuration it reconciles is not described here: it arrives as opaque
//! [`ConfigSnapshot`] values.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::snapshot::ConfigSnapshot;

/// Coordinator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorSettings {
    /// How long `submit_factory_change(None)` waits for the teardown (in seconds)
    #[serde(default = "default_factory_removal_timeout_secs")]
    pub factory_removal_timeout_secs: u64,

    /// Grace period granted to queued work on shutdown (in seconds)
    #[serde(default = "default_shutdown_grace_period_secs")]
    pub shutdown_grace_period_secs: u64,

    /// Capacity of the coordinator event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Whether an external configuration source will push snapshots
    ///
    /// When `false`, the coordinator bootstraps itself with an empty snapshot
    /// as soon as it is spawned.
    #[serde(default = "default_managed_configuration")]
    pub managed_configuration: bool,

    /// Case-insensitive key fragments marking a configuration value as secret
    #[serde(default = "default_redacted_key_markers")]
    pub redacted_key_markers: Vec<String>,

    /// Properties every controller sees unless the snapshot overrides them
    #[serde(default)]
    pub defaults: ConfigSnapshot,

    /// Sub-second override of `factory_removal_timeout_secs`
    #[serde(skip)]
    factory_removal_timeout: Option<Duration>,

    /// Sub-second override of `shutdown_grace_period_secs`
    #[serde(skip)]
    shutdown_grace_period: Option<Duration>,
}

impl CoordinatorSettings {
    /// Create settings with defaults
    pub fn new() -> Self {
        Self {
            factory_removal_timeout_secs: default_factory_removal_timeout_secs(),
            shutdown_grace_period_secs: default_shutdown_grace_period_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            managed_configuration: default_managed_configuration(),
            redacted_key_markers: default_redacted_key_markers(),
            defaults: ConfigSnapshot::default(),
            factory_removal_timeout: None,
            shutdown_grace_period: None,
        }
    }

    /// Set the factory removal wait with full precision
    pub fn with_factory_removal_timeout(mut self, timeout: Duration) -> Self {
        self.factory_removal_timeout = Some(timeout);
        self
    }

    /// Set the shutdown grace period with full precision
    pub fn with_shutdown_grace_period(mut self, grace: Duration) -> Self {
        self.shutdown_grace_period = Some(grace);
        self
    }

    /// Set whether an external configuration source is present
    pub fn with_managed_configuration(mut self, managed: bool) -> Self {
        self.managed_configuration = managed;
        self
    }

    /// Set the default properties
    pub fn with_defaults(mut self, defaults: ConfigSnapshot) -> Self {
        self.defaults = defaults;
        self
    }

    /// Effective factory removal wait
    pub fn factory_removal_timeout(&self) -> Duration {
        self.factory_removal_timeout
            .unwrap_or_else(|| Duration::from_secs(self.factory_removal_timeout_secs))
    }

    /// Effective shutdown grace period
    pub fn shutdown_grace_period(&self) -> Duration {
        self.shutdown_grace_period
            .unwrap_or_else(|| Duration::from_secs(self.shutdown_grace_period_secs))
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.factory_removal_timeout().is_zero() {
            return Err(crate::Error::config("Factory removal timeout must be > 0"));
        }
        if self.shutdown_grace_period().is_zero() {
            return Err(crate::Error::config("Shutdown grace period must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.redacted_key_markers.iter().all(|m| m.trim().is_empty()) {
            return Err(crate::Error::config(
                "At least one redacted key marker is required",
            ));
        }

        Ok(())
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::new()
    }
}

fn default_factory_removal_timeout_secs() -> u64 {
    20
}

fn default_shutdown_grace_period_secs() -> u64 {
    20
}

fn default_event_channel_capacity() -> usize {
    100
}

fn default_managed_configuration() -> bool {
    true
}

fn default_redacted_key_markers() -> Vec<String> {
    ["password", "secret", "passphrase", "token", "credential", "private_key"]
        .into_iter()
        .map(String::from)
        .collect()
}
