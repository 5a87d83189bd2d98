//! Error types for the facade coordinator
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for facade operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the facade coordinator
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend factory could not create a controller
    #[error("Backend factory error: {0}")]
    Factory(String),

    /// Controller lifecycle failure (configure/start/stop)
    #[error("Controller error ({controller}): {message}")]
    Controller {
        /// Controller name
        controller: String,
        /// Error message
        message: String,
    },

    /// Publishing or retracting a service registration failed
    #[error("Registration error: {0}")]
    Registration(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a backend factory error
    pub fn factory(msg: impl Into<String>) -> Self {
        Self::Factory(msg.into())
    }

    /// Create a controller error
    pub fn controller(controller: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Controller {
            controller: controller.into(),
            message: message.into(),
        }
    }

    /// Create a registration error
    pub fn registration(msg: impl Into<String>) -> Self {
        Self::Registration(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
