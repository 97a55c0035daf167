//! Error types for the touch bar controller.

use crate::channel::Interface;

/// Errors reported by a command transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The control endpoint stalled; the command may be retried.
    #[error("Endpoint stalled")]
    Stall,

    /// The interface the command is addressed to is not connected.
    #[error("Interface not connected")]
    NotConnected,

    /// The transfer failed for any other reason.
    #[error("Transfer failed (error code: {0})")]
    Transfer(i32),

    /// Taking a power-management reference failed.
    #[error("Failed to acquire power reference (error code: {0})")]
    Power(i32),
}

impl ChannelError {
    /// Whether this error is the retryable stall condition.
    pub fn is_stall(&self) -> bool {
        matches!(self, Self::Stall)
    }
}

/// Errors from the configuration surface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A value was outside its documented range.
    #[error("Invalid {name} value {value} (expected {min}-{max})")]
    OutOfRange {
        /// The setting name.
        name: &'static str,
        /// The rejected value.
        value: i64,
        /// Minimum allowed value.
        min: i64,
        /// Maximum allowed value.
        max: i64,
    },

    /// A value could not be parsed as an integer.
    #[error("Invalid {name} value '{value}'")]
    Parse {
        /// The setting name.
        name: &'static str,
        /// The text that failed to parse.
        value: String,
    },

    /// No attribute has the given name.
    #[error("Unknown attribute '{0}'")]
    UnknownAttribute(String),
}

/// Errors that can occur when driving the touch bar controller.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// The interface was attached twice.
    #[error("{0} interface already attached")]
    AlreadyAttached(Interface),

    /// The interface was detached without being attached.
    #[error("{0} interface not attached")]
    NotAttached(Interface),

    /// A configuration value was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An I/O error occurred (e.g., spawning the worker thread).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
