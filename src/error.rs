//! Error types and handling for Chargeflow
//!
//! This module defines the error types used throughout the crate. Every
//! user-facing failure of the charging flow maps to one variant here so
//! callers can render a message string instead of a raw error.

use thiserror::Error;

/// Result type alias for Chargeflow operations
pub type Result<T> = std::result::Result<T, ChargeflowError>;

/// Main error type for Chargeflow
///
/// The type is `Clone` because the outcome of a session stop is shared
/// between every caller that raced to stop the same session.
#[derive(Debug, Clone, Error)]
pub enum ChargeflowError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Bad user input (missing vehicle, malformed target, ...)
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Another session is still in progress for this principal
    #[error("Active session exists: {session_id}")]
    ActiveSessionExists { session_id: i64 },

    /// Battery already full or target below the current state of charge
    #[error("Invalid charge target: {message}")]
    InvalidChargeTarget { message: String },

    /// Port could not be reserved
    #[error("Port {port_id} unavailable: {message}")]
    PortUnavailable { port_id: i64, message: String },

    /// Port status could not be flipped back to free
    #[error("Port {port_id} update failed: {message}")]
    PortUpdateFailed { port_id: i64, message: String },

    /// Session never started and the compensating port release failed too
    #[error("Port {port_id} could not be freed after failure ({original}); reset error: {reset}")]
    PortResetFailed {
        port_id: i64,
        original: Box<ChargeflowError>,
        reset: Box<ChargeflowError>,
    },

    /// Remote session record could not be created
    #[error("Session create error: {message}")]
    SessionCreate { message: String },

    /// Remote session record could not be completed
    #[error("Session finalize error: {message}")]
    SessionFinalize { message: String },

    /// Periodic progress reconciliation failed
    #[error("Sync error: {message}")]
    Sync { message: String },

    /// Network-related errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Backend replied with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl ChargeflowError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new invalid charge target error
    pub fn invalid_target<S: Into<String>>(message: S) -> Self {
        Self::InvalidChargeTarget {
            message: message.into(),
        }
    }

    /// Create a new port unavailable error
    pub fn port_unavailable<S: Into<String>>(port_id: i64, message: S) -> Self {
        Self::PortUnavailable {
            port_id,
            message: message.into(),
        }
    }

    /// Create a new port update error
    pub fn port_update<S: Into<String>>(port_id: i64, message: S) -> Self {
        Self::PortUpdateFailed {
            port_id,
            message: message.into(),
        }
    }

    /// Wrap the original failure together with the failed compensation
    pub fn port_reset(port_id: i64, original: Self, reset: Self) -> Self {
        Self::PortResetFailed {
            port_id,
            original: Box::new(original),
            reset: Box::new(reset),
        }
    }

    /// Create a new session create error
    pub fn session_create<S: Into<String>>(message: S) -> Self {
        Self::SessionCreate {
            message: message.into(),
        }
    }

    /// Create a new session finalize error
    pub fn session_finalize<S: Into<String>>(message: S) -> Self {
        Self::SessionFinalize {
            message: message.into(),
        }
    }

    /// Create a new sync error
    pub fn sync<S: Into<String>>(message: S) -> Self {
        Self::Sync {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(status: u16, message: S) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Innermost message, without the variant prefix
    pub fn detail(&self) -> String {
        match self {
            Self::Config { message }
            | Self::InvalidChargeTarget { message }
            | Self::PortUnavailable { message, .. }
            | Self::PortUpdateFailed { message, .. }
            | Self::SessionCreate { message }
            | Self::SessionFinalize { message }
            | Self::Sync { message }
            | Self::Network { message }
            | Self::Api { message, .. }
            | Self::Serialization { message }
            | Self::Io { message }
            | Self::Validation { message, .. } => message.clone(),
            Self::ActiveSessionExists { session_id } => {
                format!("session {session_id} is still in progress")
            }
            Self::PortResetFailed { original, .. } => original.detail(),
        }
    }

    /// Message shown to the user (inline for validation, toast otherwise)
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { message, .. } | Self::InvalidChargeTarget { message } => {
                message.clone()
            }
            Self::ActiveSessionExists { .. } => {
                "You already have an active charging session. Stop it before starting a new one."
                    .to_string()
            }
            Self::PortUnavailable { .. } => {
                "This port is not available right now. Choose another port.".to_string()
            }
            Self::PortUpdateFailed { port_id, .. } => {
                format!("Port {port_id} could not be updated.")
            }
            Self::PortResetFailed { port_id, original, .. } => format!(
                "Charging did not start ({}). Port {port_id} is still marked as busy, please contact support.",
                original.detail()
            ),
            Self::SessionCreate { message } => {
                format!("Could not start the charging session: {message}. Please try again.")
            }
            Self::SessionFinalize { message } => {
                format!("Could not stop the charging session: {message}. Please try again.")
            }
            other => other.to_string(),
        }
    }

    /// Whether the failure left remote state that needs manual/admin cleanup
    pub const fn needs_admin_follow_up(&self) -> bool {
        matches!(self, Self::PortResetFailed { .. })
    }
}

impl From<std::io::Error> for ChargeflowError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for ChargeflowError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ChargeflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for ChargeflowError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Serialization {
                message: err.to_string(),
            }
        } else {
            Self::network(err.to_string())
        }
    }
}
