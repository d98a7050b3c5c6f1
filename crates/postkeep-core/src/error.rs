//! Error types for postkeep.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How the pipeline should react to an error.
///
/// Mirrors the three outcomes a persistence call can have besides success:
/// retry/defer, skip the offending input, or abort the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Backend unreachable or lock currently held. Never fatal on its own.
    Transient,
    /// The record or file is unusable. Skip it and keep going.
    MalformedInput,
    /// The session cannot continue.
    Fatal,
}

/// A shared error type for the whole postkeep workspace.
///
/// This provides typed, structured error variants with automatic conversion
/// from common error types via the `From` trait.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum PostkeepError {
    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON"
        message: String,
    },

    /// The shared backend could not be reached, or answered with a retryable status.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// A session file lock could not be acquired within the configured timeout.
    #[error("Lock busy: {path} (waited {waited_ms}ms)")]
    LockBusy { path: String, waited_ms: u64 },

    /// The shared backend rejected a request.
    #[error("Data access error: {0}")]
    DataAccess(String),

    /// Input that cannot be persisted (missing record id, corrupt file, ...)
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Session state machine violation
    #[error("Invalid session transition: {session_id} {from} -> {to}")]
    InvalidTransition {
        session_id: String,
        from: String,
        to: String,
    },

    /// The record producer failed before signalling completion
    #[error("Producer error: {0}")]
    Producer(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PostkeepError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates an Unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Creates a MalformedInput error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput(message.into())
    }

    /// Creates a Producer error
    pub fn producer(message: impl Into<String>) -> Self {
        Self::Producer(message.into())
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a DataAccess error
    pub fn data_access(message: impl Into<String>) -> Self {
        Self::DataAccess(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Classification
    // ============================================================================

    /// Classifies this error for the pipeline's retry/skip/abort policy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Unavailable(_) | Self::LockBusy { .. } => ErrorClass::Transient,
            Self::MalformedInput(_) | Self::Serialization { .. } => ErrorClass::MalformedInput,
            _ => ErrorClass::Fatal,
        }
    }

    /// Check if this is a transient error
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Check if this is a malformed-input error
    pub fn is_malformed(&self) -> bool {
        self.class() == ErrorClass::MalformedInput
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for PostkeepError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for PostkeepError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for PostkeepError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for PostkeepError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// Conversion from anyhow::Error, for collaborators that report untyped errors.
impl From<anyhow::Error> for PostkeepError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// A type alias for `Result<T, PostkeepError>`.
pub type Result<T> = std::result::Result<T, PostkeepError>;
