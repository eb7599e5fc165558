//! Error types for the call-log bridge
//!
//! Every failure that reaches the host crosses the channel as a stable
//! string code plus a human readable message. [`BridgeError::code`] is the
//! single source of those codes.

use thiserror::Error;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors that can be delivered through a result sink
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// A method call arrived while another one is still outstanding
    #[error("A method call is already running.")]
    AlreadyRunning,

    /// A required capability was denied or could not be requested
    #[error("{reason}")]
    PermissionNotGranted { reason: String },

    /// A required argument is absent from the call payload
    #[error("Missing {argument} argument")]
    MissingArgs { argument: String },

    /// An argument is present but cannot be interpreted
    #[error("Invalid {argument} argument: {reason}")]
    InvalidArgs { argument: String, reason: String },

    /// The platform service backing the operation is not available
    #[error("{message}")]
    Unavailable { message: String },

    /// The platform version does not support the operation
    #[error("Platform API level {actual} does not support this operation (requires {required})")]
    UnsupportedVersion { required: u32, actual: u32 },

    /// A collaborator failed to produce a usable result
    #[error("{message}")]
    Internal { message: String },

    /// The method name is not part of the channel contract
    #[error("Method not implemented: {method}")]
    NotImplemented { method: String },

    /// A suspended request gave up waiting
    #[error("Operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl BridgeError {
    /// Stable wire code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyRunning => "ALREADY_RUNNING",
            Self::PermissionNotGranted { .. } => "PERMISSION_NOT_GRANTED",
            // Hosts only know one argument failure code.
            Self::MissingArgs { .. } | Self::InvalidArgs { .. } => "MISSING_ARGS",
            Self::Unavailable { .. } => "UNAVAILABLE",
            Self::UnsupportedVersion { .. } => "UNSUPPORTED_VERSION",
            Self::Internal { .. } => "INTERNAL_ERROR",
            Self::NotImplemented { .. } => "NOT_IMPLEMENTED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
        }
    }

    /// Create a permission error
    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Self::PermissionNotGranted {
            reason: reason.into(),
        }
    }

    /// Create a missing argument error
    pub fn missing_arg(argument: impl Into<String>) -> Self {
        Self::MissingArgs {
            argument: argument.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_arg(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgs {
            argument: argument.into(),
            reason: reason.into(),
        }
    }

    /// Create an unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a not-implemented error
    pub fn not_implemented(method: impl Into<String>) -> Self {
        Self::NotImplemented {
            method: method.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Failure reported by a call-log store
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store returned no cursor at all
    #[error("call log provider returned no result")]
    NoResult,

    /// The store is present but the query failed
    #[error("call log query failed: {0}")]
    Query(String),
}

impl From<StoreError> for BridgeError {
    fn from(err: StoreError) -> Self {
        tracing::warn!(target: crate::LOG_TARGET, "call log store failure: {}", err);
        BridgeError::internal("Error querying call logs.")
    }
}
