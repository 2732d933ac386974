use std::collections::HashMap;
use thiserror::Error;

/// Unified error type for the latch engine.
///
/// Expected terminal states of a hook (failure, timeout, rejection, reset) are
/// *not* errors; they are [`HookOutcome`](crate::coord::types::HookOutcome)
/// variants that callers pattern-match. `LatchError` is reserved for engine
/// malfunction: invalid configuration, registry problems, closed channels.
#[derive(Debug, Error)]
pub enum LatchError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Hook registry errors (missing handler, bad executable path)
    #[error("Registry error: {message}")]
    Registry {
        message: String,
        hook_type: Option<String>,
    },

    /// Internal channel errors (scheduler dropped, reply lost)
    #[error("Channel closed during {operation}")]
    ChannelClosed { operation: String },

    /// IO errors (process spawn, pipe capture)
    #[error("IO operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization errors
    #[error("Serialization failed: {format}")]
    Serialization {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        context: HashMap<String, String>,
    },
}

impl LatchError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            field: None,
        }
    }

    /// Create a configuration error with field
    pub fn configuration_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Configuration {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a registry error
    pub fn registry<S: Into<String>>(message: S) -> Self {
        Self::Registry {
            message: message.into(),
            hook_type: None,
        }
    }

    /// Create a registry error scoped to a hook type
    pub fn registry_hook<S: Into<String>, H: Into<String>>(message: S, hook_type: H) -> Self {
        Self::Registry {
            message: message.into(),
            hook_type: Some(hook_type.into()),
        }
    }

    /// Create a channel error
    pub fn channel_closed<S: Into<String>>(operation: S) -> Self {
        Self::ChannelClosed {
            operation: operation.into(),
        }
    }

    /// Create an IO error
    pub fn io<S: Into<String>>(operation: S, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
            context: HashMap::new(),
        }
    }

    /// Add context to an internal error
    pub fn with_context<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        if let Self::Internal {
            ref mut context, ..
        } = self
        {
            context.insert(key.into(), value.into());
        }
        self
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io { .. } => true,
            Self::Configuration { .. } | Self::Registry { .. } => false,
            Self::ChannelClosed { .. } => false,
            Self::Serialization { .. } => false,
            Self::Internal { .. } => false,
        }
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Registry { .. } => "registry",
            Self::ChannelClosed { .. } => "channel",
            Self::Io { .. } => "io",
            Self::Serialization { .. } => "serialization",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, LatchError>;

impl From<std::io::Error> for LatchError {
    fn from(err: std::io::Error) -> Self {
        Self::io("io_operation", err)
    }
}

impl From<serde_json::Error> for LatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "json".to_string(),
            source: Box::new(err),
        }
    }
}

impl From<anyhow::Error> for LatchError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string()).with_context("source", "anyhow")
    }
}
