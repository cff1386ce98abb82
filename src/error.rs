//! Error types for celeriac operations.

use thiserror::Error;

/// Result type used throughout celeriac.
pub type CeleryResult<T> = Result<T, CeleryError>;

/// Boxed error type handlers may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for celeriac operations.
#[derive(Error, Debug)]
pub enum CeleryError {
    /// A task could not be represented in the wire format
    #[error("Encode error: {message}")]
    Encode {
        /// Error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<BoxError>,
    },

    /// A message received from the broker could not be decoded
    #[error("Decode error: {message}")]
    Decode {
        /// Error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<BoxError>,
    },

    /// No handler is registered for the decoded task name
    #[error("Unknown task '{name}'")]
    UnknownTask {
        /// The task name that wasn't found
        name: String,
    },

    /// Broker transport error
    #[error("Broker error: {message}")]
    Broker {
        /// Error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<BoxError>,
    },

    /// The run was cancelled while waiting on the broker
    #[error("Operation cancelled")]
    Cancelled,

    /// A handler panicked
    #[error("unexpected task error: {message}")]
    HandlerPanic {
        /// Description of the panic payload
        message: String,
    },

    /// A handler returned an error
    #[error("Task '{name}' failed: {source}")]
    TaskFailed {
        /// Name of the failed task
        name: String,
        /// Error returned by the handler
        #[source]
        source: BoxError,
    },

    /// A consume loop terminated abnormally
    #[error("Worker failed: {message}")]
    WorkerFailed {
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Error message
        message: String,
    },
}

impl CeleryError {
    /// Create a new encode error
    pub fn encode<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Encode {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new decode error
    pub fn decode<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Decode {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a decode error without an underlying cause
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new broker error
    pub fn broker<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Broker {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Whether this error is the expected shutdown signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether this error only concerns a single message.
    ///
    /// Message-level errors are logged and the delivery dropped; everything else
    /// stops the consume loop that produced it.
    pub fn is_message_local(&self) -> bool {
        matches!(
            self,
            Self::Encode { .. }
                | Self::Decode { .. }
                | Self::UnknownTask { .. }
                | Self::HandlerPanic { .. }
                | Self::TaskFailed { .. }
        )
    }
}
