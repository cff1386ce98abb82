//! Configuration types for celeriac.
//!
//! This module contains all configuration structures used throughout celeriac,
//! including the wire protocol settings, broker selection and logging.

use crate::error::{CeleryError, CeleryResult};
use crate::protocol::{JSON_MIME, ProtocolVersion};
use serde::{Deserialize, Serialize};

/// Main configuration for celeriac.
///
/// # Examples
///
/// ```rust
/// use celeriac::config::{AppConfig, BrokerConfig, CeleryConfig};
/// use celeriac::protocol::ProtocolVersion;
///
/// // Use default configuration
/// let config = CeleryConfig::default();
///
/// // Custom configuration
/// let config = CeleryConfig {
///     app: AppConfig::default().with_protocol(ProtocolVersion::V1),
///     broker: BrokerConfig::in_memory().with_max_size(10_000),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CeleryConfig {
    /// Message format configuration
    pub app: AppConfig,

    /// Broker backend configuration
    pub broker: BrokerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Message format configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Protocol version used for outgoing messages
    pub protocol: ProtocolVersion,

    /// MIME type of outgoing message bodies
    pub mime: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolVersion::V2,
            mime: JSON_MIME.to_string(),
        }
    }
}

impl AppConfig {
    /// Set the outgoing protocol version.
    pub fn with_protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the outgoing body MIME type.
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = mime.into();
        self
    }
}

/// Broker configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Backend selection
    pub backend: BrokerBackendConfig,

    /// Maximum pending messages per in-memory queue (0 = unlimited)
    pub max_queue_size: usize,
}

impl BrokerConfig {
    /// Create configuration for the in-memory broker.
    pub fn in_memory() -> Self {
        Self {
            backend: BrokerBackendConfig::InMemory,
            ..Default::default()
        }
    }

    /// Create configuration for the Redis broker.
    #[cfg(feature = "redis-broker")]
    #[cfg_attr(docsrs, doc(cfg(feature = "redis-broker")))]
    pub fn redis(connection_string: impl Into<String>) -> Self {
        Self {
            backend: BrokerBackendConfig::Redis(RedisConfig {
                connection_string: connection_string.into(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Set the maximum queue size.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_queue_size = max_size;
        self
    }
}

/// Broker backend-specific configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum BrokerBackendConfig {
    /// In-memory broker (default)
    #[default]
    InMemory,

    /// Redis broker configuration
    #[cfg(feature = "redis-broker")]
    #[cfg_attr(docsrs, doc(cfg(feature = "redis-broker")))]
    Redis(RedisConfig),
}

/// Redis broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection string (e.g., "redis://localhost:6379")
    pub connection_string: String,

    /// Seconds each `BRPOP` blocks before it is reissued
    pub receive_timeout_secs: u64,

    /// Idle receive connections kept for reuse
    pub pool_size: usize,

    /// Seconds to wait for the initial connection
    pub connect_timeout_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            connection_string: "redis://localhost:6379".to_string(),
            receive_timeout_secs: 1,
            pool_size: 4,
            connect_timeout_secs: 10,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter
    pub level: LogLevel,

    /// Enable structured JSON logging
    pub json_format: bool,

    /// Enable colored output (ignored if json_format is true)
    pub colored: bool,

    /// Include timestamps in logs
    pub include_timestamps: bool,

    /// Include target module in logs
    pub include_targets: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json_format: false,
            colored: true,
            include_timestamps: true,
            include_targets: false,
        }
    }
}

impl LoggingConfig {
    /// Set the log level.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Switch JSON output on or off.
    pub fn with_json(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    /// Install a global `tracing` subscriber built from this configuration.
    ///
    /// Fails if a global subscriber is already set.
    pub fn init_subscriber(&self) -> CeleryResult<()> {
        let builder = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::from(self.level))
            .with_target(self.include_targets);

        let result = match (self.json_format, self.include_timestamps) {
            (true, true) => builder.json().try_init(),
            (true, false) => builder.json().without_time().try_init(),
            (false, true) => builder.with_ansi(self.colored).try_init(),
            (false, false) => builder.with_ansi(self.colored).without_time().try_init(),
        };

        result.map_err(|e| CeleryError::config(format!("failed to install subscriber: {}", e)))
    }
}

/// Log level enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl CeleryConfig {
    /// Create a new configuration optimized for development.
    pub fn development() -> Self {
        Self {
            app: AppConfig::default(),
            broker: BrokerConfig {
                max_queue_size: 1000,
                ..Default::default()
            },
            logging: LoggingConfig {
                level: LogLevel::Debug,
                colored: true,
                include_targets: true,
                ..Default::default()
            },
        }
    }

    /// Create a new configuration optimized for production.
    pub fn production() -> Self {
        Self {
            app: AppConfig::default(),
            broker: BrokerConfig {
                max_queue_size: 0, // unlimited
                ..Default::default()
            },
            logging: LoggingConfig {
                level: LogLevel::Info,
                json_format: true,
                colored: false,
                include_timestamps: true,
                include_targets: false,
            },
        }
    }

    /// Create a configuration for testing.
    pub fn testing() -> Self {
        Self {
            app: AppConfig::default(),
            broker: BrokerConfig {
                max_queue_size: 100,
                ..Default::default()
            },
            logging: LoggingConfig {
                level: LogLevel::Debug,
                colored: false,
                include_timestamps: false,
                include_targets: true,
                ..Default::default()
            },
        }
    }

    /// Validate the configuration and return any errors.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.app.mime.trim().is_empty() {
            errors.push("Body MIME type must not be empty".to_string());
        }

        #[cfg(feature = "redis-broker")]
        if let BrokerBackendConfig::Redis(redis) = &self.broker.backend {
            if redis.connection_string.trim().is_empty() {
                errors.push("Redis connection string must not be empty".to_string());
            }
            if redis.receive_timeout_secs == 0 {
                // BRPOP with timeout 0 blocks forever
                errors.push("Redis receive timeout must be greater than 0".to_string());
            }
            if redis.connect_timeout_secs == 0 {
                errors.push("Redis connect timeout must be greater than 0".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
