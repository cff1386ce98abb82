//! Broker backends for celeriac.
//!
//! The runtime only depends on the [`Broker`] trait: put one encoded message on
//! a named queue, and block until a message arrives on one of several queues.
//! Two implementations ship with the crate:
//! - **In-Memory**: per-process FIFO queues, for development, tests and
//!   single-process applications
//! - **Redis**: the list layout used by Celery's Redis transport, so workers
//!   written in other languages can share the queues
//!
//! # Examples
//!
//! ```rust,no_run
//! use celeriac::broker::{Broker, InMemoryBroker};
//!
//! # async fn example() -> celeriac::CeleryResult<()> {
//! let broker = InMemoryBroker::new();
//! broker.send("celery", b"...".to_vec()).await?;
//!
//! // Redis broker (requires redis-broker feature)
//! # #[cfg(feature = "redis-broker")]
//! let broker = celeriac::broker::RedisBroker::connect("redis://localhost:6379").await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{BrokerBackendConfig, BrokerConfig};
use crate::error::CeleryResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub mod memory;
pub use memory::InMemoryBroker;

#[cfg(feature = "redis-broker")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis-broker")))]
pub mod redis;

#[cfg(feature = "redis-broker")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis-broker")))]
pub use redis::RedisBroker;

/// Transport contract the runtime consumes.
///
/// Delivery is assumed to be at-least-once; implementations need not provide
/// ordering across different queues.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Put an encoded message on `queue`.
    async fn send(&self, queue: &str, message: Vec<u8>) -> CeleryResult<()>;

    /// Wait for the next message on any of `queues`.
    ///
    /// Returns the queue the message came from together with its bytes. Fails
    /// with [`CeleryError::Cancelled`](crate::CeleryError::Cancelled) once
    /// `cancel` fires; any other error is a transport failure.
    async fn receive(
        &self,
        cancel: &CancellationToken,
        queues: &[String],
    ) -> CeleryResult<(String, Vec<u8>)>;
}

#[async_trait]
impl<B: Broker + ?Sized> Broker for Arc<B> {
    async fn send(&self, queue: &str, message: Vec<u8>) -> CeleryResult<()> {
        (**self).send(queue, message).await
    }

    async fn receive(
        &self,
        cancel: &CancellationToken,
        queues: &[String],
    ) -> CeleryResult<(String, Vec<u8>)> {
        (**self).receive(cancel, queues).await
    }
}

/// Convenient type alias for a shared broker
pub type SharedBroker = Arc<dyn Broker>;

/// Factory methods for creating brokers
pub struct BrokerFactory;

impl BrokerFactory {
    /// Create an in-memory broker
    pub fn in_memory(config: &BrokerConfig) -> SharedBroker {
        Arc::new(InMemoryBroker::with_config(config.clone()))
    }

    /// Create a Redis broker
    #[cfg(feature = "redis-broker")]
    #[cfg_attr(docsrs, doc(cfg(feature = "redis-broker")))]
    pub async fn redis(config: &crate::config::RedisConfig) -> CeleryResult<SharedBroker> {
        let broker = RedisBroker::new(config.clone()).await?;
        Ok(Arc::new(broker))
    }

    /// Create the broker selected by `config`.
    pub async fn from_config(config: &BrokerConfig) -> CeleryResult<SharedBroker> {
        match &config.backend {
            BrokerBackendConfig::InMemory => Ok(Self::in_memory(config)),
            #[cfg(feature = "redis-broker")]
            BrokerBackendConfig::Redis(redis) => Self::redis(redis).await,
        }
    }
}
