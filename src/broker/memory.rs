//! In-memory broker implementation for celeriac.
//!
//! Messages live in per-queue FIFO buffers inside the process. This is the
//! default broker: good for development, tests and single-process
//! applications where persistence across restarts is not required.
//!
//! # Features
//!
//! - **FIFO per queue**: messages come out in the order they were sent
//! - **Blocking receive**: receivers park on a [`Notify`] instead of polling
//! - **Cancellable**: a parked receiver wakes up as soon as the run is cancelled

use super::Broker;
use crate::config::BrokerConfig;
use crate::error::{CeleryError, CeleryResult};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

/// In-memory broker backend
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    /// Pending messages by queue name
    queues: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    /// Wakes parked receivers when a message arrives
    notify: Notify,
    /// Broker configuration
    config: BrokerConfig,
}

impl InMemoryBroker {
    /// Create a new in-memory broker with default configuration
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    /// Create a new in-memory broker with custom configuration
    pub fn with_config(config: BrokerConfig) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            config,
        }
    }

    /// Number of messages waiting on `queue`.
    pub async fn pending(&self, queue: &str) -> usize {
        let queues = self.queues.lock().await;
        queues.get(queue).map_or(0, VecDeque::len)
    }

    /// Drop every pending message, returning how many were removed.
    pub async fn purge(&self) -> usize {
        let mut queues = self.queues.lock().await;
        let purged = queues.values().map(VecDeque::len).sum();
        queues.clear();

        tracing::warn!("Purged {} messages from in-memory broker", purged);
        purged
    }

    /// Pop the first available message, scanning `queues` in order.
    async fn try_pop(&self, queues: &[String]) -> Option<(String, Vec<u8>)> {
        let mut pending = self.queues.lock().await;
        for name in queues {
            if let Some(message) = pending.get_mut(name).and_then(VecDeque::pop_front) {
                return Some((name.clone(), message));
            }
        }
        None
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn send(&self, queue: &str, message: Vec<u8>) -> CeleryResult<()> {
        {
            let mut queues = self.queues.lock().await;
            let pending = queues.entry(queue.to_string()).or_default();

            if self.config.max_queue_size > 0 && pending.len() >= self.config.max_queue_size {
                return Err(CeleryError::Broker {
                    message: format!(
                        "Queue '{}' is full (max size: {})",
                        queue, self.config.max_queue_size
                    ),
                    source: None,
                });
            }
            pending.push_back(message);
        }

        self.notify.notify_waiters();
        tracing::debug!("Sent message to queue {}", queue);
        Ok(())
    }

    async fn receive(
        &self,
        cancel: &CancellationToken,
        queues: &[String],
    ) -> CeleryResult<(String, Vec<u8>)> {
        loop {
            if cancel.is_cancelled() {
                return Err(CeleryError::Cancelled);
            }

            // Register interest before checking, so a send between the check
            // and the await still wakes us.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.try_pop(queues).await {
                return Ok(message);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CeleryError::Cancelled),
                _ = &mut notified => {}
            }
        }
    }
}
