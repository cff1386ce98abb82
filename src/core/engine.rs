//! The celeriac engine - fans consume loops out over the registered queues.
//!
//! The engine takes a snapshot of the registry, spawns one [`QueueWorker`] per
//! distinct queue into a [`JoinSet`] and waits for all of them. Loops share a
//! single cancellation token; a broker failure ends only the loop that hit it.

use crate::broker::SharedBroker;
use crate::core::registry::TaskRegistry;
use crate::core::worker::QueueWorker;
use crate::error::{CeleryError, CeleryResult};
use crate::protocol::Codec;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Runs one consume loop per registered queue.
pub struct CeleryEngine {
    broker: SharedBroker,
    codec: Codec,
    registry: Arc<TaskRegistry>,
}

impl CeleryEngine {
    /// Create a new engine over a registry snapshot.
    pub fn new(broker: SharedBroker, codec: Codec, registry: Arc<TaskRegistry>) -> Self {
        Self {
            broker,
            codec,
            registry,
        }
    }

    /// Run every consume loop until all of them have exited.
    ///
    /// Returns the first error any loop reported, or `Ok(())` when every loop
    /// stopped because of cancellation.
    pub async fn run(self, cancel: CancellationToken) -> CeleryResult<()> {
        let queues = self.registry.queues();
        if queues.is_empty() {
            tracing::warn!("No tasks registered, nothing to consume");
            return Ok(());
        }

        tracing::info!(
            "Starting celeriac engine with {} consume loops: {}",
            queues.len(),
            queues.join(", ")
        );

        let mut loops = JoinSet::new();
        for queue in queues {
            let worker = QueueWorker::new(
                queue,
                Arc::clone(&self.broker),
                self.codec.clone(),
                Arc::clone(&self.registry),
            );
            loops.spawn(worker.run(cancel.clone()));
        }

        let mut first_error: Option<CeleryError> = None;
        while let Some(joined) = loops.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    tracing::error!("Consume loop aborted: {}", join_error);
                    Err(CeleryError::WorkerFailed {
                        message: join_error.to_string(),
                    })
                }
            };

            if let Err(e) = outcome {
                if first_error.is_none() {
                    first_error = Some(e);
                } else {
                    tracing::debug!("Suppressed later consume loop error: {}", e);
                }
            }
        }

        tracing::info!("celeriac engine stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::core::executor::TaskContext;
    use crate::core::registry::FnHandler;
    use crate::param::TaskParam;
    use std::time::Duration;

    #[tokio::test]
    async fn test_engine_without_tasks_returns_immediately() {
        let engine = CeleryEngine::new(
            Arc::new(InMemoryBroker::new()),
            Codec::default(),
            Arc::new(TaskRegistry::new()),
        );

        // never cancelled: must still return
        tokio::time::timeout(Duration::from_secs(1), engine.run(CancellationToken::new()))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_engine_stops_all_loops_on_cancel() {
        let mut registry = TaskRegistry::new();
        for (name, queue) in [("a", "one"), ("b", "two"), ("c", "three")] {
            registry.register(
                name,
                queue,
                FnHandler::new(|_ctx: TaskContext, _p: TaskParam| async move { Ok(()) }),
            );
        }

        let engine = CeleryEngine::new(
            Arc::new(InMemoryBroker::new()),
            Codec::default(),
            Arc::new(registry),
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(engine.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
