//! Per-queue consume loop.
//!
//! A [`QueueWorker`] owns one queue. It receives a message, decodes it, looks
//! up the handler and runs it to completion before asking the broker for the
//! next message, so deliveries on one queue are handled strictly in order.
//! Message-level failures are logged and the message dropped; only a broker
//! error ends the loop.

use crate::broker::SharedBroker;
use crate::core::executor::{self, TaskContext};
use crate::core::registry::TaskRegistry;
use crate::error::{CeleryError, CeleryResult};
use crate::param::TaskParam;
use crate::protocol::Codec;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Consume loop for a single queue.
pub struct QueueWorker {
    queue: String,
    broker: SharedBroker,
    codec: Codec,
    registry: Arc<TaskRegistry>,
}

impl QueueWorker {
    /// Create a worker for `queue`.
    pub fn new(
        queue: impl Into<String>,
        broker: SharedBroker,
        codec: Codec,
        registry: Arc<TaskRegistry>,
    ) -> Self {
        Self {
            queue: queue.into(),
            broker,
            codec,
            registry,
        }
    }

    /// Queue this worker consumes.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Run until `cancel` fires or the broker fails.
    ///
    /// Returns `Ok(())` on cancellation. A handler that is already running when
    /// `cancel` fires is allowed to finish.
    pub async fn run(self, cancel: CancellationToken) -> CeleryResult<()> {
        tracing::info!(queue = %self.queue, "Consume loop started");

        let queues = vec![self.queue.clone()];

        loop {
            let (queue, raw) = match self.broker.receive(&cancel, &queues).await {
                Ok(message) => message,
                Err(e) if e.is_cancelled() => break,
                Err(e) => {
                    tracing::error!(
                        queue = %self.queue,
                        error = %e,
                        "Broker receive failed, stopping consume loop"
                    );
                    return Err(e);
                }
            };

            match self.process(&queue, &raw, &cancel).await {
                Ok(()) => {}
                Err(e @ CeleryError::UnknownTask { .. }) => {
                    tracing::warn!(queue = %queue, error = %e, "Dropped message for unknown task");
                }
                Err(e) => {
                    tracing::error!(queue = %queue, error = %e, "Dropped undecodable message");
                }
            }
        }

        tracing::info!(queue = %self.queue, "Consume loop stopped");
        Ok(())
    }

    /// Decode and execute one message.
    ///
    /// Handler outcomes are logged here; decode and lookup failures are
    /// returned for the loop to log.
    async fn process(&self, queue: &str, raw: &[u8], cancel: &CancellationToken) -> CeleryResult<()> {
        let task = self.codec.decode(raw)?;

        let registration = self
            .registry
            .get(&task.name)
            .ok_or_else(|| CeleryError::UnknownTask {
                name: task.name.clone(),
            })?;

        if task.is_expired() {
            tracing::warn!(
                task_id = %task.id,
                task_name = %task.name,
                queue = %queue,
                "Dropped expired task"
            );
            return Ok(());
        }

        tracing::debug!(task_id = %task.id, task_name = %task.name, queue = %queue, "Received task");

        let ctx = TaskContext::new(
            task.id.clone(),
            task.name.clone(),
            queue.to_string(),
            cancel.child_token(),
        );
        let param = TaskParam::new(task.args, task.kwargs);

        let start_time = Instant::now();
        let result = executor::execute(registration.handler.as_ref(), ctx, param).await;
        let duration = start_time.elapsed();

        match result {
            Ok(()) => tracing::info!(
                task_id = %task.id,
                task_name = %task.name,
                queue = %queue,
                "Task succeeded in {:?}",
                duration
            ),
            Err(e) => tracing::error!(
                task_id = %task.id,
                task_name = %task.name,
                queue = %queue,
                error = %e,
                "Task failed after {:?}",
                duration
            ),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{Broker, InMemoryBroker};
    use crate::core::registry::FnHandler;
    use crate::task::Task;
    use serde_json::json;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::time::Duration;

    fn summing_registry(total: Arc<AtomicI64>, cancel: CancellationToken, stop_at: i64) -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        registry.register(
            "tasks.add",
            "celery",
            FnHandler::new(move |_ctx: TaskContext, mut p: TaskParam| {
                let total = Arc::clone(&total);
                let cancel = cancel.clone();
                async move {
                    p.name_args(&["a", "b"]);
                    let n = p.must_int("a") + p.must_int("b");
                    if total.fetch_add(n, Ordering::SeqCst) + n >= stop_at {
                        cancel.cancel();
                    }
                    Ok(())
                }
            }),
        );
        registry
    }

    #[tokio::test]
    async fn test_worker_processes_in_order_and_skips_bad_messages() {
        let broker = Arc::new(InMemoryBroker::new());
        let codec = Codec::default();
        let cancel = CancellationToken::new();
        let total = Arc::new(AtomicI64::new(0));

        let add = |a: i64, b: i64| Task::new("tasks.add").with_args(vec![json!(a), json!(b)]);

        broker.send("celery", codec.encode("celery", &add(1, 1)).unwrap()).await.unwrap();
        broker.send("celery", b"not a message".to_vec()).await.unwrap();
        broker
            .send("celery", codec.encode("celery", &Task::new("tasks.nope")).unwrap())
            .await
            .unwrap();
        broker
            .send(
                "celery",
                codec
                    .encode(
                        "celery",
                        &add(100, 0).with_expires(chrono::Utc::now() - chrono::Duration::seconds(60)),
                    )
                    .unwrap(),
            )
            .await
            .unwrap();
        broker.send("celery", codec.encode("celery", &add(2, 3)).unwrap()).await.unwrap();

        let registry = summing_registry(Arc::clone(&total), cancel.clone(), 7);
        let worker = QueueWorker::new("celery", broker.clone(), codec, Arc::new(registry));
        assert_eq!(worker.queue(), "celery");

        tokio::time::timeout(Duration::from_secs(5), worker.run(cancel))
            .await
            .unwrap()
            .unwrap();

        // the expired task contributed nothing
        assert_eq!(total.load(Ordering::SeqCst), 7);
        assert_eq!(broker.pending("celery").await, 0);
    }

    #[tokio::test]
    async fn test_worker_stops_on_cancel() {
        let broker = Arc::new(InMemoryBroker::new());
        let cancel = CancellationToken::new();
        let worker = QueueWorker::new(
            "idle",
            broker,
            Codec::default(),
            Arc::new(TaskRegistry::new()),
        );

        let handle = tokio::spawn(worker.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
