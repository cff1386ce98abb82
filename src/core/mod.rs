//! The celeriac application: task registry, producer API and dispatch.
//!
//! [`App`] is the primary interface. It owns the broker, the protocol codec and
//! the task registry; [`App::delay`] produces tasks and [`App::run`] consumes
//! them until cancelled.

use crate::broker::{Broker, BrokerFactory, SharedBroker};
use crate::config::{BrokerBackendConfig, CeleryConfig};
use crate::error::{CeleryError, CeleryResult};
use crate::param::TaskParam;
use crate::protocol::{Codec, ensure_finite};
use crate::task::{Task, TaskId};
use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub mod engine;
pub mod executor;
pub mod registry;
pub mod worker;

pub use engine::CeleryEngine;
pub use executor::{HandlerResult, TaskContext};
pub use registry::{FnHandler, Registration, TaskHandler, TaskRegistry};
pub use worker::QueueWorker;

/// The celeriac application.
///
/// # Examples
///
/// ```rust
/// use celeriac::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> CeleryResult<()> {
///     let mut app = App::new();
///     let cancel = CancellationToken::new();
///
///     let stop = cancel.clone();
///     app.register("tasks.add", "celery", move |_ctx, mut p: TaskParam| {
///         let stop = stop.clone();
///         async move {
///             p.name_args(&["a", "b"]);
///             println!("{}", p.must_int("a") + p.must_int("b"));
///             stop.cancel();
///             Ok(())
///         }
///     });
///
///     app.delay("tasks.add", "celery", (2, 3)).await?;
///     app.run(cancel).await
/// }
/// ```
pub struct App {
    broker: SharedBroker,
    codec: Codec,
    registry: TaskRegistry,
    config: CeleryConfig,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("codec", &self.codec)
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// Create an app backed by an in-memory broker and default configuration.
    pub fn new() -> Self {
        let config = CeleryConfig::default();
        Self {
            broker: BrokerFactory::in_memory(&config.broker),
            codec: Codec::new(config.app.protocol),
            registry: TaskRegistry::new(),
            config,
        }
    }

    /// Create an app with the broker and message format described by `config`.
    pub async fn from_config(config: CeleryConfig) -> CeleryResult<Self> {
        let broker = BrokerFactory::from_config(&config.broker).await?;
        Self::new().with_shared_broker(broker).apply_config(config)
    }

    /// Use `broker` for sending and receiving.
    pub fn with_broker<B: Broker + 'static>(self, broker: B) -> Self {
        self.with_shared_broker(Arc::new(broker))
    }

    /// Use an already shared broker.
    pub fn with_shared_broker(mut self, broker: SharedBroker) -> Self {
        self.broker = broker;
        self
    }

    /// Apply `config`.
    ///
    /// An in-memory backend installs a fresh in-memory broker with the
    /// configured limits. A Redis backend keeps the current broker, since
    /// connecting is async; use [`from_config`](Self::from_config) or
    /// [`with_broker`](Self::with_broker) for that. Replaces any codec or
    /// broker set earlier, so call [`with_codec`](Self::with_codec) and
    /// [`with_broker`](Self::with_broker) afterwards.
    pub fn with_config(self, config: CeleryConfig) -> CeleryResult<Self> {
        let mut app = self.apply_config(config)?;
        match &app.config.broker.backend {
            BrokerBackendConfig::InMemory => {
                app.broker = BrokerFactory::in_memory(&app.config.broker);
            }
            #[cfg(feature = "redis-broker")]
            BrokerBackendConfig::Redis(_) => {}
        }
        Ok(app)
    }

    fn apply_config(mut self, config: CeleryConfig) -> CeleryResult<Self> {
        config
            .validate()
            .map_err(|errors| CeleryError::config(errors.join("; ")))?;

        self.codec = Codec::new(config.app.protocol).with_mime(config.app.mime.as_str())?;
        self.config = config;
        Ok(self)
    }

    /// Use a custom codec, e.g. one with extra serializers registered.
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Register an async closure as the handler for `name` on `queue`.
    ///
    /// Registering a name again replaces both its handler and its queue.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, queue: impl Into<String>, handler: F)
    where
        F: Fn(TaskContext, TaskParam) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.register(name, queue, FnHandler::new(handler));
    }

    /// Register a [`TaskHandler`] implementation for `name` on `queue`.
    pub fn register_handler<H>(&mut self, name: impl Into<String>, queue: impl Into<String>, handler: H)
    where
        H: TaskHandler + 'static,
    {
        self.registry.register(name, queue, handler);
    }

    /// Enqueue `name` on `queue` with positional arguments.
    ///
    /// `args` must serialize to a sequence (a tuple, array or `Vec`); `()`
    /// means no arguments.
    pub async fn delay<A: Serialize>(&self, name: &str, queue: &str, args: A) -> CeleryResult<TaskId> {
        ensure_finite(&args)
            .map_err(|e| CeleryError::encode("task arguments cannot be encoded", e))?;
        let args = match serde_json::to_value(args)
            .map_err(|e| CeleryError::encode("failed to serialize task arguments", e))?
        {
            Value::Array(args) => args,
            Value::Null => Vec::new(),
            other => {
                return Err(CeleryError::Encode {
                    message: format!("task arguments must serialize to a sequence, got {}", other),
                    source: None,
                });
            }
        };

        self.send_task(queue, Task::new(name).with_args(args)).await
    }

    /// Enqueue `name` on `queue` with keyword arguments only.
    ///
    /// `kwargs` must serialize to a map, typically a struct or `HashMap`.
    pub async fn delay_kwargs<K: Serialize>(
        &self,
        name: &str,
        queue: &str,
        kwargs: K,
    ) -> CeleryResult<TaskId> {
        ensure_finite(&kwargs)
            .map_err(|e| CeleryError::encode("task keyword arguments cannot be encoded", e))?;
        let kwargs: Map<String, Value> = match serde_json::to_value(kwargs)
            .map_err(|e| CeleryError::encode("failed to serialize task keyword arguments", e))?
        {
            Value::Object(kwargs) => kwargs,
            other => {
                return Err(CeleryError::Encode {
                    message: format!("task keyword arguments must serialize to a map, got {}", other),
                    source: None,
                });
            }
        };

        self.send_task(queue, Task::new(name).with_kwargs(kwargs))
            .await
    }

    /// Enqueue a fully built task on `queue`.
    pub async fn send_task(&self, queue: &str, task: Task) -> CeleryResult<TaskId> {
        let message = self.codec.encode(queue, &task)?;
        self.broker.send(queue, message).await?;

        tracing::debug!(task_id = %task.id, task_name = %task.name, queue = %queue, "Task enqueued");
        Ok(task.id)
    }

    /// Consume every registered queue until `cancel` fires.
    ///
    /// Registrations are snapshotted when this is called. Returns `Ok(())`
    /// after cancellation, or the first broker error once every loop has
    /// exited. With nothing registered it returns immediately.
    pub async fn run(&self, cancel: CancellationToken) -> CeleryResult<()> {
        let engine = CeleryEngine::new(
            Arc::clone(&self.broker),
            self.codec.clone(),
            Arc::new(self.registry.clone()),
        );
        engine.run(cancel).await
    }

    /// The task registry.
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// The broker this app sends to and receives from.
    pub fn broker(&self) -> &SharedBroker {
        &self.broker
    }

    /// The codec used for outgoing and incoming messages.
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Get the configuration used by this app.
    pub fn config(&self) -> &CeleryConfig {
        &self.config
    }
}
