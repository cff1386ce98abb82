//! Task registry for celeriac.
//!
//! The registry maps a task name to the queue it is consumed from and the
//! handler that executes it. It is an ordinary value owned by the
//! [`App`](crate::App); there is no global registry.
//!
//! # Overview
//!
//! - [`TaskHandler`]: async trait every handler implements
//! - [`FnHandler`]: adapter turning an async closure into a handler
//! - [`TaskRegistry`]: name → [`Registration`] map; re-registering a name
//!   replaces both its handler and its queue
//!
//! # Examples
//!
//! ```rust
//! use celeriac::core::registry::{FnHandler, TaskRegistry};
//! use celeriac::prelude::*;
//!
//! let mut registry = TaskRegistry::new();
//! registry.register(
//!     "tasks.add",
//!     "celery",
//!     FnHandler::new(|_ctx: TaskContext, mut p: TaskParam| async move {
//!         p.name_args(&["a", "b"]);
//!         println!("{}", p.must_int("a") + p.must_int("b"));
//!         Ok(())
//!     }),
//! );
//!
//! assert!(registry.is_registered("tasks.add"));
//! assert_eq!(registry.queues(), vec!["celery".to_string()]);
//! ```

use crate::core::executor::{HandlerResult, TaskContext};
use crate::param::TaskParam;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Executes one task delivery.
///
/// Panics inside `handle` are caught by the executor and reported as
/// "unexpected task error"; returning `Err` reports the task as failed.
/// Neither stops the consume loop.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Handle a single delivery.
    async fn handle(&self, ctx: TaskContext, param: TaskParam) -> HandlerResult;
}

/// [`TaskHandler`] backed by an async closure.
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    /// Wrap `f`.
    pub fn new<Fut>(f: F) -> Self
    where
        F: Fn(TaskContext, TaskParam) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(TaskContext, TaskParam) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, ctx: TaskContext, param: TaskParam) -> HandlerResult {
        (self.f)(ctx, param).await
    }
}

/// A registered task: where it is consumed from and what runs it.
#[derive(Clone)]
pub struct Registration {
    /// Queue the task's consume loop reads from
    pub queue: String,
    /// Handler invoked for every delivery
    pub handler: Arc<dyn TaskHandler>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

/// Name → registration map.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, Registration>,
}

impl TaskRegistry {
    /// Create a new empty task registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `name`, consumed from `queue`.
    ///
    /// Registering a name again replaces its handler and its queue.
    pub fn register<H>(&mut self, name: impl Into<String>, queue: impl Into<String>, handler: H)
    where
        H: TaskHandler + 'static,
    {
        self.register_arc(name, queue, Arc::new(handler));
    }

    /// Register an already shared handler.
    pub fn register_arc(
        &mut self,
        name: impl Into<String>,
        queue: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) {
        let name = name.into();
        let queue = queue.into();

        let previous = self.tasks.insert(
            name.clone(),
            Registration {
                queue: queue.clone(),
                handler,
            },
        );

        match previous {
            Some(old) if old.queue != queue => tracing::info!(
                task_name = %name,
                "Re-registered task, moved from queue {} to {}",
                old.queue,
                queue
            ),
            Some(_) => tracing::info!(task_name = %name, queue = %queue, "Re-registered task"),
            None => tracing::info!(task_name = %name, queue = %queue, "Registered task"),
        }
    }

    /// Look up the registration for `name`.
    pub fn get(&self, name: &str) -> Option<&Registration> {
        self.tasks.get(name)
    }

    /// Check if a task name is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Distinct queues that have at least one task, sorted.
    pub fn queues(&self) -> Vec<String> {
        self.tasks
            .values()
            .map(|r| r.queue.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Get all registered task names, sorted.
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
