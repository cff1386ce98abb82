//! Panic-safe handler execution.
//!
//! Every delivery runs its handler under [`FutureExt::catch_unwind`], so a
//! panicking handler costs one message, not the consume loop that received it.

use crate::core::registry::TaskHandler;
use crate::error::{BoxError, CeleryError, CeleryResult};
use crate::param::TaskParam;
use crate::task::TaskId;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tokio_util::sync::CancellationToken;

/// Result type returned by task handlers.
pub type HandlerResult = Result<(), BoxError>;

/// Delivery details passed to a handler alongside its arguments.
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: TaskId,
    task_name: String,
    queue: String,
    cancel: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(
        task_id: TaskId,
        task_name: String,
        queue: String,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            task_id,
            task_name,
            queue,
            cancel,
        }
    }

    /// Id of the task being executed.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Registered name of the task.
    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Queue the message was received from.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Whether the runtime is shutting down.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that fires when the runtime shuts down.
    ///
    /// Long-running handlers can select on it to stop early; the runtime never
    /// interrupts a handler itself.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Run `handler` once, turning panics and handler errors into [`CeleryError`].
pub async fn execute(
    handler: &dyn TaskHandler,
    ctx: TaskContext,
    param: TaskParam,
) -> CeleryResult<()> {
    let name = ctx.task_name().to_string();

    match AssertUnwindSafe(handler.handle(ctx, param))
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(CeleryError::TaskFailed { name, source }),
        Err(payload) => Err(CeleryError::HandlerPanic {
            message: panic_message(payload.as_ref()),
        }),
    }
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
