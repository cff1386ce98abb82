//! Task message definition.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Unique identifier for a task
pub type TaskId = String;

/// A single unit of work as it travels over the wire.
///
/// Tasks are built by the producer before encoding, or by the protocol codec
/// when a message is received. Positional and keyword arguments are kept as
/// loosely typed JSON values; handlers convert them through
/// [`TaskParam`](crate::param::TaskParam).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Task {
    /// Unique task identifier, generated by the producer
    pub id: TaskId,
    /// Dotted task name used to look up the handler
    pub name: String,
    /// Positional arguments
    pub args: Vec<Value>,
    /// Keyword arguments
    pub kwargs: Map<String, Value>,
    /// Absolute expiry time, if the producer set one
    pub expires: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a task with a fresh UUIDv4 id and no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the positional arguments.
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Set the keyword arguments.
    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// Set the time after which consumers should discard the task.
    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Whether the task's expiry time has passed.
    pub fn is_expired(&self) -> bool {
        self.expires.is_some_and(|at| at <= Utc::now())
    }
}
