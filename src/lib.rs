//! # celeriac
//!
//! An async task runtime that speaks the Celery task message protocol.
//!
//! Producers enqueue named tasks onto broker queues; registered handlers consume
//! and execute them. Messages use Celery's wire format, so a Rust worker can run
//! tasks sent by Python (or Go) producers and the other way round.
//!
//! ## Features
//!
//! - **Wire Compatible**: Celery protocol 1 and 2 messages with JSON bodies
//! - **Pluggable Brokers**: in-memory out of the box, Redis behind the
//!   `redis-broker` feature
//! - **Panic Isolation**: a panicking handler costs one message, never the worker
//! - **Cooperative Shutdown**: one cancellation token stops every consume loop
//! - **Observability**: structured `tracing` events for every delivery
//!
//! ## Quick Start
//!
//! ```rust
//! use celeriac::prelude::*;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicI64, Ordering};
//!
//! #[tokio::main]
//! async fn main() -> CeleryResult<()> {
//!     let mut app = App::new();
//!     let cancel = CancellationToken::new();
//!     let total = Arc::new(AtomicI64::new(0));
//!
//!     let (stop, sum) = (cancel.clone(), Arc::clone(&total));
//!     app.register("tasks.add", "celery", move |_ctx, mut p: TaskParam| {
//!         let (stop, sum) = (stop.clone(), Arc::clone(&sum));
//!         async move {
//!             p.name_args(&["a", "b"]);
//!             sum.fetch_add(p.must_int("a") + p.must_int("b"), Ordering::SeqCst);
//!             stop.cancel();
//!             Ok(())
//!         }
//!     });
//!
//!     app.delay("tasks.add", "celery", (2, 3)).await?;
//!     app.run(cancel).await?;
//!
//!     assert_eq!(total.load(Ordering::SeqCst), 5);
//!     Ok(())
//! }
//! ```

pub mod broker;
pub mod config;
pub mod core;
pub mod error;
pub mod param;
pub mod protocol;
pub mod task;

pub mod prelude {
    pub use crate::broker::{Broker, BrokerFactory, InMemoryBroker, SharedBroker};
    pub use crate::config::{AppConfig, BrokerConfig, CeleryConfig, LogLevel, LoggingConfig};
    pub use crate::core::{App, HandlerResult, TaskContext, TaskHandler};
    pub use crate::error::{BoxError, CeleryError, CeleryResult};
    pub use crate::param::TaskParam;
    pub use crate::protocol::{Codec, ProtocolVersion};
    pub use crate::task::{Task, TaskId};
    pub use async_trait::async_trait;
    pub use tokio_util::sync::CancellationToken;

    #[cfg(feature = "redis-broker")]
    #[cfg_attr(docsrs, doc(cfg(feature = "redis-broker")))]
    pub use crate::broker::RedisBroker;
    #[cfg(feature = "redis-broker")]
    #[cfg_attr(docsrs, doc(cfg(feature = "redis-broker")))]
    pub use crate::config::RedisConfig;
}

pub use crate::core::{App, HandlerResult, TaskContext, TaskHandler};
pub use crate::error::{BoxError, CeleryError, CeleryResult};
pub use crate::param::TaskParam;
pub use crate::task::{Task, TaskId};
pub use async_trait::async_trait;
