//! Redis broker implementation for celeriac.
//!
//! Uses the same layout as Celery's Redis transport: every queue is a Redis
//! list named after the queue, producers `LPUSH` encoded messages and consumers
//! `BRPOP` from the other end, which keeps each queue FIFO. Python or Go
//! workers pointed at the same Redis database see the same queues.
//!
//! Sends go through a shared [`ConnectionManager`]. A `BRPOP` blocks the
//! connection it runs on, so blocking receives check out a dedicated
//! multiplexed connection from a small idle pool instead; concurrent consume
//! loops never wait behind each other's `BRPOP`.

use super::Broker;
use crate::config::RedisConfig;
use crate::error::{CeleryError, CeleryResult};
use async_trait::async_trait;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Redis broker backend
pub struct RedisBroker {
    /// Client used to open receive connections
    client: Client,
    /// Shared connection for sends and bookkeeping
    conn: ConnectionManager,
    /// Idle connections for blocking receives
    idle: Mutex<Vec<MultiplexedConnection>>,
    /// Redis configuration
    config: RedisConfig,
}

impl std::fmt::Debug for RedisBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBroker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisBroker {
    /// Connect with default settings to the given Redis URL.
    pub async fn connect(connection_string: &str) -> CeleryResult<Self> {
        Self::new(RedisConfig {
            connection_string: connection_string.to_string(),
            ..RedisConfig::default()
        })
        .await
    }

    /// Create a new Redis broker from configuration
    pub async fn new(config: RedisConfig) -> CeleryResult<Self> {
        let client = Client::open(config.connection_string.as_str())
            .map_err(|e| CeleryError::broker("Failed to create Redis client", e))?;

        let conn = timeout(
            Duration::from_secs(config.connect_timeout_secs),
            client.get_connection_manager(),
        )
        .await
        .map_err(|e| CeleryError::broker("Timed out connecting to Redis", e))?
        .map_err(|e| CeleryError::broker("Failed to create Redis connection manager", e))?;

        info!("Connected to Redis broker");

        Ok(Self {
            client,
            conn,
            idle: Mutex::new(Vec::new()),
            config,
        })
    }

    /// Take an idle receive connection or open a new one.
    async fn checkout(&self) -> CeleryResult<MultiplexedConnection> {
        if let Some(conn) = self.idle.lock().await.pop() {
            return Ok(conn);
        }

        debug!("Opening new Redis receive connection");
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CeleryError::broker("Failed to open Redis receive connection", e))
    }

    /// Return a receive connection to the idle pool.
    async fn checkin(&self, conn: MultiplexedConnection) {
        let mut idle = self.idle.lock().await;
        if idle.len() < self.config.pool_size {
            idle.push(conn);
        }
    }

    /// Number of messages waiting on `queue`.
    pub async fn pending(&self, queue: &str) -> CeleryResult<usize> {
        let mut conn = self.conn.clone();
        conn.llen(queue)
            .await
            .map_err(|e| CeleryError::broker(format!("Failed to read length of '{}'", queue), e))
    }

    /// Delete every pending message on `queue`.
    pub async fn purge(&self, queue: &str) -> CeleryResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(queue)
            .await
            .map_err(|e| CeleryError::broker(format!("Failed to purge '{}'", queue), e))
    }
}

/// `BRPOP q1 q2 ... timeout`, checking the queues in the given order.
fn brpop_command(queues: &[String], timeout_secs: u64) -> redis::Cmd {
    let mut cmd = redis::cmd("BRPOP");
    cmd.arg(queues).arg(timeout_secs);
    cmd
}

#[async_trait]
impl Broker for RedisBroker {
    async fn send(&self, queue: &str, message: Vec<u8>) -> CeleryResult<()> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(queue, message)
            .await
            .map_err(|e| CeleryError::broker(format!("Failed to push to '{}'", queue), e))?;

        debug!("Sent message to Redis queue {}", queue);
        Ok(())
    }

    /// Pop the next message from any of `queues`, blocking in `BRPOP`.
    ///
    /// Cancellation drops the receive connection mid-command. If Redis had
    /// already popped a message for that `BRPOP`, the reply is discarded and
    /// the message is lost; the window is one round trip and is accepted.
    async fn receive(
        &self,
        cancel: &CancellationToken,
        queues: &[String],
    ) -> CeleryResult<(String, Vec<u8>)> {
        let mut conn = self.checkout().await?;
        let brpop = brpop_command(queues, self.config.receive_timeout_secs);

        loop {
            if cancel.is_cancelled() {
                self.checkin(conn).await;
                return Err(CeleryError::Cancelled);
            }

            let polled = tokio::select! {
                biased;
                // The connection may still have a BRPOP in flight, so it is
                // dropped rather than returned to the pool.
                _ = cancel.cancelled() => return Err(CeleryError::Cancelled),
                res = brpop.query_async::<Option<(String, Vec<u8>)>>(&mut conn) => res,
            };

            match polled {
                Ok(Some(message)) => {
                    self.checkin(conn).await;
                    return Ok(message);
                }
                Ok(None) => continue,
                Err(e) => return Err(CeleryError::broker("BRPOP failed", e)),
            }
        }
    }
}
