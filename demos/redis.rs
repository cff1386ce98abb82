use celeriac::broker::RedisBroker;
use celeriac::config::{BrokerConfig, CeleryConfig, RedisConfig};
use celeriac::prelude::*;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("🚀 celeriac Redis Example");

    let redis_config = RedisConfig {
        connection_string: "redis://localhost:6379".to_string(),
        receive_timeout_secs: 1,
        pool_size: 4,
        ..Default::default()
    };

    println!(
        "🔗 Connecting to Redis at {}",
        redis_config.connection_string
    );

    let broker = RedisBroker::new(redis_config.clone()).await?;
    broker.purge("celery").await?;

    println!("🧹 Purged existing tasks from the celery queue");

    let config = CeleryConfig {
        broker: BrokerConfig::redis(redis_config.connection_string.clone()),
        ..CeleryConfig::development()
    };

    let mut app = App::new().with_config(config)?.with_broker(broker);

    // Python workers and producers share this queue: tasks.add sent from
    // Celery lands here, and the tasks enqueued below can be run by Celery.
    app.register("tasks.add", "celery", |ctx: TaskContext, mut p: TaskParam| async move {
        p.name_args(&["x", "y"]);
        println!(
            "✅ {} ({}) = {}",
            ctx.task_name(),
            ctx.task_id(),
            p.must_int("x") + p.must_int("y")
        );
        Ok(())
    });

    for (x, y) in [(2, 3), (40, 2), (1, 1)] {
        let task_id = app.delay("tasks.add", "celery", (x, y)).await?;
        println!("📥 Task enqueued: {}", task_id);
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        signal::ctrl_c().await.expect("Failed to listen for ctrl+c");
        shutdown.cancel();
    });

    app.run(cancel).await?;
    Ok(())
}
