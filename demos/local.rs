use celeriac::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::signal;

#[derive(Debug, Serialize, Deserialize)]
struct Greeting {
    name: String,
    message: String,
}

#[tokio::main]
async fn main() -> CeleryResult<()> {
    CeleryConfig::development().logging.init_subscriber()?;

    let mut app = App::from_config(CeleryConfig::development()).await?;

    app.register("demo.add", "math", |ctx: TaskContext, mut p: TaskParam| async move {
        p.name_args(&["a", "b"]);
        println!(
            "➕ [{}] {} + {} = {}",
            ctx.task_id(),
            p.must_int("a"),
            p.must_int("b"),
            p.must_int("a") + p.must_int("b")
        );
        Ok(())
    });

    app.register("demo.greet", "greetings", |_ctx, p: TaskParam| async move {
        let greeting: Greeting = p.must_deserialize("greeting");
        println!("👋 Hello {}: {}", greeting.name, greeting.message);
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(())
    });

    // out-of-range access is reported as "unexpected task error" and skipped
    app.register("demo.broken", "math", |_ctx, p: TaskParam| async move {
        println!("{}", p.args()[10]);
        Ok(())
    });

    for i in 0..5 {
        app.delay("demo.add", "math", (i, i * 10)).await?;
    }
    app.delay("demo.broken", "math", ()).await?;

    for name in ["Alice", "Bob", "Charlie"] {
        app.delay_kwargs(
            "demo.greet",
            "greetings",
            serde_json::json!({
                "greeting": Greeting {
                    name: name.to_string(),
                    message: "Welcome to celeriac".to_string(),
                }
            }),
        )
        .await?;
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        signal::ctrl_c().await.expect("Failed to listen for ctrl+c");
        shutdown.cancel();
    });

    println!("🚀 Consuming tasks! Press Ctrl+C to stop...");
    app.run(cancel).await?;

    println!("✅ Stopped");
    Ok(())
}
