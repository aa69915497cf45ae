//! Host-wiring example: registers a couple of handlers and exercises all
//! four dispatch forms (immediate, delayed, at an absolute instant,
//! recurring) against a real on-disk store.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use evertask::{DispatchOptions, EverTask, HandlerCapabilities, IntervalKind, RecurringRule, RetryPolicy, TaskHandler};
use evertask_sqlite::SqliteStore;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "evertask-demo")]
#[command(about = "Exercises EverTask's dispatch forms against a SQLite store")]
struct CliArgs {
    /// Path to the SQLite database file; created if missing.
    #[arg(long, default_value = "evertask-demo.db")]
    db_path: PathBuf,

    /// How long to let the recurring heartbeat tick before shutting down.
    #[arg(long, default_value = "5")]
    run_seconds: u64,
}

#[derive(Serialize, Deserialize)]
struct SendWelcomeEmail {
    to: String,
}

struct SendWelcomeEmailHandler;

#[async_trait]
impl TaskHandler<SendWelcomeEmail> for SendWelcomeEmailHandler {
    async fn handle(&self, request: SendWelcomeEmail, _cancel: CancellationToken) -> Result<()> {
        info!(to = %request.to, "sent welcome email");
        Ok(())
    }

    fn capabilities(&self) -> HandlerCapabilities {
        HandlerCapabilities {
            retry_policy: Some(RetryPolicy::fixed(3, Duration::from_millis(250))),
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Heartbeat {
    label: String,
}

struct HeartbeatHandler;

#[async_trait]
impl TaskHandler<Heartbeat> for HeartbeatHandler {
    async fn handle(&self, request: Heartbeat, _cancel: CancellationToken) -> Result<()> {
        info!(label = %request.label, "heartbeat tick");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();

    let store = SqliteStore::open(&args.db_path, Duration::from_secs(5))?;
    info!(db_path = %args.db_path.display(), "opened sqlite store");

    let engine = EverTask::builder()
        .register_handler::<SendWelcomeEmail, _>(SendWelcomeEmailHandler)
        .register_handler::<Heartbeat, _>(HeartbeatHandler)
        .with_store(std::sync::Arc::new(store))
        .start()
        .await?;

    // Immediate dispatch.
    engine
        .dispatch(
            SendWelcomeEmail {
                to: "new-user@example.com".to_string(),
            },
            DispatchOptions::immediate(),
        )
        .await?;

    // Delayed dispatch.
    engine
        .dispatch(
            SendWelcomeEmail {
                to: "reminded-user@example.com".to_string(),
            },
            DispatchOptions::immediate().with_delay(Duration::from_secs(2)),
        )
        .await?;

    // Dispatch at an absolute instant, deduplicated by taskKey.
    let at = chrono::Utc::now() + chrono::Duration::seconds(3);
    engine
        .dispatch(
            SendWelcomeEmail {
                to: "scheduled-user@example.com".to_string(),
            },
            DispatchOptions::immediate().with_at(at).with_task_key("welcome-scheduled-user"),
        )
        .await?;

    // Recurring dispatch: a heartbeat every second.
    let rule = RecurringRule::new(IntervalKind::SecondInterval(1));
    engine
        .dispatch(
            Heartbeat {
                label: "demo-heartbeat".to_string(),
            },
            DispatchOptions::immediate().with_recurring(rule),
        )
        .await?;

    tokio::time::sleep(Duration::from_secs(args.run_seconds)).await;

    engine.stop().await;
    info!("engine stopped cleanly");
    Ok(())
}
