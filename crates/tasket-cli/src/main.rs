use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tasket_core::typed::Target;
use tasket_core::{AppBuilder, SchedulerConfig, TaskStatus};

mod cli;
mod demo;
mod logging;

use crate::cli::CliArgs;
use crate::demo::Report;

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("tasket error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> Result<()> {
    let args = CliArgs::parse();
    logging::init_logging(args.log_level)?;

    let config = match &args.config {
        Some(path) => SchedulerConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => SchedulerConfig::default(),
    };

    let app = AppBuilder::new()
        .registry(demo::registry()?)
        .config(config)
        .expect_targets(&[Report::TYPE])
        .build()?;

    // スケジューラを起動
    let shutdown = CancellationToken::new();
    let scheduler = app.scheduler.spawn_loop(shutdown.clone());

    let task = app
        .manager
        .task_for_object(Report::TYPE, &args.key, &args.method)
        .await?;
    let task = app.manager.run_task(task.id).await?;
    info!(task = %task.id, method = %task.method, "task scheduled");

    // 終了するまでポーリング。Ctrl-C でキャンセル
    let mut interrupted = false;
    let record = loop {
        let record = app.manager.get_task(task.id).await?;
        if record.status.is_terminal() {
            break record;
        }
        tokio::select! {
            res = tokio::signal::ctrl_c(), if !interrupted => {
                res.context("failed to listen for ctrl-c")?;
                interrupted = true;
                warn!(task = %task.id, "interrupted, cancelling");
                if let Err(err) = app.manager.cancel_task(task.id).await {
                    warn!(task = %task.id, error = %err, "cancel failed");
                }
            }
            () = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
    };

    println!("{}", app.manager.complete_log(record.id).await?);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    }

    shutdown.cancel();
    scheduler.await.context("scheduler loop panicked")?;

    if record.status != TaskStatus::Successful {
        bail!("task {} finished with status \"{}\"", record.id, record.status);
    }
    Ok(())
}
