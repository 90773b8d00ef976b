mod cli;
mod startup;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::cli::{CliArgs, LogFormat};

#[tokio::main]
async fn main() -> Result<()> {
    storywatch_core::config::load_dotenv();
    let args = CliArgs::parse();
    init_tracing(args.log_format);

    let config = startup::load_config(&args).context("failed to load configuration")?;
    config.log_summary();

    let schedulers = startup::build_schedulers(&config).context("failed to initialize sources")?;

    if args.once {
        let mut tasks = JoinSet::new();
        for mut scheduler in schedulers {
            tasks.spawn(async move {
                let source = scheduler.cycle().source_name().to_string();
                (source, scheduler.run_once().await)
            });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((source, Some(report))) => info!(source = %source, ?report, "cycle finished"),
                Ok((source, None)) => error!(source = %source, "cycle failed"),
                Err(e) => error!(error = %e, "cycle task panicked"),
            }
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = JoinSet::new();
    for scheduler in schedulers {
        tasks.spawn(scheduler.run(shutdown_rx.clone()));
    }
    drop(shutdown_rx);
    info!(sources = tasks.len(), "storywatch running");

    os_signal().await.context("failed to listen for shutdown signals")?;
    info!("shutdown signal received, waiting for in-flight cycles");
    // Err only when every scheduler already exited.
    let _ = shutdown_tx.send(true);

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "scheduler task panicked");
        }
    }
    info!("storywatch stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C elsewhere.
async fn os_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
