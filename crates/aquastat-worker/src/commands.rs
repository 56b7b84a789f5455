use crate::backends::{self, Backends};
use anyhow::Context;
use aquastat::{StatConfig, StatReporter, StatService, StatSynchronizer};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Consume stdin until it closes or Ctrl-C, then flush counters.
pub async fn run(config: StatConfig, backends: Backends) -> anyhow::Result<()> {
    let service = StatService::new(backends.counters, backends.durable, config)?;
    let (tracker, consumer) = service.tracking_channel();
    let running = service.start(consumer).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !line.trim().is_empty() {
                        tracker.publish_raw(line.as_bytes());
                    }
                }
                Ok(None) => {
                    tracing::info!("input closed");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to read tracking events");
                    break;
                }
            },
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    drop(tracker);
    let report = running.shutdown().await;
    if report.failed > 0 {
        anyhow::bail!("final backup failed for {} keys", report.failed);
    }
    Ok(())
}

pub async fn report(backends: Backends) -> anyhow::Result<()> {
    let reporter = StatReporter::new(backends.counters, backends.durable);
    let report = reporter.generate_report().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn backup(backends: Backends) -> anyhow::Result<()> {
    let sync = StatSynchronizer::new(backends.counters, backends.durable);
    let report = sync.backup().await;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

pub async fn migrate(backends: Backends) -> anyhow::Result<()> {
    let sync = StatSynchronizer::new(backends.counters, backends.durable);
    let report = sync.migrate().await;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

pub async fn init_schema(config: &StatConfig) -> anyhow::Result<()> {
    let url = config
        .postgres_url
        .as_deref()
        .context("AQUASTAT_POSTGRES_URL is required")?;
    backends::connect_postgres(url, &config.postgres_table).await?;
    tracing::info!(table = %config.postgres_table, "stat table ready");
    Ok(())
}
