use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, warn};

use common::logger::{TraceId, init_logger, root_span};
use market::feed::{FeedTick, MarketFeed};
use pairwatch::config::{AppConfig, json_logs_from_env};
use pairwatch::feed::{FeedPump, SyntheticFeed};
use pairwatch::stats::StatisticsWorker;
use pairwatch::window_store::WindowStore;
use scheduler::{MonitorError, MonitorScheduler};

const FEED_QUEUE_CAPACITY: usize = 1_024;

/// Starts the feed and the pump; returns the feed task so it can be stopped.
fn start_feed(
    scheduler: &MonitorScheduler,
    windows: WindowStore,
    cfg: &AppConfig,
) -> (JoinHandle<()>, JoinHandle<u64>) {
    let (tx, rx) = mpsc::channel::<FeedTick>(FEED_QUEUE_CAPACITY);

    let feed = SyntheticFeed::new(cfg.feed_interval);
    let symbols = cfg.symbols();
    let feed_task = tokio::spawn(
        async move {
            if let Err(e) = feed.stream(symbols, tx).await {
                error!(error = ?e, "market feed crashed");
            }
        }
        .instrument(tracing::info_span!("market_feed")),
    );

    let pump = FeedPump::new(Arc::clone(scheduler.registry()), windows);
    let pump_task = tokio::spawn(pump.run(rx).instrument(tracing::info_span!("feed_pump")));

    (feed_task, pump_task)
}

async fn run() -> anyhow::Result<ExitCode> {
    let cfg = AppConfig::from_env().context("load configuration")?;

    let scheduler = Arc::new(
        MonitorScheduler::initialize(cfg.monitor.clone(), cfg.pairs.clone())
            .context("initialize pair monitors")?,
    );

    let windows = WindowStore::new(cfg.stats_window_ms);
    let (feed_task, pump_task) = start_feed(&scheduler, windows.clone(), &cfg);

    let (stop_tx, stop_rx) = watch::channel(false);
    let stats_task = tokio::spawn(
        StatisticsWorker::new(Arc::clone(&scheduler), windows, cfg.stats_interval).run(stop_rx),
    );

    let started = scheduler.start().context("start pair monitors")?;
    info!(monitors = started, "pairwatch running");

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("Shutdown signal received");

    let outcome = scheduler.shutdown(cfg.shutdown_grace).await;

    stop_tx.send_replace(true);
    feed_task.abort();
    let _ = stats_task.await;
    let _ = pump_task.await;

    match outcome {
        Ok(report) => {
            info!(stopped = report.stopped.len(), "pairwatch stopped");
            Ok(ExitCode::SUCCESS)
        }
        Err(MonitorError::ShutdownTimeout { pairs, timeout_ms }) => {
            warn!(?pairs, timeout_ms, "exiting with monitors still running");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).context("shutdown pair monitors"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logger("pairwatch", json_logs_from_env());

    let span = root_span("pairwatch", &TraceId::default());
    match run().instrument(span).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = ?e, "pairwatch failed");
            ExitCode::FAILURE
        }
    }
}
