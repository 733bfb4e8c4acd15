use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use market::EntityId;
use market::feed::{FeedTick, MarketFeed};
use pairwatch::config::parse_pairs;
use pairwatch::feed::{FeedPump, SyntheticFeed};
use pairwatch::stats::StatisticsWorker;
use pairwatch::window_store::WindowStore;
use scheduler::{MonitorConfig, MonitorScheduler};

fn id(s: &str) -> EntityId {
    EntityId::new(s).unwrap()
}

#[tokio::test(start_paused = true)]
async fn feed_statistics_and_monitors_run_together() {
    let pairs = parse_pairs("KO:PEP:0.5, PEP:XOM").unwrap();
    let scheduler = Arc::new(MonitorScheduler::initialize(MonitorConfig::default(), pairs).unwrap());
    let windows = WindowStore::new(60_000);

    let (tx, rx) = mpsc::channel::<FeedTick>(64);
    let feed = SyntheticFeed::new(Duration::from_millis(100)).with_rounds(40);
    let symbols = vec![id("KO"), id("PEP"), id("XOM")];
    let feed_task = tokio::spawn(async move { feed.stream(symbols, tx).await });

    let pump = FeedPump::new(Arc::clone(scheduler.registry()), windows.clone());
    let pump_task = tokio::spawn(pump.run(rx));

    let (stop_tx, stop_rx) = watch::channel(false);
    let stats_task = tokio::spawn(
        StatisticsWorker::new(Arc::clone(&scheduler), windows.clone(), Duration::from_millis(500))
            .run(stop_rx),
    );

    scheduler.start().unwrap();

    feed_task.await.unwrap().unwrap();
    let applied = pump_task.await.unwrap();
    assert_eq!(applied, 120);

    // let a few more evaluation and refresh cycles observe the final prices
    tokio::time::sleep(Duration::from_secs(3)).await;

    for sym in ["KO", "PEP", "XOM"] {
        let state = scheduler.entity(&id(sym)).unwrap();
        assert!(state.snapshot().price > 0.0, "{sym} has no price");
        assert!(state.statistics().mean > 0.0, "{sym} has no statistics");

        let d = state.decision();
        assert_eq!(d.position, -d.counterparty_position);
        if !d.is_flat() {
            assert!(d.paired_with.is_some());
            assert!(d.position.abs() >= 1);
        }
    }

    // refreshed from returns, always a valid correlation
    for pair in scheduler.pairs() {
        let rho = scheduler.correlation(pair).unwrap();
        assert!((-1.0..=1.0).contains(&rho));
    }

    let report = scheduler.shutdown(Duration::from_secs(2)).await.unwrap();
    assert_eq!(report.stopped.len(), 2);

    stop_tx.send_replace(true);
    stats_task.await.unwrap();
}

#[tokio::test]
async fn pump_drops_ticks_for_unmonitored_symbols() {
    let pairs = parse_pairs("KO:PEP").unwrap();
    let scheduler = MonitorScheduler::initialize(MonitorConfig::default(), pairs).unwrap();
    let windows = WindowStore::new(60_000);
    let pump = FeedPump::new(Arc::clone(scheduler.registry()), windows.clone());

    let tick = |sym: &str| FeedTick {
        entity: id(sym),
        ts_ms: 1,
        snapshot: SyntheticFeed::snapshot_at(0, 0),
    };

    assert!(pump.apply(tick("KO")).await);
    assert!(!pump.apply(tick("TSLA")).await);

    assert_eq!(windows.len(&id("KO")).await, 1);
    assert_eq!(windows.len(&id("TSLA")).await, 0);
    assert_eq!(
        scheduler.entity(&id("KO")).unwrap().snapshot(),
        SyntheticFeed::snapshot_at(0, 0)
    );
}
