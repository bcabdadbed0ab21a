//! Engine-level behaviour with in-memory venue adapters

use market_data::test_utils::{ScriptedFeed, StaticHistory};
use market_data::{
    EngineSettings, MarketDataEngine, MarketDataError, SymbolMapping, VenueAdapters,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use task_subscription::{ChannelOptions, OverflowPolicy, PressureConfig, SubscriptionRegistry};
use tokio_util::sync::CancellationToken;
use types::{current_timestamp_ms, Bar, CandleTick, Timeframe, VenueId};

const SYMBOL: &str = "BTC/USDT";

fn tick(ts: i64, price: Decimal, volume: Decimal) -> CandleTick {
    CandleTick {
        timestamp: ts,
        open: Some(price),
        high: Some(price),
        low: Some(price),
        close: Some(price),
        volume: Some(volume),
    }
}

fn engine_with(
    feed: Arc<ScriptedFeed>,
    history: Arc<StaticHistory>,
    settings: EngineSettings,
) -> Arc<MarketDataEngine> {
    let registry = Arc::new(SubscriptionRegistry::new(
        ChannelOptions::unbounded(),
        PressureConfig::default(),
    ));
    Arc::new(
        MarketDataEngine::builder(settings, registry)
            .venue(VenueAdapters::new(feed, history), &[SYMBOL.to_string()])
            .build(),
    )
}

fn settings(timeframes: &[Timeframe]) -> EngineSettings {
    EngineSettings {
        timeframes: timeframes.to_vec(),
        series_capacity: 100,
        reconnect_delay: Duration::from_millis(10),
        ..EngineSettings::default()
    }
}

#[tokio::test]
async fn three_minute_bucket_from_one_minute_closes() {
    let engine = engine_with(
        Arc::new(ScriptedFeed::new(VenueId::Binance)),
        Arc::new(StaticHistory::new()),
        settings(&[Timeframe::M1, Timeframe::M3]),
    );
    let closes = engine
        .register_subscription("closes", true, None, None)
        .unwrap();

    for (i, v) in [dec!(1), dec!(2), dec!(3)].into_iter().enumerate() {
        engine
            .process(VenueId::Binance, SYMBOL, tick(i as i64 * 60_000, dec!(100), v))
            .await
            .unwrap();
    }
    assert_eq!(engine.series_len(VenueId::Binance, Timeframe::M3, SYMBOL), 0);

    engine
        .process(VenueId::Binance, SYMBOL, tick(180_000, dec!(101), dec!(4)))
        .await
        .unwrap();

    let history = engine.get_history(VenueId::Binance, Timeframe::M3, SYMBOL, Some(179_999), 5);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].timestamp, 0);
    assert_eq!(history[0].volume, Some(dec!(6)));

    let received: Vec<(Timeframe, i64)> = std::iter::from_fn(|| closes.try_read())
        .map(|t| (t.timeframe, t.candle_timestamp))
        .collect();
    assert_eq!(
        received,
        vec![
            (Timeframe::M1, 0),
            (Timeframe::M1, 60_000),
            (Timeframe::M1, 120_000),
            (Timeframe::M1, 180_000),
            (Timeframe::M3, 0),
        ]
    );

    let latest = engine
        .get_latest(VenueId::Binance, Timeframe::M3, SYMBOL)
        .unwrap();
    assert_eq!(latest.timestamp, 180_000);
    assert_eq!(latest.close, Some(dec!(101)));
}

#[tokio::test]
async fn untracked_symbols_are_reported() {
    let engine = engine_with(
        Arc::new(ScriptedFeed::new(VenueId::Binance)),
        Arc::new(StaticHistory::new()),
        settings(&[Timeframe::M1]),
    );
    let err = engine
        .process(VenueId::Binance, "DOGE/USDT", tick(0, dec!(1), dec!(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, MarketDataError::NotTracked { .. }));
    assert!(engine.get_latest(VenueId::Okx, Timeframe::M1, SYMBOL).is_none());
    assert!(engine
        .get_history(VenueId::Binance, Timeframe::M1, "DOGE/USDT", None, 10)
        .is_empty());
    assert_eq!(engine.tracked_symbols().len(), 1);
    assert_eq!(engine.timeframes(), &[Timeframe::M1]);
}

async fn wait_for_sender(
    feed: &ScriptedFeed,
    symbol: &str,
) -> tokio::sync::mpsc::UnboundedSender<market_data::Result<CandleTick>> {
    for _ in 0..200 {
        if let Some(sender) = feed.take_sender(symbol) {
            return sender;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("feed was never subscribed");
}

#[tokio::test]
async fn ingestion_loop_reconnects_and_stops_on_cancel() {
    let feed = Arc::new(ScriptedFeed::new(VenueId::Binance));
    feed.fail_next_subscribes(1);
    let engine = engine_with(
        Arc::clone(&feed),
        Arc::new(StaticHistory::new()),
        settings(&[Timeframe::M1, Timeframe::M5]),
    );
    let all = engine.register_subscription("all", false, None, None).unwrap();

    let cancel = CancellationToken::new();
    let handles = engine.spawn_ingestion(&cancel);
    assert_eq!(handles.len(), 1);

    // default normalization turns BTC/USDT into BTCUSDT
    let sender = wait_for_sender(&feed, "BTCUSDT").await;
    sender.send(Ok(tick(60_000, dec!(10), dec!(1)))).unwrap();
    sender.send(Ok(tick(60_000, dec!(12), dec!(3)))).unwrap();

    let read_cancel = CancellationToken::new();
    let first = all.read(&read_cancel).await.unwrap();
    assert!(first.is_bar_close);
    assert_eq!(first.timeframe, Timeframe::M1);

    // closing the stream triggers a reconnect after the delay
    drop(sender);
    let sender = wait_for_sender(&feed, "BTCUSDT").await;
    assert_eq!(feed.subscribe_count(), 3);
    sender.send(Ok(tick(120_000, dec!(11), dec!(2)))).unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    let m5 = engine
        .get_latest(VenueId::Binance, Timeframe::M5, SYMBOL)
        .unwrap();
    assert_eq!(m5.volume, Some(dec!(3)));
    assert_eq!(m5.high, Some(dec!(12)));

    cancel.cancel();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("ingestion loop did not stop")
            .unwrap();
    }
}

#[tokio::test]
async fn cancel_stops_ingestion_blocked_on_full_wait_queue() {
    let feed = Arc::new(ScriptedFeed::new(VenueId::Binance));
    let engine = engine_with(
        Arc::clone(&feed),
        Arc::new(StaticHistory::new()),
        settings(&[Timeframe::M1]),
    );
    let stalled = engine
        .register_subscription("stalled", false, Some(1), Some(OverflowPolicy::Wait))
        .unwrap();

    let cancel = CancellationToken::new();
    let handles = engine.spawn_ingestion(&cancel);
    let sender = wait_for_sender(&feed, "BTCUSDT").await;
    sender.send(Ok(tick(0, dec!(1), dec!(1)))).unwrap();
    sender.send(Ok(tick(60_000, dec!(2), dec!(1)))).unwrap();

    // the second close waits for room that never comes
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(stalled.stats().depth, 1);
    assert_eq!(
        engine.get_latest(VenueId::Binance, Timeframe::M1, SYMBOL).unwrap().timestamp,
        60_000
    );

    cancel.cancel();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("ingestion loop ignored cancellation")
            .unwrap();
    }
}

#[tokio::test]
async fn bootstrap_seeds_history_and_live_buckets() {
    let now = current_timestamp_ms();
    let m1_bars: Vec<Bar> = (1..=30)
        .rev()
        .map(|i| Timeframe::M1.bucket_start(now) - i * 60_000)
        .chain(std::iter::once(Timeframe::M1.bucket_start(now)))
        .map(|ts| Bar::flat(ts, dec!(5), dec!(1)))
        .collect();
    let m5_bars: Vec<Bar> = (0..=6)
        .rev()
        .map(|i| Timeframe::M5.bucket_start(now) - i * 300_000)
        .map(|ts| Bar::flat(ts, dec!(5), dec!(5)))
        .collect();

    let history = Arc::new(StaticHistory::with_mappings(vec![SymbolMapping {
        logical: SYMBOL.into(),
        venue_symbol: "BTCUSDT".into(),
    }]));
    history.insert("BTCUSDT", Timeframe::M1, m1_bars);
    history.insert("BTCUSDT", Timeframe::M5, m5_bars);
    history.fail_on("BTCUSDT", Timeframe::H1);

    let mut settings = settings(&[Timeframe::M1, Timeframe::M5, Timeframe::H1]);
    settings.bootstrap.cap = 40;
    settings.bootstrap.page_size = 7;
    settings.bootstrap.request_delay = Duration::from_millis(1);

    let engine = engine_with(
        Arc::new(ScriptedFeed::new(VenueId::Binance)),
        Arc::clone(&history),
        settings,
    );
    engine.resolve_symbols().await;
    assert_eq!(engine.resolver().len(), 1);

    let reports = engine.bootstrap().await;
    let report = reports.values().next().unwrap();
    assert_eq!(report.failed, vec![Timeframe::H1]);
    assert!(history.calls() > 3);

    assert_eq!(engine.series_len(VenueId::Binance, Timeframe::M1, SYMBOL), 31);
    // the fetched bar for the live 5m window became the current bucket
    assert_eq!(engine.series_len(VenueId::Binance, Timeframe::M5, SYMBOL), 6);
    let live = engine
        .get_latest(VenueId::Binance, Timeframe::M5, SYMBOL)
        .unwrap();
    assert_eq!(live.timestamp, Timeframe::M5.bucket_start(now));

    let bars = engine.get_history(VenueId::Binance, Timeframe::M5, SYMBOL, None, 100);
    let mut stamps: Vec<i64> = bars.iter().map(|b| b.timestamp).collect();
    let total = stamps.len();
    stamps.dedup();
    assert_eq!(total, stamps.len());
    assert_eq!(total, 7);
}

#[tokio::test]
async fn bootstrap_covers_every_tracked_symbol() {
    let now = current_timestamp_ms();
    let history = Arc::new(StaticHistory::new());
    for venue_symbol in ["BTCUSDT", "ETHUSDT", "SOLUSDT"] {
        let bars = (0..5)
            .rev()
            .map(|i| Bar::flat(Timeframe::M1.bucket_start(now) - i * 60_000, dec!(1), dec!(1)))
            .collect();
        history.insert(venue_symbol, Timeframe::M1, bars);
    }

    let mut settings = settings(&[Timeframe::M1]);
    settings.bootstrap.cap = 10;
    settings.bootstrap.permits = 1;
    settings.bootstrap.request_delay = Duration::from_millis(1);
    let registry = Arc::new(SubscriptionRegistry::new(
        ChannelOptions::unbounded(),
        PressureConfig::default(),
    ));
    let symbols: Vec<String> = ["BTC/USDT", "ETH/USDT", "SOL/USDT"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let engine = MarketDataEngine::builder(settings, registry)
        .venue(
            VenueAdapters::new(Arc::new(ScriptedFeed::new(VenueId::Binance)), history),
            &symbols,
        )
        .build();

    let reports = engine.bootstrap().await;
    assert_eq!(reports.len(), 3);
    for symbol in &symbols {
        assert_eq!(engine.series_len(VenueId::Binance, Timeframe::M1, symbol), 5);
    }
    assert!(reports.values().all(|r| r.failed.is_empty()));
}
