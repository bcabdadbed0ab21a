//! Per-symbol multi-timeframe candle cache
//!
//! Each `SymbolCache` owns one mutex. Ingestion folds a finest-timeframe
//! candle into every coarser timeframe inside a single critical section, and
//! readers copy out under the same lock, so a reader never observes a
//! half-applied candle. Symbols never contend with each other.
//!
//! The finest timeframe keeps no separate current bucket: its newest closed
//! bar *is* the forming candle and is overwritten in place by revisions.

use crate::series::BoundedSeries;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use types::{Bar, MarketDataTask, SymbolKey, Timeframe};

/// What a single candle did to the cache, in emission order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleEvent {
    Closed { timeframe: Timeframe, timestamp: i64 },
    Updated { timeframe: Timeframe, timestamp: i64 },
}

#[derive(Debug)]
struct TimeframeState {
    closed: BoundedSeries,
    current: Option<Bar>,
}

#[derive(Debug)]
struct CacheState {
    // BTreeMap iterates finest to coarsest
    frames: BTreeMap<Timeframe, TimeframeState>,
}

impl CacheState {
    fn finest(&self) -> Option<&TimeframeState> {
        self.frames.get(&Timeframe::FINEST)
    }

    fn apply(&mut self, bar: Bar) -> Vec<CandleEvent> {
        let last_ts = self.finest().and_then(|f| f.closed.last_timestamp());

        match last_ts {
            Some(last) if bar.timestamp < last => {
                tracing::debug!(
                    "Dropping stale candle at {} (last closed {})",
                    bar.timestamp,
                    last
                );
                Vec::new()
            }
            Some(last) if bar.timestamp == last => self.revise(bar),
            _ => self.close(bar),
        }
    }

    /// A strictly newer candle: append and fold into every coarser bucket
    fn close(&mut self, bar: Bar) -> Vec<CandleEvent> {
        let mut events = Vec::with_capacity(self.frames.len() + 2);

        for (&tf, frame) in self.frames.iter_mut() {
            if tf.is_finest() {
                frame.closed.push(bar);
                events.push(CandleEvent::Closed {
                    timeframe: tf,
                    timestamp: bar.timestamp,
                });
                continue;
            }

            let start = tf.bucket_start(bar.timestamp);
            match frame.current.as_mut() {
                None => {
                    frame.current = Some(Bar::seeded_from(start, &bar));
                    events.push(CandleEvent::Updated {
                        timeframe: tf,
                        timestamp: start,
                    });
                }
                Some(current) if current.timestamp == start => {
                    current.absorb(&bar);
                    events.push(CandleEvent::Updated {
                        timeframe: tf,
                        timestamp: start,
                    });
                }
                Some(current) if current.timestamp < start => {
                    let finished = *current;
                    match frame.closed.last_timestamp() {
                        // a fetched bar for the same window is superseded
                        Some(last) if last == finished.timestamp => {
                            frame.closed.replace_last(finished)
                        }
                        Some(last) if last > finished.timestamp => tracing::debug!(
                            "{} series already holds {}, not closing bucket at {}",
                            tf,
                            last,
                            finished.timestamp
                        ),
                        _ => frame.closed.push(finished),
                    }
                    events.push(CandleEvent::Closed {
                        timeframe: tf,
                        timestamp: finished.timestamp,
                    });
                    frame.current = Some(Bar::seeded_from(start, &bar));
                }
                Some(current) => {
                    tracing::debug!(
                        "{} bucket at {} is ahead of candle at {}, skipping fold",
                        tf,
                        current.timestamp,
                        bar.timestamp
                    );
                }
            }
        }

        events
    }

    /// Same timestamp as the newest finest bar: the candle is still forming
    fn revise(&mut self, bar: Bar) -> Vec<CandleEvent> {
        let mut events = Vec::new();

        for (&tf, frame) in self.frames.iter_mut() {
            if tf.is_finest() {
                frame.closed.replace_last(bar);
                events.push(CandleEvent::Updated {
                    timeframe: tf,
                    timestamp: bar.timestamp,
                });
                continue;
            }

            let start = tf.bucket_start(bar.timestamp);
            if let Some(current) = frame.current.as_mut() {
                if current.timestamp == start {
                    current.revise_prices(&bar);
                    events.push(CandleEvent::Updated {
                        timeframe: tf,
                        timestamp: start,
                    });
                }
            }
        }

        events
    }

    fn history(&self, tf: Timeframe, end_cutoff: Option<i64>, count: usize) -> Vec<Bar> {
        let Some(frame) = self.frames.get(&tf) else {
            return Vec::new();
        };
        if count == 0 {
            return Vec::new();
        }

        let cutoff = end_cutoff.unwrap_or(i64::MAX);
        let newest_closed = frame.closed.last_timestamp();
        let live = frame.current.filter(|cur| {
            cur.timestamp <= cutoff && newest_closed.map_or(true, |last| cur.timestamp >= last)
        });

        let mut out = Vec::new();
        if let Some(cur) = live {
            out.push(cur);
        }
        for bar in frame.closed.iter().rev() {
            if out.len() >= count {
                break;
            }
            // the live bucket supersedes a closed bar with the same start
            if bar.timestamp > cutoff || live.is_some_and(|cur| cur.timestamp == bar.timestamp) {
                continue;
            }
            out.push(*bar);
        }

        out.reverse();
        out
    }

    fn latest(&self, tf: Timeframe) -> Option<Bar> {
        let frame = self.frames.get(&tf)?;
        frame.current.or_else(|| frame.closed.last().copied())
    }

    /// Rebuild every coarser current bucket from the finest bars in its window.
    ///
    /// Without finest history the open window comes from `now`, and a fetched
    /// bar for it becomes the current bucket instead of a closed bar.
    fn rebuild_live_buckets(&mut self, now: i64) {
        let finest_bars: Vec<Bar> = self
            .finest()
            .map(|f| f.closed.iter().copied().collect())
            .unwrap_or_default();
        let reference = finest_bars.last().map_or(now, |b| b.timestamp);

        for (&tf, frame) in self.frames.iter_mut() {
            if tf.is_finest() {
                continue;
            }
            let window = tf.bucket_start(reference);
            let fetched = if frame.closed.last_timestamp() == Some(window) {
                frame.closed.pop_last()
            } else {
                None
            };
            let in_window = finest_bars.iter().filter(|b| b.timestamp >= window);
            frame.current = Bar::aggregate(window, in_window).or(fetched);
        }
    }
}

/// Candle cache for one (venue, symbol)
#[derive(Debug)]
pub struct SymbolCache {
    key: SymbolKey,
    symbol: Arc<str>,
    timeframes: Vec<Timeframe>,
    state: Mutex<CacheState>,
}

impl SymbolCache {
    /// The finest timeframe is always tracked, even when not requested
    pub fn new(key: SymbolKey, timeframes: &[Timeframe], capacity: usize) -> Self {
        let mut frames = BTreeMap::new();
        frames.insert(
            Timeframe::FINEST,
            TimeframeState {
                closed: BoundedSeries::new(capacity),
                current: None,
            },
        );
        for &tf in timeframes {
            frames.entry(tf).or_insert_with(|| TimeframeState {
                closed: BoundedSeries::new(capacity),
                current: None,
            });
        }

        let symbol: Arc<str> = Arc::from(key.symbol.as_str());
        Self {
            timeframes: frames.keys().copied().collect(),
            key,
            symbol,
            state: Mutex::new(CacheState { frames }),
        }
    }

    pub fn key(&self) -> &SymbolKey {
        &self.key
    }

    /// Tracked timeframes, finest first
    pub fn timeframes(&self) -> &[Timeframe] {
        &self.timeframes
    }

    /// Fold one finest-timeframe bar; returns the resulting events
    pub fn apply(&self, bar: Bar) -> Vec<CandleEvent> {
        self.state.lock().apply(bar)
    }

    /// Fold a bar and build the tasks to publish after the lock is released
    pub fn ingest(&self, bar: Bar) -> Vec<MarketDataTask> {
        let events = self.apply(bar);
        events
            .into_iter()
            .map(|event| match event {
                CandleEvent::Closed {
                    timeframe,
                    timestamp,
                } => MarketDataTask::bar_close(
                    self.key.venue,
                    Arc::clone(&self.symbol),
                    timeframe,
                    timestamp,
                ),
                CandleEvent::Updated {
                    timeframe,
                    timestamp,
                } => MarketDataTask::bar_update(
                    self.key.venue,
                    Arc::clone(&self.symbol),
                    timeframe,
                    timestamp,
                ),
            })
            .collect()
    }

    pub fn latest(&self, tf: Timeframe) -> Option<Bar> {
        self.state.lock().latest(tf)
    }

    /// Up to `count` bars ending at or before `end_cutoff`, oldest first
    pub fn history(&self, tf: Timeframe, end_cutoff: Option<i64>, count: usize) -> Vec<Bar> {
        self.state.lock().history(tf, end_cutoff, count)
    }

    /// Merge fetched closed bars into one timeframe's series
    pub fn seed_history(&self, tf: Timeframe, bars: Vec<Bar>) {
        let mut state = self.state.lock();
        if let Some(frame) = state.frames.get_mut(&tf) {
            frame.closed.merge(bars);
        }
    }

    /// Align coarser current buckets with the open window after a bootstrap
    pub fn rebuild_live_buckets(&self, now: i64) {
        self.state.lock().rebuild_live_buckets(now);
    }

    /// Closed bars currently held for `tf`
    pub fn series_len(&self, tf: Timeframe) -> usize {
        self.state
            .lock()
            .frames
            .get(&tf)
            .map_or(0, |frame| frame.closed.len())
    }

    pub fn current_bucket(&self, tf: Timeframe) -> Option<Bar> {
        self.state.lock().frames.get(&tf).and_then(|f| f.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use types::VenueId;

    fn cache(timeframes: &[Timeframe], cap: usize) -> SymbolCache {
        SymbolCache::new(SymbolKey::new(VenueId::Binance, "BTC/USDT"), timeframes, cap)
    }

    fn candle(ts: i64, o: Decimal, h: Decimal, l: Decimal, c: Decimal, v: Decimal) -> Bar {
        Bar {
            timestamp: ts,
            open: Some(o),
            high: Some(h),
            low: Some(l),
            close: Some(c),
            volume: Some(v),
        }
    }

    #[test]
    fn test_three_minute_bucket_finalizes() {
        let cache = cache(&[Timeframe::M1, Timeframe::M3], 100);
        cache.apply(candle(0, dec!(10), dec!(11), dec!(9), dec!(10), dec!(1)));
        cache.apply(candle(60_000, dec!(10), dec!(13), dec!(10), dec!(12), dec!(2)));
        cache.apply(candle(120_000, dec!(12), dec!(12), dec!(8), dec!(9), dec!(3)));
        assert_eq!(cache.series_len(Timeframe::M3), 0);

        let events = cache.apply(candle(180_000, dec!(9), dec!(9), dec!(9), dec!(9), dec!(4)));
        assert_eq!(
            events,
            vec![
                CandleEvent::Closed {
                    timeframe: Timeframe::M1,
                    timestamp: 180_000
                },
                CandleEvent::Closed {
                    timeframe: Timeframe::M3,
                    timestamp: 0
                },
            ]
        );

        let closed = cache.history(Timeframe::M3, Some(179_999), 10);
        assert_eq!(closed.len(), 1);
        let bucket = closed[0];
        assert_eq!(bucket.timestamp, 0);
        assert_eq!(bucket.open, Some(dec!(10)));
        assert_eq!(bucket.high, Some(dec!(13)));
        assert_eq!(bucket.low, Some(dec!(8)));
        assert_eq!(bucket.close, Some(dec!(9)));
        assert_eq!(bucket.volume, Some(dec!(6)));

        let live = cache.current_bucket(Timeframe::M3).unwrap();
        assert_eq!(live.timestamp, 180_000);
        assert_eq!(live.volume, Some(dec!(4)));
    }

    #[test]
    fn test_finest_never_has_current_bucket() {
        let cache = cache(&Timeframe::ALL, 10);
        cache.apply(Bar::flat(0, dec!(1), dec!(1)));
        cache.apply(Bar::flat(0, dec!(2), dec!(1)));
        cache.apply(Bar::flat(60_000, dec!(3), dec!(1)));
        assert!(cache.current_bucket(Timeframe::M1).is_none());
        assert_eq!(cache.latest(Timeframe::M1).unwrap().close, Some(dec!(3)));
    }

    #[test]
    fn test_revisions_update_prices_not_volume() {
        let cache = cache(&[Timeframe::M1, Timeframe::M5], 10);
        cache.apply(candle(60_000, dec!(10), dec!(10), dec!(10), dec!(10), dec!(2)));

        let events = cache.apply(candle(60_000, dec!(10), dec!(14), dec!(7), dec!(12), dec!(5)));
        assert_eq!(
            events,
            vec![
                CandleEvent::Updated {
                    timeframe: Timeframe::M1,
                    timestamp: 60_000
                },
                CandleEvent::Updated {
                    timeframe: Timeframe::M5,
                    timestamp: 0
                },
            ]
        );

        let m1 = cache.latest(Timeframe::M1).unwrap();
        assert_eq!(m1.volume, Some(dec!(5)));
        assert_eq!(m1.high, Some(dec!(14)));

        let m5 = cache.latest(Timeframe::M5).unwrap();
        assert_eq!(m5.high, Some(dec!(14)));
        assert_eq!(m5.low, Some(dec!(7)));
        assert_eq!(m5.close, Some(dec!(12)));
        assert_eq!(m5.volume, Some(dec!(2)));
    }

    #[test]
    fn test_stale_candle_dropped() {
        let cache = cache(&[Timeframe::M1, Timeframe::M3], 10);
        cache.apply(Bar::flat(120_000, dec!(1), dec!(1)));
        assert!(cache.apply(Bar::flat(60_000, dec!(9), dec!(1))).is_empty());
        assert_eq!(cache.series_len(Timeframe::M1), 1);
        assert_eq!(cache.latest(Timeframe::M1).unwrap().close, Some(dec!(1)));
    }

    #[test]
    fn test_update_tasks_only_for_open_coarse_buckets() {
        let cache = cache(&[Timeframe::M1, Timeframe::M3, Timeframe::M15], 10);
        cache.apply(Bar::flat(120_000, dec!(1), dec!(1)));
        let tasks = cache.ingest(Bar::flat(180_000, dec!(1), dec!(1)));

        let summary: Vec<(Timeframe, i64, bool)> = tasks
            .iter()
            .map(|t| (t.timeframe, t.candle_timestamp, t.is_bar_close))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Timeframe::M1, 180_000, true),
                (Timeframe::M3, 0, true),
                (Timeframe::M15, 0, false),
            ]
        );
        assert!(tasks.iter().all(|t| &*t.symbol == "BTC/USDT"));
    }

    #[test]
    fn test_history_has_no_duplicate_timestamps() {
        let cache = cache(&[Timeframe::M1, Timeframe::M3], 10);
        // a fetched bar for the live window, then a rebuilt live bucket
        cache.seed_history(Timeframe::M3, vec![Bar::flat(0, dec!(1), dec!(1))]);
        cache.seed_history(
            Timeframe::M3,
            vec![Bar::flat(180_000, dec!(2), dec!(1))],
        );
        cache.seed_history(Timeframe::M1, vec![Bar::flat(180_000, dec!(2), dec!(1))]);
        cache.rebuild_live_buckets(240_000);
        cache.apply(Bar::flat(240_000, dec!(3), dec!(1)));

        let bars = cache.history(Timeframe::M3, None, 10);
        let ts: Vec<i64> = bars.iter().map(|b| b.timestamp).collect();
        assert_eq!(ts, vec![0, 180_000]);
        assert_eq!(bars[1].close, Some(dec!(3)));
        assert_eq!(bars[1].volume, Some(dec!(2)));
    }

    #[test]
    fn test_live_close_supersedes_fetched_bar_without_finest_history() {
        let cache = cache(&[Timeframe::M1, Timeframe::M3], 10);
        // the finest fetch failed, so the open 3m window still holds its fetched bar
        cache.seed_history(
            Timeframe::M3,
            vec![
                Bar::flat(0, dec!(1), dec!(1)),
                Bar::flat(180_000, dec!(50), dec!(50)),
            ],
        );
        for (i, ts) in [180_000, 240_000, 300_000, 360_000].into_iter().enumerate() {
            cache.apply(Bar::flat(ts, Decimal::from(i + 2), dec!(1)));
        }

        let bars = cache.history(Timeframe::M3, None, 10);
        let ts: Vec<i64> = bars.iter().map(|b| b.timestamp).collect();
        assert_eq!(ts, vec![0, 180_000, 360_000]);
        assert_eq!(bars[1].volume, Some(dec!(3)));
        assert_eq!(bars[1].close, Some(dec!(4)));
        assert_eq!(cache.series_len(Timeframe::M3), 2);
    }

    #[test]
    fn test_rebuild_without_finest_promotes_fetched_window() {
        let cache = cache(&[Timeframe::M1, Timeframe::M3], 10);
        cache.seed_history(
            Timeframe::M3,
            vec![
                Bar::flat(0, dec!(1), dec!(1)),
                Bar::flat(180_000, dec!(50), dec!(7)),
            ],
        );
        cache.rebuild_live_buckets(200_000);

        assert_eq!(cache.series_len(Timeframe::M3), 1);
        let live = cache.current_bucket(Timeframe::M3).unwrap();
        assert_eq!(live.timestamp, 180_000);
        assert_eq!(live.volume, Some(dec!(7)));

        cache.apply(Bar::flat(240_000, dec!(51), dec!(1)));
        cache.apply(Bar::flat(360_000, dec!(52), dec!(1)));
        let ts: Vec<i64> = cache
            .history(Timeframe::M3, None, 10)
            .iter()
            .map(|b| b.timestamp)
            .collect();
        assert_eq!(ts, vec![0, 180_000, 360_000]);
    }

    #[test]
    fn test_history_cutoff_and_count() {
        let cache = cache(&[Timeframe::M1], 10);
        for i in 0..5 {
            cache.apply(Bar::flat(i * 60_000, Decimal::from(i), dec!(1)));
        }
        let ts: Vec<i64> = cache
            .history(Timeframe::M1, Some(180_000), 2)
            .iter()
            .map(|b| b.timestamp)
            .collect();
        assert_eq!(ts, vec![120_000, 180_000]);

        let recent: Vec<i64> = cache
            .history(Timeframe::M1, None, 3)
            .iter()
            .map(|b| b.timestamp)
            .collect();
        assert_eq!(recent, vec![120_000, 180_000, 240_000]);
        assert!(cache.history(Timeframe::M1, None, 0).is_empty());
        assert!(cache.history(Timeframe::H1, None, 5).is_empty());
    }

    #[test]
    fn test_rebuild_live_buckets_from_finest() {
        let cache = cache(&[Timeframe::M1, Timeframe::M3], 10);
        cache.seed_history(
            Timeframe::M1,
            vec![
                candle(180_000, dec!(5), dec!(6), dec!(4), dec!(5), dec!(1)),
                candle(240_000, dec!(5), dec!(8), dec!(5), dec!(7), dec!(2)),
            ],
        );
        cache.seed_history(
            Timeframe::M3,
            vec![
                Bar::flat(0, dec!(1), dec!(10)),
                Bar::flat(180_000, dec!(99), dec!(99)),
            ],
        );
        cache.rebuild_live_buckets(240_000);

        assert_eq!(cache.series_len(Timeframe::M3), 1);
        let live = cache.current_bucket(Timeframe::M3).unwrap();
        assert_eq!(live.timestamp, 180_000);
        assert_eq!(live.open, Some(dec!(5)));
        assert_eq!(live.high, Some(dec!(8)));
        assert_eq!(live.low, Some(dec!(4)));
        assert_eq!(live.close, Some(dec!(7)));
        assert_eq!(live.volume, Some(dec!(3)));

        // the next live candle in the same window extends the rebuilt bucket
        cache.apply(candle(300_000, dec!(7), dec!(9), dec!(7), dec!(9), dec!(1)));
        assert_eq!(cache.current_bucket(Timeframe::M3).unwrap().volume, Some(dec!(4)));
    }

    proptest! {
        #[test]
        fn coarse_volume_ignores_revisions(
            volumes in proptest::collection::vec(1u32..1000, 1..20),
            revisions in proptest::collection::vec(1u32..1000, 0..10),
        ) {
            let cache = cache(&[Timeframe::M1, Timeframe::M30], 64);
            let mut expected = Decimal::ZERO;
            for (i, v) in volumes.iter().enumerate() {
                cache.apply(Bar::flat(i as i64 * 60_000, Decimal::ONE, Decimal::from(*v)));
                expected += Decimal::from(*v);
            }
            let last_ts = (volumes.len() as i64 - 1) * 60_000;
            for r in &revisions {
                cache.apply(Bar::flat(last_ts, Decimal::TWO, Decimal::from(*r)));
            }

            let bucket = cache.latest(Timeframe::M30).unwrap();
            prop_assert_eq!(bucket.volume, Some(expected));
        }

        #[test]
        fn closed_series_respect_capacity(cap in 1usize..20, n in 1i64..300) {
            let cache = cache(&[Timeframe::M1, Timeframe::M3, Timeframe::M5], cap);
            for i in 0..n {
                cache.apply(Bar::flat(i * 60_000, Decimal::ONE, Decimal::ONE));
            }
            for tf in [Timeframe::M1, Timeframe::M3, Timeframe::M5] {
                prop_assert!(cache.series_len(tf) <= cap);
                let bars = cache.history(tf, None, usize::MAX);
                let mut ts: Vec<i64> = bars.iter().map(|b| b.timestamp).collect();
                let before = ts.len();
                ts.dedup();
                prop_assert_eq!(before, ts.len());
            }
        }
    }
}
