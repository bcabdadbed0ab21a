//! In-memory venue adapters for tests and local runs

use crate::error::{MarketDataError, Result};
use crate::venue::{CandleStream, HistorySource, SymbolMapping, VenueFeed};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use types::{Bar, CandleTick, Timeframe, VenueId};

/// Feed whose streams are driven by test code.
///
/// Each `subscribe` call hands out a fresh stream; the matching sender is
/// retrieved with [`ScriptedFeed::take_sender`]. Dropping the sender ends the
/// stream, which makes the engine reconnect.
#[derive(Debug)]
pub struct ScriptedFeed {
    venue: VenueId,
    senders: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Result<CandleTick>>>>>,
    subscribes: AtomicUsize,
    fail_subscribes: AtomicUsize,
}

impl ScriptedFeed {
    pub fn new(venue: VenueId) -> Self {
        Self {
            venue,
            senders: Mutex::new(HashMap::new()),
            subscribes: AtomicUsize::new(0),
            fail_subscribes: AtomicUsize::new(0),
        }
    }

    /// Make the next `n` subscribe calls fail
    pub fn fail_next_subscribes(&self, n: usize) {
        self.fail_subscribes.store(n, Ordering::SeqCst);
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    /// Sender for the oldest live stream of `symbol`
    pub fn take_sender(&self, symbol: &str) -> Option<mpsc::UnboundedSender<Result<CandleTick>>> {
        let mut senders = self.senders.lock();
        let queue = senders.get_mut(symbol)?;
        if queue.is_empty() {
            None
        } else {
            Some(queue.remove(0))
        }
    }
}

#[async_trait]
impl VenueFeed for ScriptedFeed {
    fn venue(&self) -> VenueId {
        self.venue
    }

    async fn subscribe(&self, symbol: &str) -> Result<CandleStream> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .fail_subscribes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(MarketDataError::ConnectionFailed {
                venue: self.venue,
                reason: "scripted failure".into(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .lock()
            .entry(symbol.to_string())
            .or_default()
            .push(tx);

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(stream.boxed())
    }
}

/// History source serving fixed bars per (symbol, timeframe)
#[derive(Debug, Default)]
pub struct StaticHistory {
    bars: Mutex<HashMap<(String, Timeframe), Vec<Bar>>>,
    mappings: Vec<SymbolMapping>,
    fail: Mutex<Vec<(String, Timeframe)>>,
    calls: AtomicUsize,
}

impl StaticHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mappings(mappings: Vec<SymbolMapping>) -> Self {
        Self {
            mappings,
            ..Self::default()
        }
    }

    pub fn insert(&self, symbol: &str, timeframe: Timeframe, bars: Vec<Bar>) {
        self.bars.lock().insert((symbol.to_string(), timeframe), bars);
    }

    pub fn fail_on(&self, symbol: &str, timeframe: Timeframe) {
        self.fail.lock().push((symbol.to_string(), timeframe));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistorySource for StaticHistory {
    fn venue(&self) -> VenueId {
        VenueId::Binance
    }

    async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: i64,
        limit: usize,
    ) -> Result<Vec<Bar>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .fail
            .lock()
            .iter()
            .any(|(s, tf)| s == symbol && *tf == timeframe)
        {
            return Err(MarketDataError::Http {
                venue: VenueId::Binance,
                reason: "scripted failure".into(),
            });
        }

        Ok(self
            .bars
            .lock()
            .get(&(symbol.to_string(), timeframe))
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.timestamp >= since_ms)
                    .take(limit)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn symbols(&self) -> Result<Vec<SymbolMapping>> {
        Ok(self.mappings.clone())
    }
}
