//! OHLCV bars and raw venue candle ticks
//!
//! Numeric fields are optional. Venues occasionally send partial payloads
//! (missing volume on the first tick of a minute, null prices on illiquid
//! pairs) and a gap in one field must never discard the rest of the candle.
//! The folding helpers coalesce: a missing value never replaces a present one.

use crate::Timeframe;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV bar whose `timestamp` is the aligned window start in ms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub volume: Option<Decimal>,
}

impl Bar {
    /// Bar where open, high, low and close all equal `price`
    pub fn flat(timestamp: i64, price: Decimal, volume: Decimal) -> Self {
        Self {
            timestamp,
            open: Some(price),
            high: Some(price),
            low: Some(price),
            close: Some(price),
            volume: Some(volume),
        }
    }

    /// Seed a new bucket at `bucket_start` from a finer bar
    pub fn seeded_from(bucket_start: i64, source: &Bar) -> Self {
        Self {
            timestamp: bucket_start,
            ..*source
        }
    }

    /// Fold a newly closed finer bar into this bucket.
    ///
    /// `high`/`low` take the extreme, `close` follows the newer bar and
    /// `volume` accumulates. `open` is only filled if this bucket lacks one.
    pub fn absorb(&mut self, finer: &Bar) {
        self.open = self.open.or(finer.open);
        self.high = coalesce_max(self.high, finer.high);
        self.low = coalesce_min(self.low, finer.low);
        self.close = finer.close.or(self.close);
        self.volume = coalesce_sum(self.volume, finer.volume);
    }

    /// Propagate a revision of the still-forming finer bar.
    ///
    /// Volume is left untouched: the finer bar's volume was already counted
    /// when it first closed, and re-adding it would double count.
    pub fn revise_prices(&mut self, finer: &Bar) {
        self.high = coalesce_max(self.high, finer.high);
        self.low = coalesce_min(self.low, finer.low);
        self.close = finer.close.or(self.close);
    }

    /// Build a bucket by aggregating ordered finer bars.
    ///
    /// Returns `None` when `bars` is empty.
    pub fn aggregate<'a, I>(bucket_start: i64, bars: I) -> Option<Bar>
    where
        I: IntoIterator<Item = &'a Bar>,
    {
        let mut iter = bars.into_iter();
        let first = iter.next()?;
        let mut bucket = Bar::seeded_from(bucket_start, first);
        for bar in iter {
            bucket.absorb(bar);
        }
        Some(bucket)
    }
}

/// Candle as delivered by a venue stream, before alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CandleTick {
    /// Candle open time in ms; venues may report a few ms past the boundary
    pub timestamp: i64,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub volume: Option<Decimal>,
}

impl CandleTick {
    /// Convert into a bar aligned to the finest window
    pub fn into_bar(self) -> Bar {
        Bar {
            timestamp: Timeframe::FINEST.bucket_start(self.timestamp),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

impl From<CandleTick> for Bar {
    fn from(tick: CandleTick) -> Self {
        tick.into_bar()
    }
}

fn coalesce_max(a: Option<Decimal>, b: Option<Decimal>) -> Option<Decimal> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn coalesce_min(a: Option<Decimal>, b: Option<Decimal>) -> Option<Decimal> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn coalesce_sum(a: Option<Decimal>, b: Option<Decimal>) -> Option<Decimal> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or_default() + b.unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(ts: i64, o: Decimal, h: Decimal, l: Decimal, c: Decimal, v: Decimal) -> Bar {
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
    fn test_absorb_folds_ohlcv() {
        let mut bucket = Bar::seeded_from(0, &bar(0, dec!(10), dec!(12), dec!(9), dec!(11), dec!(1)));
        bucket.absorb(&bar(60_000, dec!(11), dec!(15), dec!(10), dec!(14), dec!(2)));
        bucket.absorb(&bar(120_000, dec!(14), dec!(14), dec!(7), dec!(8), dec!(3)));

        assert_eq!(bucket.timestamp, 0);
        assert_eq!(bucket.open, Some(dec!(10)));
        assert_eq!(bucket.high, Some(dec!(15)));
        assert_eq!(bucket.low, Some(dec!(7)));
        assert_eq!(bucket.close, Some(dec!(8)));
        assert_eq!(bucket.volume, Some(dec!(6)));
    }

    #[test]
    fn test_missing_values_never_replace_present_ones() {
        let mut bucket = Bar::flat(0, dec!(5), dec!(1));
        bucket.absorb(&Bar {
            timestamp: 60_000,
            ..Bar::default()
        });
        assert_eq!(bucket, Bar::flat(0, dec!(5), dec!(1)));

        let mut empty = Bar::default();
        empty.absorb(&Bar::default());
        assert_eq!(empty.volume, None);

        empty.absorb(&Bar {
            volume: Some(dec!(2)),
            ..Bar::default()
        });
        assert_eq!(empty.volume, Some(dec!(2)));
    }

    #[test]
    fn test_revise_prices_keeps_volume() {
        let mut bucket = Bar::flat(0, dec!(5), dec!(4));
        bucket.revise_prices(&bar(0, dec!(5), dec!(9), dec!(3), dec!(6), dec!(100)));
        assert_eq!(bucket.high, Some(dec!(9)));
        assert_eq!(bucket.low, Some(dec!(3)));
        assert_eq!(bucket.close, Some(dec!(6)));
        assert_eq!(bucket.volume, Some(dec!(4)));
    }

    #[test]
    fn test_aggregate() {
        assert_eq!(Bar::aggregate(0, std::iter::empty()), None);

        let bars = [
            bar(180_000, dec!(1), dec!(2), dec!(1), dec!(2), dec!(1)),
            bar(240_000, dec!(2), dec!(3), dec!(2), dec!(3), dec!(1)),
        ];
        let bucket = Bar::aggregate(180_000, bars.iter()).unwrap();
        assert_eq!(bucket.open, Some(dec!(1)));
        assert_eq!(bucket.close, Some(dec!(3)));
        assert_eq!(bucket.high, Some(dec!(3)));
        assert_eq!(bucket.volume, Some(dec!(2)));
    }

    #[test]
    fn test_tick_alignment() {
        let tick = CandleTick {
            timestamp: 120_007,
            close: Some(dec!(1)),
            ..CandleTick::default()
        };
        let bar: Bar = tick.into();
        assert_eq!(bar.timestamp, 120_000);
        assert_eq!(bar.close, Some(dec!(1)));
    }
}
