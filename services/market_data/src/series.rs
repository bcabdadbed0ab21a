//! Capacity-bounded, time-ordered bar series

use std::collections::VecDeque;
use types::Bar;

/// Closed bars for one (symbol, timeframe), oldest first.
///
/// Appending past capacity evicts from the front.
#[derive(Debug, Clone)]
pub struct BoundedSeries {
    bars: VecDeque<Bar>,
    capacity: usize,
}

impl BoundedSeries {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            bars: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.back()
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.bars.back().map(|b| b.timestamp)
    }

    /// Append, evicting the oldest bar when full
    pub fn push(&mut self, bar: Bar) {
        if self.bars.len() == self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
    }

    /// Overwrite the newest bar in place; no-op when empty
    pub fn replace_last(&mut self, bar: Bar) {
        if let Some(last) = self.bars.back_mut() {
            *last = bar;
        }
    }

    pub fn pop_last(&mut self) -> Option<Bar> {
        self.bars.pop_back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Bar> + '_ {
        self.bars.iter()
    }

    /// Merge fetched history into the series.
    ///
    /// Existing bars win on equal timestamps since they came from the live
    /// stream. Only the newest `capacity` bars are kept.
    pub fn merge(&mut self, history: impl IntoIterator<Item = Bar>) {
        let mut merged: Vec<Bar> = self.bars.drain(..).collect();
        merged.extend(history);

        // stable sort keeps live bars ahead of fetched ones with the same ts
        merged.sort_by_key(|b| b.timestamp);
        merged.dedup_by_key(|b| b.timestamp);

        let skip = merged.len().saturating_sub(self.capacity);
        self.bars.extend(merged.into_iter().skip(skip));
    }
}
