//! TimeSeries — ordered, timestamp-indexed bar sequence for one symbol.

use crate::domain::Bar;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Chronologically ordered bars for a single symbol.
///
/// Timestamps are strictly increasing; adding a bar with an existing
/// timestamp overwrites the previous one (last write wins). Lookup by
/// timestamp is `O(log n)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    symbol: String,
    bars: Vec<Bar>,
}

impl TimeSeries {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self { symbol: symbol.into(), bars: Vec::new() }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Insert a bar at its chronological position.
    ///
    /// A bar whose timestamp already exists replaces the stored bar.
    pub fn add(&mut self, bar: Bar) {
        match self.bars.binary_search_by(|b| b.timestamp.cmp(&bar.timestamp)) {
            Ok(i) => self.bars[i] = bar,
            Err(i) => self.bars.insert(i, bar),
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Bar at positional index.
    pub fn get(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    /// Bar at an exact timestamp.
    pub fn get_at(&self, timestamp: NaiveDateTime) -> Option<&Bar> {
        self.index_of(timestamp).map(|i| &self.bars[i])
    }

    /// Positional index of a timestamp, if present.
    pub fn index_of(&self, timestamp: NaiveDateTime) -> Option<usize> {
        self.bars.binary_search_by(|b| b.timestamp.cmp(&timestamp)).ok()
    }

    pub fn first(&self) -> Option<&Bar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// All bars in chronological order.
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bar> {
        self.bars.iter()
    }

    /// Closing prices in chronological order.
    pub fn close_prices(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Closing prices of the last `n` bars (fewer if the series is shorter).
    pub fn last_close_prices(&self, n: usize) -> Vec<f64> {
        let start = self.bars.len().saturating_sub(n);
        self.bars[start..].iter().map(|b| b.close).collect()
    }

    /// Sub-series covering `[start, end]`, inclusive on both endpoints.
    pub fn sub(&self, start: NaiveDateTime, end: NaiveDateTime) -> TimeSeries {
        let lo = self.bars.partition_point(|b| b.timestamp < start);
        let hi = self.bars.partition_point(|b| b.timestamp <= end);
        TimeSeries { symbol: self.symbol.clone(), bars: self.bars[lo..hi].to_vec() }
    }

    /// Whether the series spans the whole of `[start, end]`.
    pub fn covers(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => first.timestamp <= start && last.timestamp >= end,
            _ => false,
        }
    }
}

impl<'a> IntoIterator for &'a TimeSeries {
    type Item = &'a Bar;
    type IntoIter = std::slice::Iter<'a, Bar>;

    fn into_iter(self) -> Self::IntoIter {
        self.bars.iter()
    }
}
