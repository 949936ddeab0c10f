//! Per-symbol cache in front of a market data loader.

use crate::data::{DataError, MarketDataLoader};
use crate::domain::TimeSeries;
use chrono::NaiveDateTime;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Caches whole loaded series per symbol and serves range-filtered copies.
///
/// Reads take a shared lock, so concurrent backtests can query the cache
/// freely; cache fills take the write lock.
pub struct MarketDataService {
    loader: Box<dyn MarketDataLoader>,
    cache: RwLock<HashMap<String, TimeSeries>>,
}

impl MarketDataService {
    pub fn new(loader: Box<dyn MarketDataLoader>) -> Self {
        Self { loader, cache: RwLock::new(HashMap::new()) }
    }

    /// Bars for `symbol` over `[start, end]`, inclusive.
    ///
    /// Served from the cache when the cached series spans the range,
    /// otherwise loaded, cached, and filtered.
    pub fn get(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<TimeSeries, DataError> {
        {
            let cache = self.cache.read();
            if let Some(series) = cache.get(symbol) {
                if series.covers(start, end) {
                    return Ok(series.sub(start, end));
                }
            }
        }

        let loaded = self.loader.load(symbol, start, end)?;
        debug!(symbol, bars = loaded.len(), "cached fresh series");
        let filtered = loaded.sub(start, end);
        self.cache.write().insert(symbol.to_string(), loaded);
        Ok(filtered)
    }

    /// Drop every cached series.
    pub fn clear(&self) {
        self.cache.write().clear();
    }

    /// Drop one symbol from the cache.
    pub fn evict(&self, symbol: &str) {
        self.cache.write().remove(symbol);
    }
}
