//! Technical indicators over a `TimeSeries`.
//!
//! Every indicator returns one value per bar, with NaN during its warmup.
//! Multi-band indicators (MACD, Bollinger) expose the primary line through
//! the `Indicator` trait and their full band set through an inherent method.

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

pub use bollinger::{Bollinger, BollingerBands};
pub use ema::Ema;
pub use macd::{Macd, MacdSeries};
pub use rsi::Rsi;
pub use sma::Sma;

use crate::domain::TimeSeries;

/// A per-bar derived value series aligned to its input series.
pub trait Indicator {
    fn name(&self) -> String;

    /// One value per bar; NaN until the indicator has enough history.
    fn calculate(&self, series: &TimeSeries) -> Vec<f64>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::domain::{Bar, TimeSeries};
    use chrono::{Duration, NaiveDate};

    /// Series from close prices, one bar per day.
    pub fn series_from_closes(closes: &[f64]) -> TimeSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let mut series = TimeSeries::new("TEST");
        for (i, &close) in closes.iter().enumerate() {
            let ts = start + Duration::days(i as i64);
            series.add(Bar::new(ts, close, close + 1.0, close - 1.0, close, 1000.0));
        }
        series
    }
}
