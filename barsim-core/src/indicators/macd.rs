//! Moving Average Convergence Divergence.

use crate::domain::TimeSeries;
use crate::indicators::{Ema, Indicator};

/// The three MACD series: the line, its signal EMA, and their difference.
#[derive(Debug, Clone)]
pub struct MacdSeries {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
}

impl Macd {
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Self {
        assert!(
            fast_period >= 1 && slow_period > fast_period && signal_period >= 1,
            "MACD requires 1 <= fast < slow and signal >= 1"
        );
        Self { fast_period, slow_period, signal_period }
    }

    /// Conventional 12/26/9 configuration.
    pub fn standard() -> Self {
        Self::new(12, 26, 9)
    }

    /// All three series at once.
    pub fn series(&self, series: &TimeSeries) -> MacdSeries {
        let fast = Ema::new(self.fast_period).calculate(series);
        let slow = Ema::new(self.slow_period).calculate(series);

        let macd: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();

        // Signal: EMA of the MACD line, seeded where the line becomes valid.
        let mut signal = vec![f64::NAN; macd.len()];
        let valid_from = self.slow_period - 1;
        let seed_at = valid_from + self.signal_period - 1;
        if seed_at < macd.len() {
            let seed: f64 =
                macd[valid_from..=seed_at].iter().sum::<f64>() / self.signal_period as f64;
            signal[seed_at] = seed;
            let k = 2.0 / (self.signal_period as f64 + 1.0);
            let mut ema = seed;
            for i in (seed_at + 1)..macd.len() {
                ema = (macd[i] - ema) * k + ema;
                signal[i] = ema;
            }
        }

        let histogram = macd.iter().zip(&signal).map(|(m, s)| m - s).collect();
        MacdSeries { macd, signal, histogram }
    }
}

impl Indicator for Macd {
    fn name(&self) -> String {
        format!("MACD({},{},{})", self.fast_period, self.slow_period, self.signal_period)
    }

    fn calculate(&self, series: &TimeSeries) -> Vec<f64> {
        self.series(series).macd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::series_from_closes;

    #[test]
    fn flat_series_has_zero_macd() {
        let series = series_from_closes(&[100.0; 60]);
        let out = Macd::standard().series(&series);
        assert!(out.macd[25].abs() < 1e-12);
        assert!(out.macd[59].abs() < 1e-12);
        assert!(out.histogram[59].abs() < 1e-12);
    }

    #[test]
    fn uptrend_pushes_macd_positive() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + i as f64).collect();
        let series = series_from_closes(&closes);
        let out = Macd::standard().series(&series);
        assert!(out.macd[79] > 0.0);
    }

    #[test]
    fn signal_warmup_extends_past_slow_period() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).sin()).collect();
        let series = series_from_closes(&closes);
        let out = Macd::standard().series(&series);
        // slow valid at 25, signal seeded at 25 + 8 = 33
        assert!(out.signal[32].is_nan());
        assert!(!out.signal[33].is_nan());
        assert!(out.histogram[32].is_nan());
    }
}
