//! Exponential moving average, seeded with the SMA of the first window.

use crate::domain::TimeSeries;
use crate::indicators::Indicator;

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self { period }
    }

    /// Smoothing multiplier `2 / (period + 1)`.
    fn multiplier(&self) -> f64 {
        2.0 / (self.period as f64 + 1.0)
    }
}

impl Indicator for Ema {
    fn name(&self) -> String {
        format!("EMA({})", self.period)
    }

    fn calculate(&self, series: &TimeSeries) -> Vec<f64> {
        let closes = series.close_prices();
        let mut values = vec![f64::NAN; closes.len()];
        if closes.len() < self.period {
            return values;
        }

        let seed: f64 = closes[..self.period].iter().sum::<f64>() / self.period as f64;
        values[self.period - 1] = seed;

        let k = self.multiplier();
        let mut ema = seed;
        for i in self.period..closes.len() {
            ema = (closes[i] - ema) * k + ema;
            values[i] = ema;
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::series_from_closes;

    #[test]
    fn seeds_with_sma() {
        let series = series_from_closes(&[1.0, 2.0, 3.0, 4.0]);
        let values = Ema::new(3).calculate(&series);
        assert!(values[1].is_nan());
        assert!((values[2] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn follows_recurrence() {
        let series = series_from_closes(&[1.0, 2.0, 3.0, 4.0]);
        let values = Ema::new(3).calculate(&series);
        // k = 0.5: ema = (4 - 2) * 0.5 + 2 = 3
        assert!((values[3] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn tracks_trend_faster_than_sma() {
        let closes: Vec<f64> = (1..=30).map(|i| i as f64).collect();
        let series = series_from_closes(&closes);
        let ema = Ema::new(10).calculate(&series);
        let sma = crate::indicators::Sma::new(10).calculate(&series);
        // In a steady uptrend the EMA sits above the SMA
        assert!(ema[29] > sma[29]);
    }
}
