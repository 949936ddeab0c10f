//! Bollinger Bands: SMA center with standard-deviation envelopes.

use crate::domain::TimeSeries;
use crate::indicators::{Indicator, Sma};

#[derive(Debug, Clone)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    period: usize,
    std_dev_multiplier: f64,
}

impl Bollinger {
    pub fn new(period: usize, std_dev_multiplier: f64) -> Self {
        assert!(period >= 2, "Bollinger period must be >= 2");
        Self { period, std_dev_multiplier }
    }

    /// Conventional 20-period, 2-sigma configuration.
    pub fn standard() -> Self {
        Self::new(20, 2.0)
    }

    /// Upper, middle, and lower band series.
    pub fn bands(&self, series: &TimeSeries) -> BollingerBands {
        let closes = series.close_prices();
        let middle = Sma::new(self.period).calculate(series);
        let mut upper = vec![f64::NAN; closes.len()];
        let mut lower = vec![f64::NAN; closes.len()];

        for i in (self.period - 1)..closes.len() {
            let window = &closes[i + 1 - self.period..=i];
            let mean = middle[i];
            let variance =
                window.iter().map(|c| (c - mean) * (c - mean)).sum::<f64>() / self.period as f64;
            let offset = variance.sqrt() * self.std_dev_multiplier;
            upper[i] = mean + offset;
            lower[i] = mean - offset;
        }

        BollingerBands { upper, middle, lower }
    }
}

impl Indicator for Bollinger {
    fn name(&self) -> String {
        format!("BB({},{})", self.period, self.std_dev_multiplier)
    }

    fn calculate(&self, series: &TimeSeries) -> Vec<f64> {
        self.bands(series).middle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::series_from_closes;

    #[test]
    fn constant_series_collapses_bands() {
        let series = series_from_closes(&[100.0; 30]);
        let bands = Bollinger::standard().bands(&series);
        assert!((bands.upper[29] - 100.0).abs() < 1e-12);
        assert!((bands.middle[29] - 100.0).abs() < 1e-12);
        assert!((bands.lower[29] - 100.0).abs() < 1e-12);
    }

    #[test]
    fn bands_bracket_the_middle() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let series = series_from_closes(&closes);
        let bands = Bollinger::standard().bands(&series);
        for i in 19..40 {
            assert!(bands.upper[i] >= bands.middle[i]);
            assert!(bands.lower[i] <= bands.middle[i]);
        }
    }

    #[test]
    fn warmup_is_nan() {
        let series = series_from_closes(&[100.0; 30]);
        let bands = Bollinger::standard().bands(&series);
        assert!(bands.upper[18].is_nan());
        assert!(bands.lower[18].is_nan());
    }
}
