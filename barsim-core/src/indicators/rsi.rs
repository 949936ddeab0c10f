//! Relative Strength Index with Wilder smoothing.

use crate::domain::TimeSeries;
use crate::indicators::Indicator;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self { period }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> String {
        format!("RSI({})", self.period)
    }

    fn calculate(&self, series: &TimeSeries) -> Vec<f64> {
        let closes = series.close_prices();
        let mut values = vec![f64::NAN; closes.len()];
        // needs `period` price changes, i.e. period + 1 closes
        if closes.len() <= self.period {
            return values;
        }

        let mut avg_gain = 0.0;
        let mut avg_loss = 0.0;
        for i in 1..=self.period {
            let change = closes[i] - closes[i - 1];
            if change > 0.0 {
                avg_gain += change;
            } else {
                avg_loss += -change;
            }
        }
        avg_gain /= self.period as f64;
        avg_loss /= self.period as f64;
        values[self.period] = rsi_from_averages(avg_gain, avg_loss);

        let n = self.period as f64;
        for i in (self.period + 1)..closes.len() {
            let change = closes[i] - closes[i - 1];
            let (gain, loss) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };
            avg_gain = (avg_gain * (n - 1.0) + gain) / n;
            avg_loss = (avg_loss * (n - 1.0) + loss) / n;
            values[i] = rsi_from_averages(avg_gain, avg_loss);
        }
        values
    }
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}
