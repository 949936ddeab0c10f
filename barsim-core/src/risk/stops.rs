//! Stop-level calculators: percentage, fixed-amount, ATR, Chandelier,
//! Bollinger. All are deterministic functions of their inputs.

use crate::domain::TimeSeries;
use crate::indicators::Bollinger;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StopError {
    #[error("{name} must be positive")]
    NonPositive { name: &'static str },

    #[error("not enough bars: need {needed}, have {have}")]
    NotEnoughBars { needed: usize, have: usize },
}

/// Stop a fixed percentage away from the entry price.
pub fn percentage_stop(entry_price: f64, percentage: f64, is_long: bool) -> Result<f64, StopError> {
    if percentage <= 0.0 {
        return Err(StopError::NonPositive { name: "percentage" });
    }
    Ok(if is_long {
        entry_price * (1.0 - percentage / 100.0)
    } else {
        entry_price * (1.0 + percentage / 100.0)
    })
}

/// Stop a fixed price amount away from the entry price.
pub fn fixed_amount_stop(entry_price: f64, amount: f64, is_long: bool) -> Result<f64, StopError> {
    if amount <= 0.0 {
        return Err(StopError::NonPositive { name: "amount" });
    }
    Ok(if is_long { entry_price - amount } else { entry_price + amount })
}

/// True range per bar: `high - low`, extended by the gap from the previous
/// close.
pub fn true_ranges(series: &TimeSeries) -> Vec<f64> {
    let bars = series.bars();
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let hl = bar.high - bar.low;
            if i == 0 {
                hl
            } else {
                let prev_close = bars[i - 1].close;
                hl.max((bar.high - prev_close).abs()).max((bar.low - prev_close).abs())
            }
        })
        .collect()
}

/// Average true range as a simple moving average of true ranges.
///
/// The first `period - 1` entries are NaN.
pub fn atr(series: &TimeSeries, period: usize) -> Vec<f64> {
    let ranges = true_ranges(series);
    let mut values = vec![f64::NAN; ranges.len()];
    if period == 0 || ranges.len() < period {
        return values;
    }
    let mut sum: f64 = ranges[..period].iter().sum();
    values[period - 1] = sum / period as f64;
    for i in period..ranges.len() {
        sum += ranges[i] - ranges[i - period];
        values[i] = sum / period as f64;
    }
    values
}

/// Volatility stop: entry price offset by `multiplier` ATRs.
pub fn atr_stop(
    series: &TimeSeries,
    period: usize,
    multiplier: f64,
    entry_price: f64,
    is_long: bool,
) -> Result<f64, StopError> {
    if multiplier <= 0.0 {
        return Err(StopError::NonPositive { name: "multiplier" });
    }
    let last_atr = last_finite_atr(series, period)?;
    Ok(if is_long {
        entry_price - last_atr * multiplier
    } else {
        entry_price + last_atr * multiplier
    })
}

/// Chandelier exit: highest high (lowest low for shorts) over the lookback,
/// offset by `multiplier` ATRs.
pub fn chandelier_exit(
    series: &TimeSeries,
    period: usize,
    multiplier: f64,
    is_long: bool,
) -> Result<f64, StopError> {
    if multiplier <= 0.0 {
        return Err(StopError::NonPositive { name: "multiplier" });
    }
    let bars = series.bars();
    if period == 0 || bars.len() < period {
        return Err(StopError::NotEnoughBars { needed: period.max(1), have: bars.len() });
    }

    let window = &bars[bars.len() - period..];
    let last_atr = last_finite_atr(series, period)?;

    Ok(if is_long {
        let highest = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        highest - last_atr * multiplier
    } else {
        let lowest = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        lowest + last_atr * multiplier
    })
}

/// Bollinger stop: the lower band for longs, the upper band for shorts.
pub fn bollinger_stop(
    series: &TimeSeries,
    period: usize,
    std_dev_multiplier: f64,
    is_long: bool,
) -> Result<f64, StopError> {
    if std_dev_multiplier <= 0.0 {
        return Err(StopError::NonPositive { name: "std_dev_multiplier" });
    }
    if period == 0 || series.len() < period {
        return Err(StopError::NotEnoughBars { needed: period.max(1), have: series.len() });
    }

    let bands = Bollinger::new(period, std_dev_multiplier).bands(series);
    let last = series.len() - 1;
    Ok(if is_long { bands.lower[last] } else { bands.upper[last] })
}

fn last_finite_atr(series: &TimeSeries, period: usize) -> Result<f64, StopError> {
    atr(series, period)
        .last()
        .copied()
        .filter(|v| v.is_finite())
        .ok_or(StopError::NotEnoughBars { needed: period.max(1), have: series.len() })
}
