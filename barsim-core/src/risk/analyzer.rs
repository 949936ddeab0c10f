//! Risk and performance statistics over a closed-trade ledger.
//!
//! Every statistic is a deterministic function of the trades and the initial
//! capital. Ratios are expressed as fractions (a total return of 0.10 is
//! +10%), unlike the engine's percentage-keyed results record.

use crate::domain::Trade;
use serde::{Deserialize, Serialize};

/// Derived scalar statistics for one trade sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub total_return: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub volatility: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub expectancy: f64,
    pub n_trades: usize,
}

/// Computes `RiskMetrics` under a configurable annualization convention.
#[derive(Debug, Clone, Copy)]
pub struct RiskAnalyzer {
    periods_per_year: f64,
    risk_free_rate: f64,
}

impl Default for RiskAnalyzer {
    fn default() -> Self {
        Self {
            periods_per_year: crate::PERIODS_PER_YEAR,
            risk_free_rate: crate::DEFAULT_RISK_FREE_RATE,
        }
    }
}

impl RiskAnalyzer {
    /// Analyzer with an explicit periods-per-year convention and annual
    /// risk-free rate.
    pub fn new(periods_per_year: f64, risk_free_rate: f64) -> Self {
        Self { periods_per_year, risk_free_rate }
    }

    /// Full statistics pass over a trade ledger.
    ///
    /// Returns the zeroed default when there are no trades.
    pub fn metrics(&self, trades: &[Trade], initial_capital: f64) -> RiskMetrics {
        if trades.is_empty() {
            return RiskMetrics::default();
        }

        let equity = equity_curve(trades, initial_capital);
        let returns = period_returns(&equity);

        let final_equity = *equity.last().unwrap_or(&initial_capital);
        let total_return = (final_equity - initial_capital) / initial_capital;
        let max_dd = max_drawdown(&equity);

        let mut wins = 0usize;
        let mut total_win = 0.0;
        let mut total_loss = 0.0;
        for trade in trades {
            if trade.profit > 0.0 {
                wins += 1;
                total_win += trade.profit;
            } else {
                total_loss += trade.profit.abs();
            }
        }
        let losses = trades.len() - wins;
        let win_rate = wins as f64 / trades.len() as f64;
        let profit_factor = if total_loss > 0.0 { total_win / total_loss } else { f64::INFINITY };
        let avg_win = if wins > 0 { total_win / wins as f64 } else { 0.0 };
        let avg_loss = if losses > 0 { total_loss / losses as f64 } else { 0.0 };
        let expectancy = win_rate * avg_win - (1.0 - win_rate) * avg_loss;

        RiskMetrics {
            total_return,
            max_drawdown: max_dd,
            sharpe_ratio: self.sharpe(&returns),
            sortino_ratio: self.sortino(&returns),
            calmar_ratio: calmar(total_return, max_dd),
            volatility: std_dev(&returns) * self.periods_per_year.sqrt(),
            win_rate,
            profit_factor,
            expectancy,
            n_trades: trades.len(),
        }
    }

    /// Per-period risk-free rate implied by the annual rate:
    /// `(1 + rf)^(1/A) - 1`.
    fn period_risk_free(&self) -> f64 {
        (1.0 + self.risk_free_rate).powf(1.0 / self.periods_per_year) - 1.0
    }

    /// Annualized Sharpe ratio over excess period returns.
    ///
    /// With zero return deviation the ratio is undefined; the sentinel is
    /// the infinity matching the sign of the mean excess return (0 when the
    /// mean excess is itself 0).
    fn sharpe(&self, returns: &[f64]) -> f64 {
        if returns.is_empty() {
            return 0.0;
        }
        let rf = self.period_risk_free();
        let excess: Vec<f64> = returns.iter().map(|r| r - rf).collect();
        let mean = mean(&excess);
        let std = std_dev(&excess);
        if std == 0.0 {
            return zero_deviation_sentinel(mean);
        }
        mean / std * self.periods_per_year.sqrt()
    }

    /// Annualized Sortino ratio; the deviation squares only the returns
    /// below the per-period risk-free rate, normalized by the full return
    /// count.
    fn sortino(&self, returns: &[f64]) -> f64 {
        if returns.is_empty() {
            return 0.0;
        }
        let rf = self.period_risk_free();
        let mean_excess = mean(returns) - rf;

        let downside_sq_sum: f64 = returns
            .iter()
            .filter(|&&r| r < rf)
            .map(|r| (r - rf) * (r - rf))
            .sum();
        let downside_dev = (downside_sq_sum / returns.len() as f64).sqrt();

        if downside_dev == 0.0 {
            return zero_deviation_sentinel(mean_excess);
        }
        mean_excess / downside_dev * self.periods_per_year.sqrt()
    }

    /// Risk-based position size: `floor(value * risk_pct% / |entry - stop|)`.
    ///
    /// Returns 0 for non-positive prices, risk, or a degenerate stop equal
    /// to the entry.
    pub fn position_size(
        &self,
        portfolio_value: f64,
        entry_price: f64,
        stop_loss_price: f64,
        risk_pct: f64,
    ) -> f64 {
        if entry_price <= 0.0 || stop_loss_price <= 0.0 || risk_pct <= 0.0 {
            return 0.0;
        }
        let risk_per_unit = (entry_price - stop_loss_price).abs();
        if risk_per_unit == 0.0 {
            return 0.0;
        }
        (portfolio_value * risk_pct / 100.0 / risk_per_unit).floor()
    }
}

/// Equity curve seeded at the initial capital: `E[i] = E[i-1] + profit[i]`.
pub fn equity_curve(trades: &[Trade], initial_capital: f64) -> Vec<f64> {
    let mut curve = Vec::with_capacity(trades.len() + 1);
    curve.push(initial_capital);
    let mut equity = initial_capital;
    for trade in trades {
        equity += trade.profit;
        curve.push(equity);
    }
    curve
}

/// Period returns between consecutive equity points.
pub fn period_returns(equity: &[f64]) -> Vec<f64> {
    equity.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect()
}

/// Maximum drawdown over an equity curve, as a fraction of the running
/// high-water mark. Always within `[0, 1]` for non-negative equity.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut high_water = f64::MIN;
    let mut max_dd = 0.0_f64;
    for &eq in equity {
        if eq > high_water {
            high_water = eq;
        }
        if high_water > 0.0 {
            let dd = (high_water - eq) / high_water;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

fn calmar(total_return: f64, max_dd: f64) -> f64 {
    if max_dd == 0.0 {
        if total_return > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    } else {
        total_return / max_dd
    }
}

fn zero_deviation_sentinel(mean_excess: f64) -> f64 {
    if mean_excess > 0.0 {
        f64::INFINITY
    } else if mean_excess < 0.0 {
        f64::NEG_INFINITY
    } else {
        0.0
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator); 0 for fewer than 2 values.
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn drawdown_stays_in_unit_interval(
            equity in proptest::collection::vec(1.0..1_000_000.0f64, 1..200)
        ) {
            let dd = max_drawdown(&equity);
            prop_assert!((0.0..=1.0).contains(&dd));
        }

        #[test]
        fn returns_reconstruct_equity(
            start in 1_000.0..100_000.0f64,
            deltas in proptest::collection::vec(-500.0..500.0f64, 1..50)
        ) {
            let mut equity = vec![start];
            for d in &deltas {
                let next = (equity.last().unwrap() + d).max(1.0);
                equity.push(next);
            }
            let returns = period_returns(&equity);
            let mut rebuilt = equity[0];
            for r in &returns {
                rebuilt *= 1.0 + r;
            }
            prop_assert!((rebuilt - equity.last().unwrap()).abs() < 1e-6 * rebuilt.abs());
        }
    }
}
