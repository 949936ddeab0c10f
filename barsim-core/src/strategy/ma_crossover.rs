//! Moving-average crossover strategy.
//!
//! Goes long when the fast average crosses above the slow average and exits
//! when it crosses back below. Short entries are not generated; the engine
//! is long-only by default.

use crate::domain::{Bar, Order, Portfolio, TimeSeries};
use crate::indicators::{Ema, Indicator, Sma};
use crate::risk::stops::percentage_stop;
use crate::strategy::{ParamSet, ParamValue, Strategy, StrategyError};
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet};

pub struct MaCrossover {
    symbol: String,
    fast_period: usize,
    slow_period: usize,
    use_ema: bool,
    /// Fraction of portfolio value committed per entry.
    position_size: f64,
    /// Stop-loss distance from the entry close, in percent; 0 disables.
    stop_loss_pct: f64,
    /// Take-profit distance from the entry close, in percent; 0 disables.
    take_profit_pct: f64,

    series: Option<TimeSeries>,
    fast_values: Vec<f64>,
    slow_values: Vec<f64>,
    prev_cross_above: Option<bool>,
}

impl MaCrossover {
    pub fn new(
        symbol: impl Into<String>,
        fast_period: usize,
        slow_period: usize,
        use_ema: bool,
        position_size: f64,
        stop_loss_pct: f64,
        take_profit_pct: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            fast_period,
            slow_period,
            use_ema,
            position_size,
            stop_loss_pct,
            take_profit_pct,
            series: None,
            fast_values: Vec::new(),
            slow_values: Vec::new(),
            prev_cross_above: None,
        }
    }

    fn compute_indicators(&mut self) {
        let Some(series) = &self.series else { return };
        if self.use_ema {
            self.fast_values = Ema::new(self.fast_period).calculate(series);
            self.slow_values = Ema::new(self.slow_period).calculate(series);
        } else {
            self.fast_values = Sma::new(self.fast_period).calculate(series);
            self.slow_values = Sma::new(self.slow_period).calculate(series);
        }
    }

    /// Moving averages at the bar for `timestamp`, when both are valid.
    fn values_at(&self, timestamp: NaiveDateTime) -> Option<(f64, f64)> {
        let index = self.series.as_ref()?.index_of(timestamp)?;
        let fast = *self.fast_values.get(index)?;
        let slow = *self.slow_values.get(index)?;
        (!fast.is_nan() && !slow.is_nan()).then_some((fast, slow))
    }

    fn sized_quantity(&self, portfolio: &Portfolio, price: f64) -> f64 {
        (portfolio.total_value() * self.position_size / price).floor()
    }
}

impl Strategy for MaCrossover {
    fn name(&self) -> String {
        let kind = if self.use_ema { "EMA" } else { "SMA" };
        format!("MA Crossover ({kind}, {}, {})", self.fast_period, self.slow_period)
    }

    fn required_symbols(&self) -> BTreeSet<String> {
        BTreeSet::from([self.symbol.clone()])
    }

    fn initialize(&mut self, data: &BTreeMap<String, TimeSeries>) -> Result<(), StrategyError> {
        let series = data
            .get(&self.symbol)
            .ok_or_else(|| StrategyError::MissingData { symbol: self.symbol.clone() })?;
        self.series = Some(series.clone());
        self.compute_indicators();
        // Cross state seeds lazily from the first bar with valid averages;
        // seeding from the series tail would leak future data.
        self.prev_cross_above = None;
        Ok(())
    }

    fn on_bar(
        &mut self,
        _timestamp: NaiveDateTime,
        _current_bars: &BTreeMap<String, Bar>,
        _portfolio: &Portfolio,
    ) -> Result<(), StrategyError> {
        Ok(())
    }

    fn generate_orders(
        &mut self,
        timestamp: NaiveDateTime,
        current_bars: &BTreeMap<String, Bar>,
        portfolio: &Portfolio,
    ) -> Result<Vec<Order>, StrategyError> {
        let Some(bar) = current_bars.get(&self.symbol) else {
            return Ok(Vec::new());
        };
        let Some((fast, slow)) = self.values_at(timestamp) else {
            return Ok(Vec::new());
        };

        let cross_above = fast > slow;
        let Some(prev) = self.prev_cross_above.replace(cross_above) else {
            return Ok(Vec::new());
        };
        if cross_above == prev {
            return Ok(Vec::new());
        }

        let mut orders = Vec::new();
        let held = portfolio.position(&self.symbol);

        if cross_above {
            if let Some(position) = held.filter(|p| p.is_short()) {
                orders.push(order(&self.symbol, -position.quantity(), timestamp)?);
            }

            let price = bar.close;
            let quantity = self.sized_quantity(portfolio, price);
            if quantity > 0.0 {
                let mut entry = Order::market(&self.symbol, quantity, timestamp)
                    .map_err(anyhow::Error::from)?;
                if self.stop_loss_pct > 0.0 {
                    let stop = percentage_stop(price, self.stop_loss_pct, true)
                        .map_err(anyhow::Error::from)?;
                    entry = entry.with_stop_loss(stop).map_err(anyhow::Error::from)?;
                }
                if self.take_profit_pct > 0.0 {
                    let target = price * (1.0 + self.take_profit_pct / 100.0);
                    entry = entry.with_take_profit(target).map_err(anyhow::Error::from)?;
                }
                orders.push(entry);
            }
        } else if let Some(position) = held.filter(|p| p.is_long()) {
            orders.push(order(&self.symbol, -position.quantity(), timestamp)?);
        }

        Ok(orders)
    }

    fn parameters(&self) -> ParamSet {
        ParamSet::from([
            ("symbol".to_string(), ParamValue::Text(self.symbol.clone())),
            ("fast_period".to_string(), ParamValue::Int(self.fast_period as i64)),
            ("slow_period".to_string(), ParamValue::Int(self.slow_period as i64)),
            ("use_ema".to_string(), ParamValue::Bool(self.use_ema)),
            ("position_size".to_string(), ParamValue::Float(self.position_size)),
            ("stop_loss_pct".to_string(), ParamValue::Float(self.stop_loss_pct)),
            ("take_profit_pct".to_string(), ParamValue::Float(self.take_profit_pct)),
        ])
    }

    fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<(), StrategyError> {
        let invalid = || StrategyError::InvalidParameter { name: name.to_string(), value: value.clone() };
        match name {
            "fast_period" => {
                self.fast_period =
                    value.as_int().filter(|v| *v > 0).ok_or_else(invalid)? as usize;
            }
            "slow_period" => {
                self.slow_period =
                    value.as_int().filter(|v| *v > 0).ok_or_else(invalid)? as usize;
            }
            "use_ema" => self.use_ema = value.as_bool().ok_or_else(invalid)?,
            "position_size" => self.position_size = value.as_float().ok_or_else(invalid)?,
            "stop_loss_pct" => self.stop_loss_pct = value.as_float().ok_or_else(invalid)?,
            "take_profit_pct" => self.take_profit_pct = value.as_float().ok_or_else(invalid)?,
            _ => return Err(StrategyError::UnknownParameter { name: name.to_string() }),
        }
        Ok(())
    }
}

fn order(symbol: &str, quantity: f64, timestamp: NaiveDateTime) -> Result<Order, StrategyError> {
    Order::market(symbol, quantity, timestamp).map_err(|e| StrategyError::Other(e.into()))
}
