//! RSI mean-reversion strategy.
//!
//! Buys when the RSI climbs back above the oversold level after dipping
//! below it, and closes the long when the RSI falls back below the
//! overbought level after rising above it.

use crate::domain::{Bar, Order, Portfolio, TimeSeries};
use crate::indicators::{Indicator, Rsi};
use crate::risk::stops::percentage_stop;
use crate::strategy::{ParamSet, ParamValue, Strategy, StrategyError};
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet};

pub struct RsiReversal {
    symbol: String,
    period: usize,
    oversold_level: f64,
    overbought_level: f64,
    /// Fraction of portfolio value committed per entry.
    position_size: f64,
    stop_loss_pct: f64,
    take_profit_pct: f64,

    series: Option<TimeSeries>,
    rsi_values: Vec<f64>,
    was_oversold: bool,
    was_overbought: bool,
}

impl RsiReversal {
    pub fn new(
        symbol: impl Into<String>,
        period: usize,
        oversold_level: f64,
        overbought_level: f64,
        position_size: f64,
        stop_loss_pct: f64,
        take_profit_pct: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            period,
            oversold_level,
            overbought_level,
            position_size,
            stop_loss_pct,
            take_profit_pct,
            series: None,
            rsi_values: Vec::new(),
            was_oversold: false,
            was_overbought: false,
        }
    }

    fn rsi_at(&self, timestamp: NaiveDateTime) -> Option<f64> {
        let index = self.series.as_ref()?.index_of(timestamp)?;
        let value = *self.rsi_values.get(index)?;
        (!value.is_nan()).then_some(value)
    }
}

impl Strategy for RsiReversal {
    fn name(&self) -> String {
        format!(
            "RSI Reversal (RSI({}), {}, {})",
            self.period, self.oversold_level, self.overbought_level
        )
    }

    fn required_symbols(&self) -> BTreeSet<String> {
        BTreeSet::from([self.symbol.clone()])
    }

    fn initialize(&mut self, data: &BTreeMap<String, TimeSeries>) -> Result<(), StrategyError> {
        let series = data
            .get(&self.symbol)
            .ok_or_else(|| StrategyError::MissingData { symbol: self.symbol.clone() })?;
        self.rsi_values = Rsi::new(self.period).calculate(series);
        self.series = Some(series.clone());
        self.was_oversold = false;
        self.was_overbought = false;
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
        let Some(rsi) = self.rsi_at(timestamp) else {
            return Ok(Vec::new());
        };

        let mut orders = Vec::new();

        if self.was_oversold && rsi > self.oversold_level {
            // recovery from oversold: enter long if flat
            if !portfolio.has_position(&self.symbol) {
                let price = bar.close;
                let quantity = (portfolio.total_value() * self.position_size / price).floor();
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
            }
        } else if self.was_overbought && rsi < self.overbought_level {
            // retreat from overbought: close any long
            if let Some(position) = portfolio.position(&self.symbol).filter(|p| p.is_long()) {
                let exit = Order::market(&self.symbol, -position.quantity(), timestamp)
                    .map_err(anyhow::Error::from)?;
                orders.push(exit);
            }
        }

        self.was_oversold = rsi <= self.oversold_level;
        self.was_overbought = rsi >= self.overbought_level;

        Ok(orders)
    }

    fn parameters(&self) -> ParamSet {
        ParamSet::from([
            ("symbol".to_string(), ParamValue::Text(self.symbol.clone())),
            ("period".to_string(), ParamValue::Int(self.period as i64)),
            ("oversold_level".to_string(), ParamValue::Float(self.oversold_level)),
            ("overbought_level".to_string(), ParamValue::Float(self.overbought_level)),
            ("position_size".to_string(), ParamValue::Float(self.position_size)),
            ("stop_loss_pct".to_string(), ParamValue::Float(self.stop_loss_pct)),
            ("take_profit_pct".to_string(), ParamValue::Float(self.take_profit_pct)),
        ])
    }

    fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<(), StrategyError> {
        let invalid = || StrategyError::InvalidParameter { name: name.to_string(), value: value.clone() };
        match name {
            "period" => {
                self.period = value.as_int().filter(|v| *v > 0).ok_or_else(invalid)? as usize;
            }
            "oversold_level" => self.oversold_level = value.as_float().ok_or_else(invalid)?,
            "overbought_level" => self.overbought_level = value.as_float().ok_or_else(invalid)?,
            "position_size" => self.position_size = value.as_float().ok_or_else(invalid)?,
            "stop_loss_pct" => self.stop_loss_pct = value.as_float().ok_or_else(invalid)?,
            "take_profit_pct" => self.take_profit_pct = value.as_float().ok_or_else(invalid)?,
            _ => return Err(StrategyError::UnknownParameter { name: name.to_string() }),
        }
        Ok(())
    }
}
