//! Backtest engine: the bar-driven event loop and result aggregation.

use crate::data::{DataError, MarketDataService};
use crate::domain::{Bar, Order, OrderError, Portfolio, TimeSeries, Trade};
use crate::engine::ExecutionSimulator;
use crate::risk::{RiskAnalyzer, RiskMetrics};
use crate::strategy::{Strategy, StrategyError};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("market data error: {0}")]
    Data(#[from] DataError),

    #[error("no bars for {symbol} in the backtest range")]
    EmptySeries { symbol: String },

    #[error("strategy '{name}' failed at {timestamp}: {source}")]
    Strategy {
        name: String,
        timestamp: NaiveDateTime,
        #[source]
        source: StrategyError,
    },

    #[error("order error: {0}")]
    Order(#[from] OrderError),
}

/// Aggregate outcome of one backtest run.
///
/// Ratio fields follow the engine's percentage convention (`return_pct` of
/// 10.0 means +10%). An optional risk-metrics attachment carries the
/// annualized statistics, which use fractions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResults {
    pub initial_capital: f64,
    pub final_capital: f64,
    pub profit: f64,
    pub return_pct: f64,
    pub trades: Vec<Trade>,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub average_profit: f64,
    pub average_loss: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_metrics: Option<RiskMetrics>,
}

impl BacktestResults {
    /// Compute and attach the risk-statistics pass.
    pub fn attach_risk_metrics(&mut self, analyzer: &RiskAnalyzer) {
        self.risk_metrics = Some(analyzer.metrics(&self.trades, self.initial_capital));
    }

    /// Lossless string-keyed view for interchange.
    ///
    /// When a risk attachment is present its headline ratios are also
    /// flattened to top-level keys.
    pub fn to_map(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let mut map = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("results".to_string(), other);
                map
            }
        };
        if let Some(risk) = &self.risk_metrics {
            map.insert("sharpe_ratio".to_string(), risk.sharpe_ratio.into());
            map.insert("sortino_ratio".to_string(), risk.sortino_ratio.into());
            map.insert("calmar_ratio".to_string(), risk.calmar_ratio.into());
            map.insert("expectancy".to_string(), risk.expectancy.into());
        }
        Ok(map)
    }
}

/// Replays bars in timestamp order against the registered strategies.
///
/// A run is single-threaded and fully deterministic: the timeline is the
/// sorted union of bar timestamps, strategies fire in insertion order, and
/// their orders execute in the order generated.
pub struct BacktestEngine {
    market_data: Arc<MarketDataService>,
    executor: ExecutionSimulator,
    portfolio: Portfolio,
    strategies: Vec<Box<dyn Strategy>>,
    trades: Vec<Trade>,
    initial_capital: f64,
    commission_rate: f64,
    slippage: f64,
}

impl BacktestEngine {
    pub fn new(market_data: Arc<MarketDataService>, initial_capital: f64) -> Self {
        Self {
            market_data,
            executor: ExecutionSimulator::default(),
            portfolio: Portfolio::new(initial_capital),
            strategies: Vec::new(),
            trades: Vec::new(),
            initial_capital,
            commission_rate: crate::DEFAULT_COMMISSION_RATE,
            slippage: crate::DEFAULT_SLIPPAGE,
        }
    }

    pub fn add_strategy(&mut self, strategy: Box<dyn Strategy>) {
        self.strategies.push(strategy);
    }

    pub fn remove_strategy(&mut self, name: &str) {
        self.strategies.retain(|s| s.name() != name);
    }

    pub fn set_commission_rate(&mut self, rate: f64) {
        self.commission_rate = rate;
    }

    pub fn set_slippage(&mut self, slippage: f64) {
        self.slippage = slippage;
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Run the simulation over `[start, end]` and aggregate results.
    pub fn run(
        &mut self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<BacktestResults, EngineError> {
        self.portfolio.reset(self.initial_capital);
        self.trades.clear();
        self.executor = ExecutionSimulator::new(self.commission_rate, self.slippage);

        let data = self.fetch_required_data(start, end)?;

        for strategy in &mut self.strategies {
            let name = strategy.name();
            strategy.initialize(&data).map_err(|source| EngineError::Strategy {
                name,
                timestamp: start,
                source,
            })?;
        }

        // Global timeline: sorted union of bar timestamps, one tick per
        // timestamp regardless of how many symbols trade on it.
        let timeline: BTreeSet<NaiveDateTime> = data
            .values()
            .flat_map(|series| series.iter().map(|bar| bar.timestamp))
            .filter(|t| *t >= start && *t <= end)
            .collect();
        debug!(ticks = timeline.len(), symbols = data.len(), "starting event loop");

        for &timestamp in &timeline {
            let current_bars: BTreeMap<String, Bar> = data
                .iter()
                .filter_map(|(symbol, series)| {
                    series.get_at(timestamp).map(|bar| (symbol.clone(), bar.clone()))
                })
                .collect();

            self.monitor_exits(timestamp, &current_bars)?;

            for idx in 0..self.strategies.len() {
                let orders = {
                    let strategy = &mut self.strategies[idx];
                    let name = strategy.name();
                    strategy
                        .on_bar(timestamp, &current_bars, &self.portfolio)
                        .map_err(|source| EngineError::Strategy {
                            name: name.clone(),
                            timestamp,
                            source,
                        })?;
                    strategy
                        .generate_orders(timestamp, &current_bars, &self.portfolio)
                        .map_err(|source| EngineError::Strategy { name, timestamp, source })?
                };

                for mut order in orders {
                    // A data gap for the order's symbol skips it this bar.
                    let Some(bar) = current_bars.get(&order.symbol) else {
                        continue;
                    };
                    if let Some(trade) =
                        self.executor.execute(&mut order, bar, &mut self.portfolio)?
                    {
                        self.trades.push(trade);
                    }
                }
            }
        }

        Ok(self.aggregate_results())
    }

    fn fetch_required_data(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<BTreeMap<String, TimeSeries>, EngineError> {
        let symbols: BTreeSet<String> =
            self.strategies.iter().flat_map(|s| s.required_symbols()).collect();

        let mut data = BTreeMap::new();
        for symbol in symbols {
            let series = self.market_data.get(&symbol, start, end)?;
            if series.is_empty() {
                return Err(EngineError::EmptySeries { symbol });
            }
            data.insert(symbol, series);
        }
        Ok(data)
    }

    /// Stop-loss / take-profit monitor.
    ///
    /// Checks every open position whose originating order carries an exit
    /// level, using worst-path intra-bar triggering; on a same-bar tie the
    /// stop-loss wins. The exit is synthesized as a stop (or limit) order at
    /// the exit level so it fills at that level adjusted for slippage, and
    /// pays commission like any other order.
    fn monitor_exits(
        &mut self,
        timestamp: NaiveDateTime,
        current_bars: &BTreeMap<String, Bar>,
    ) -> Result<(), EngineError> {
        enum ExitKind {
            StopLoss(f64),
            TakeProfit(f64),
        }

        let mut exits = Vec::new();
        for position in self.portfolio.positions() {
            let Some(bar) = current_bars.get(position.symbol()) else {
                continue;
            };
            let Some(origin) = position.origin() else {
                continue;
            };

            let long = position.is_long();
            let stop_hit = origin.stop_loss().is_some_and(|sl| {
                if long {
                    bar.low <= sl
                } else {
                    bar.high >= sl
                }
            });
            let target_hit = origin.take_profit().is_some_and(|tp| {
                if long {
                    bar.high >= tp
                } else {
                    bar.low <= tp
                }
            });

            let kind = if stop_hit {
                ExitKind::StopLoss(origin.stop_loss().unwrap_or_default())
            } else if target_hit {
                ExitKind::TakeProfit(origin.take_profit().unwrap_or_default())
            } else {
                continue;
            };
            exits.push((position.symbol().to_string(), -position.quantity(), kind));
        }

        for (symbol, exit_qty, kind) in exits {
            let Some(bar) = current_bars.get(&symbol) else { continue };
            let (mut order, is_stop) = match kind {
                ExitKind::StopLoss(price) => {
                    (Order::stop(&symbol, price, exit_qty, timestamp)?, true)
                }
                ExitKind::TakeProfit(price) => {
                    (Order::limit(&symbol, price, exit_qty, timestamp)?, false)
                }
            };
            if let Some(mut trade) = self.executor.execute(&mut order, bar, &mut self.portfolio)? {
                trade.stop_loss_hit = is_stop;
                trade.take_profit_hit = !is_stop;
                self.trades.push(trade);
            }
        }

        Ok(())
    }

    fn aggregate_results(&self) -> BacktestResults {
        let final_capital = self.portfolio.total_value();
        let profit = final_capital - self.initial_capital;
        let return_pct = profit / self.initial_capital * 100.0;

        let mut winning_trades = 0;
        let mut losing_trades = 0;
        let mut total_win = 0.0;
        let mut total_loss = 0.0;
        for trade in &self.trades {
            if trade.profit > 0.0 {
                winning_trades += 1;
                total_win += trade.profit;
            } else {
                losing_trades += 1;
                total_loss += trade.profit.abs();
            }
        }

        let total_trades = self.trades.len();
        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64 * 100.0
        } else {
            0.0
        };
        let average_profit =
            if winning_trades > 0 { total_win / winning_trades as f64 } else { 0.0 };
        let average_loss = if losing_trades > 0 { total_loss / losing_trades as f64 } else { 0.0 };
        let profit_factor = if total_loss > 0.0 { total_win / total_loss } else { 0.0 };

        BacktestResults {
            initial_capital: self.initial_capital,
            final_capital,
            profit,
            return_pct,
            trades: self.trades.clone(),
            total_trades,
            winning_trades,
            losing_trades,
            win_rate,
            average_profit,
            average_loss,
            profit_factor,
            max_drawdown: self.max_drawdown(),
            risk_metrics: None,
        }
    }

    /// Percentage drawdown over the capital-after-trade sequence, walked
    /// with a running high-water mark seeded at the initial capital.
    fn max_drawdown(&self) -> f64 {
        let mut high_water = self.initial_capital;
        let mut max_dd = 0.0_f64;
        for trade in &self.trades {
            let capital = trade.capital_after_trade;
            if capital > high_water {
                high_water = capital;
            }
            let dd = (high_water - capital) / high_water * 100.0;
            if dd > max_dd {
                max_dd = dd;
            }
        }
        max_dd
    }
}
