//! Order execution against a single bar.

use crate::domain::{Bar, Order, OrderError, OrderType, Portfolio, Trade};

/// Fills orders against bars, applying slippage and commission, and settles
/// the result into the portfolio.
///
/// Returns a `Trade` only when the fill closes a position.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionSimulator {
    commission_rate: f64,
    slippage: f64,
}

impl Default for ExecutionSimulator {
    fn default() -> Self {
        Self {
            commission_rate: crate::DEFAULT_COMMISSION_RATE,
            slippage: crate::DEFAULT_SLIPPAGE,
        }
    }
}

impl ExecutionSimulator {
    pub fn new(commission_rate: f64, slippage: f64) -> Self {
        Self { commission_rate, slippage }
    }

    pub fn commission_rate(&self) -> f64 {
        self.commission_rate
    }

    pub fn slippage(&self) -> f64 {
        self.slippage
    }

    /// Attempt to fill `order` against `bar`.
    ///
    /// `Ok(None)` covers the non-fatal misses: the trigger condition did not
    /// hold, or the portfolio rejected the fill (insufficient cash, or a
    /// sell that would go short). Attempting to execute an already-executed
    /// order is fatal.
    pub fn execute(
        &self,
        order: &mut Order,
        bar: &Bar,
        portfolio: &mut Portfolio,
    ) -> Result<Option<Trade>, OrderError> {
        if order.is_executed() {
            return Err(OrderError::AlreadyExecuted { id: order.id() });
        }

        let base_price = match self.base_fill_price(order, bar) {
            Some(price) => price,
            None => return Ok(None),
        };

        // Slippage is adverse: buys pay up, sells receive less.
        let exec_price = if order.is_buy() {
            base_price * (1.0 + self.slippage)
        } else {
            base_price * (1.0 - self.slippage)
        };
        let commission = (order.quantity * exec_price).abs() * self.commission_rate;

        // Entry-leg snapshot, taken before the fill settles. If this fill
        // closes the position, the trade's entry side comes from here.
        let entry = portfolio.position(&order.symbol).map(|p| {
            (
                p.avg_price(),
                p.quantity(),
                p.commission_paid(),
                p.origin().map(|o| o.execution_time().unwrap_or(o.creation_time)),
            )
        });

        if !portfolio.update_position(
            &order.symbol,
            bar.timestamp,
            order.quantity,
            exec_price,
            commission,
        ) {
            return Ok(None);
        }

        order.execute(bar.timestamp, exec_price)?;

        let closed = portfolio
            .position(&order.symbol)
            .map(|p| p.quantity() == 0.0)
            .unwrap_or(true);

        if closed {
            let (entry_price, entry_quantity, entry_commission, entry_time) = match entry {
                Some((price, qty, paid, time)) => {
                    (price, qty, paid, time.unwrap_or(order.creation_time))
                }
                // A rejected-open cannot reach here; guard for the degenerate
                // case of closing a position the journal never opened.
                None => (exec_price, -order.quantity, 0.0, order.creation_time),
            };

            let is_long = entry_quantity > 0.0;
            let commission_total = entry_commission + commission;
            let gross = if is_long {
                (exec_price - entry_price) * entry_quantity.abs()
            } else {
                (entry_price - exec_price) * entry_quantity.abs()
            };
            let profit = gross - commission_total;
            let profit_pct = profit / (entry_price * entry_quantity.abs()) * 100.0;

            return Ok(Some(Trade {
                symbol: order.symbol.clone(),
                entry_time,
                entry_price,
                entry_quantity,
                exit_time: bar.timestamp,
                exit_price: exec_price,
                exit_quantity: order.quantity,
                commission_total,
                profit,
                profit_pct,
                is_long,
                capital_after_trade: portfolio.total_value(),
                stop_loss_hit: false,
                take_profit_hit: false,
            }));
        }

        // Fill opened or extended a position: remember the order that opened
        // it so the stop-loss/take-profit monitor can read its exit levels.
        portfolio.set_position_origin(&order.symbol, order.clone());

        Ok(None)
    }

    /// Pre-slippage fill price, or `None` when the order does not trigger
    /// within this bar.
    fn base_fill_price(&self, order: &Order, bar: &Bar) -> Option<f64> {
        match order.order_type {
            OrderType::Market => Some(bar.open),
            OrderType::Limit { limit_price } => {
                let fills = if order.is_buy() {
                    bar.low <= limit_price
                } else {
                    bar.high >= limit_price
                };
                fills.then_some(limit_price)
            }
            OrderType::Stop { stop_price } => {
                let fills = if order.is_buy() {
                    bar.high >= stop_price
                } else {
                    bar.low <= stop_price
                };
                fills.then_some(stop_price)
            }
            OrderType::StopLimit { trigger_price } => {
                (bar.high >= trigger_price && bar.low <= trigger_price).then_some(trigger_price)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn bar(day: u32, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(ts(day), open, high, low, close, 1_000_000.0)
    }

    fn frictionless() -> ExecutionSimulator {
        ExecutionSimulator::new(0.0, 0.0)
    }

    #[test]
    fn market_buy_fills_at_open() {
        let sim = frictionless();
        let mut pf = Portfolio::new(10_000.0);
        let mut order = Order::market("SPY", 10.0, ts(2)).unwrap();

        let trade = sim.execute(&mut order, &bar(2, 100.0, 102.0, 98.0, 101.0), &mut pf).unwrap();
        assert!(trade.is_none());
        assert!(order.is_executed());
        assert_eq!(order.execution_price(), Some(100.0));
        assert_eq!(pf.position("SPY").unwrap().quantity(), 10.0);
    }

    #[test]
    fn buy_slippage_raises_fill_price() {
        let sim = ExecutionSimulator::new(0.0, 0.01);
        let mut pf = Portfolio::new(10_000.0);
        let mut order = Order::market("SPY", 10.0, ts(2)).unwrap();

        sim.execute(&mut order, &bar(2, 100.0, 102.0, 98.0, 101.0), &mut pf).unwrap();
        assert_eq!(order.execution_price(), Some(101.0));
    }

    #[test]
    fn limit_buy_requires_low_at_or_below_limit() {
        let sim = frictionless();
        let mut pf = Portfolio::new(10_000.0);

        let mut missed = Order::limit("SPY", 97.0, 10.0, ts(2)).unwrap();
        let result = sim.execute(&mut missed, &bar(2, 100.0, 102.0, 98.0, 101.0), &mut pf).unwrap();
        assert!(result.is_none());
        assert!(!missed.is_executed());

        let mut filled = Order::limit("SPY", 99.0, 10.0, ts(2)).unwrap();
        sim.execute(&mut filled, &bar(2, 100.0, 102.0, 98.0, 101.0), &mut pf).unwrap();
        assert_eq!(filled.execution_price(), Some(99.0));
    }

    #[test]
    fn stop_sell_requires_low_at_or_below_stop() {
        let sim = frictionless();
        let mut pf = Portfolio::new(10_000.0);
        let mut entry = Order::market("SPY", 10.0, ts(2)).unwrap();
        sim.execute(&mut entry, &bar(2, 100.0, 102.0, 98.0, 101.0), &mut pf).unwrap();

        let mut missed = Order::stop("SPY", 95.0, -10.0, ts(3)).unwrap();
        let result = sim.execute(&mut missed, &bar(3, 100.0, 103.0, 96.0, 102.0), &mut pf).unwrap();
        assert!(result.is_none());

        let mut filled = Order::stop("SPY", 97.0, -10.0, ts(3)).unwrap();
        let trade = sim.execute(&mut filled, &bar(3, 100.0, 103.0, 96.0, 102.0), &mut pf).unwrap();
        assert_eq!(trade.unwrap().exit_price, 97.0);
    }

    #[test]
    fn limit_buy_pays_limit_plus_slippage() {
        let sim = ExecutionSimulator::new(0.0, 0.01);
        let mut pf = Portfolio::new(10_000.0);
        let mut order = Order::limit("SPY", 99.0, 10.0, ts(2)).unwrap();
        sim.execute(&mut order, &bar(2, 100.0, 102.0, 98.0, 101.0), &mut pf).unwrap();
        assert!((order.execution_price().unwrap() - 99.0 * 1.01).abs() < 1e-9);
    }

    #[test]
    fn stop_sell_receives_stop_minus_slippage() {
        let sim = ExecutionSimulator::new(0.0, 0.01);
        let mut pf = Portfolio::new(10_000.0);
        let mut entry = Order::market("SPY", 10.0, ts(2)).unwrap();
        sim.execute(&mut entry, &bar(2, 100.0, 102.0, 98.0, 101.0), &mut pf).unwrap();

        let mut exit = Order::stop("SPY", 97.0, -10.0, ts(3)).unwrap();
        let trade = sim
            .execute(&mut exit, &bar(3, 100.0, 103.0, 96.0, 102.0), &mut pf)
            .unwrap()
            .unwrap();
        assert!((trade.exit_price - 97.0 * 0.99).abs() < 1e-9);
    }

    #[test]
    fn stop_limit_needs_bar_to_straddle_trigger() {
        let sim = frictionless();
        let mut pf = Portfolio::new(10_000.0);

        let mut above = Order::new(
            "SPY",
            OrderType::StopLimit { trigger_price: 103.0 },
            10.0,
            ts(2),
        )
        .unwrap();
        assert!(sim
            .execute(&mut above, &bar(2, 100.0, 102.0, 98.0, 101.0), &mut pf)
            .unwrap()
            .is_none());

        let mut inside = Order::new(
            "SPY",
            OrderType::StopLimit { trigger_price: 100.5 },
            10.0,
            ts(2),
        )
        .unwrap();
        sim.execute(&mut inside, &bar(2, 100.0, 102.0, 98.0, 101.0), &mut pf).unwrap();
        assert_eq!(inside.execution_price(), Some(100.5));
    }

    #[test]
    fn closing_fill_emits_trade_with_both_leg_commissions() {
        let sim = ExecutionSimulator::new(0.01, 0.0);
        let mut pf = Portfolio::new(10_000.0);

        let mut entry = Order::market("SPY", 10.0, ts(2)).unwrap();
        sim.execute(&mut entry, &bar(2, 100.0, 102.0, 98.0, 101.0), &mut pf).unwrap();

        let mut exit = Order::market("SPY", -10.0, ts(5)).unwrap();
        let trade = sim
            .execute(&mut exit, &bar(5, 110.0, 112.0, 108.0, 111.0), &mut pf)
            .unwrap()
            .unwrap();

        assert!(trade.is_long);
        assert_eq!(trade.entry_price, 100.0);
        assert_eq!(trade.exit_price, 110.0);
        // commissions: 10 on entry (1000 * 1%), 11 on exit (1100 * 1%)
        assert!((trade.commission_total - 21.0).abs() < 1e-9);
        assert!((trade.profit - 79.0).abs() < 1e-9);
        assert!(!pf.has_position("SPY"));
        assert!((trade.capital_after_trade - 10_079.0).abs() < 1e-9);
    }

    #[test]
    fn partial_exit_emits_no_trade_until_flat() {
        let sim = frictionless();
        let mut pf = Portfolio::new(10_000.0);

        let mut entry = Order::market("SPY", 10.0, ts(2)).unwrap();
        sim.execute(&mut entry, &bar(2, 100.0, 102.0, 98.0, 101.0), &mut pf).unwrap();

        let mut half = Order::market("SPY", -5.0, ts(3)).unwrap();
        assert!(sim
            .execute(&mut half, &bar(3, 105.0, 106.0, 104.0, 105.0), &mut pf)
            .unwrap()
            .is_none());

        let mut rest = Order::market("SPY", -5.0, ts(4)).unwrap();
        let trade = sim
            .execute(&mut rest, &bar(4, 108.0, 109.0, 107.0, 108.0), &mut pf)
            .unwrap()
            .unwrap();
        // entry leg is the remaining 5 units at the preserved average price
        assert_eq!(trade.entry_quantity, 5.0);
        assert_eq!(trade.entry_price, 100.0);
        assert!((trade.profit - 40.0).abs() < 1e-9);
    }

    #[test]
    fn rejected_fill_leaves_order_unexecuted() {
        let sim = frictionless();
        let mut pf = Portfolio::new(100.0);
        let mut order = Order::market("SPY", 10.0, ts(2)).unwrap();

        let result = sim.execute(&mut order, &bar(2, 100.0, 102.0, 98.0, 101.0), &mut pf).unwrap();
        assert!(result.is_none());
        assert!(!order.is_executed());
        assert!(pf.transactions().is_empty());
    }

    #[test]
    fn double_execution_is_fatal() {
        let sim = frictionless();
        let mut pf = Portfolio::new(10_000.0);
        let mut order = Order::market("SPY", 10.0, ts(2)).unwrap();
        sim.execute(&mut order, &bar(2, 100.0, 102.0, 98.0, 101.0), &mut pf).unwrap();

        let result = sim.execute(&mut order, &bar(3, 100.0, 102.0, 98.0, 101.0), &mut pf);
        assert!(matches!(result, Err(OrderError::AlreadyExecuted { .. })));
    }

    #[test]
    fn opening_fill_attaches_origin() {
        let sim = frictionless();
        let mut pf = Portfolio::new(10_000.0);
        let mut order = Order::market("SPY", 10.0, ts(2)).unwrap().with_stop_loss(95.0).unwrap();
        sim.execute(&mut order, &bar(2, 100.0, 102.0, 98.0, 101.0), &mut pf).unwrap();

        let origin = pf.position("SPY").unwrap().origin().unwrap();
        assert_eq!(origin.id(), order.id());
        assert_eq!(origin.stop_loss(), Some(95.0));
    }
}
