//! Portfolio — cash, open positions, and the transaction journal.

use crate::domain::{Position, PositionUpdate};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One executed fill, as recorded in the journal. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub timestamp: NaiveDateTime,
    pub symbol: String,
    /// Signed fill quantity: positive buys, negative sells.
    pub quantity: f64,
    pub price: f64,
    pub commission: f64,
}

/// Cash and positions for one backtest run.
///
/// Owned by a single engine; never mutated concurrently. Positions are keyed
/// in a `BTreeMap` so iteration order is deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    cash: f64,
    initial_capital: f64,
    positions: BTreeMap<String, Position>,
    transactions: Vec<Transaction>,
    allow_short: bool,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            cash: initial_capital,
            initial_capital,
            positions: BTreeMap::new(),
            transactions: Vec::new(),
            allow_short: false,
        }
    }

    /// Restore the starting state: full cash, no positions, empty journal.
    pub fn reset(&mut self, initial_capital: f64) {
        self.cash = initial_capital;
        self.initial_capital = initial_capital;
        self.positions.clear();
        self.transactions.clear();
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    /// Internal hook: permit fills that open or extend short positions.
    /// Off by default; the engine-level contract is long-only.
    pub fn set_allow_short(&mut self, allow: bool) {
        self.allow_short = allow;
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Cash plus open positions at their last fill marks.
    pub fn total_value(&self) -> f64 {
        self.cash + self.positions.values().map(|p| p.value()).sum::<f64>()
    }

    /// Attach the originating order to a position that does not have one yet.
    pub fn set_position_origin(&mut self, symbol: &str, order: crate::domain::Order) {
        if let Some(pos) = self.positions.get_mut(symbol) {
            if pos.origin().is_none() {
                pos.set_origin(order);
            }
        }
    }

    /// Apply a fill to cash and positions.
    ///
    /// Buys debit `delta * price + commission` from cash and fail when cash is
    /// insufficient, unless the buy reduces or closes a short. Sells credit
    /// the proceeds net of commission; with short selling disabled a sell
    /// that would open or extend a negative position fails.
    ///
    /// On success a `Transaction` is appended and the position is updated,
    /// or removed once its quantity returns to zero. Returns `false` with no
    /// side effects on failure.
    pub fn update_position(
        &mut self,
        symbol: &str,
        timestamp: NaiveDateTime,
        delta: f64,
        price: f64,
        commission: f64,
    ) -> bool {
        if delta == 0.0 {
            return false;
        }

        let held = self.positions.get(symbol).map(|p| p.quantity()).unwrap_or(0.0);

        if delta > 0.0 {
            let reduces_short = held < 0.0;
            let cost = delta * price + commission;
            if !reduces_short && cost > self.cash {
                return false;
            }
            self.cash -= cost;
        } else {
            if !self.allow_short && (held <= 0.0 || held + delta < 0.0) {
                return false;
            }
            self.cash += delta.abs() * price - commission;
        }

        self.transactions.push(Transaction {
            timestamp,
            symbol: symbol.to_string(),
            quantity: delta,
            price,
            commission,
        });

        let outcome = self
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position::new(symbol, 0.0, price))
            .update(delta, price);
        debug_assert_ne!(outcome, PositionUpdate::NoOp);

        let closed = self.positions.get(symbol).map(|p| p.quantity() == 0.0).unwrap_or(false);
        if closed {
            self.positions.remove(symbol);
        } else if let Some(pos) = self.positions.get_mut(symbol) {
            pos.add_commission(commission);
        }

        true
    }
}
