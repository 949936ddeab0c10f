//! Trade — a closed round trip, the unit of P&L attribution.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Immutable record created the moment a position closes.
///
/// `commission_total` covers every leg of the round trip (entry fills plus
/// the closing fill) and is already subtracted from `profit`, so summing
/// trade profits over a run reproduces the equity curve exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub entry_quantity: f64,
    pub exit_time: NaiveDateTime,
    pub exit_price: f64,
    pub exit_quantity: f64,
    pub commission_total: f64,
    pub profit: f64,
    pub profit_pct: f64,
    pub is_long: bool,
    /// Portfolio value right after the closing fill settled.
    pub capital_after_trade: f64,
    pub stop_loss_hit: bool,
    pub take_profit_hit: bool,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.profit > 0.0
    }
}
