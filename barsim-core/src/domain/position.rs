//! Position — signed holding in a single symbol.

use crate::domain::Order;
use serde::{Deserialize, Serialize};

/// Outcome of a position update, keyed on
/// `(sign(qty), sign(delta), |delta| vs |qty|)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionUpdate {
    /// Zero delta; nothing changed.
    NoOp,
    /// Fill opened a position from flat.
    Opened,
    /// Same-side fill; average price re-weighted.
    ScaledIn,
    /// Opposite-side fill smaller than the holding; average price kept.
    Reduced,
    /// Opposite-side fill at least the holding; average price reset to the
    /// fill price. Quantity is zero (closed) or flipped sign (reversed).
    ClosedOrReversed,
}

/// An open holding. Positive quantity is long, negative is short.
///
/// A position with zero quantity is logically absent; the portfolio removes
/// it from its map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    symbol: String,
    quantity: f64,
    avg_price: f64,
    current_price: f64,
    /// Commissions paid on the fills that built this position (everything but
    /// the closing fill). Folded into the closing trade's commission total.
    commission_paid: f64,
    origin: Option<Order>,
}

impl Position {
    pub fn new(symbol: impl Into<String>, quantity: f64, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            avg_price: price,
            current_price: price,
            commission_paid: 0.0,
            origin: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn avg_price(&self) -> f64 {
        self.avg_price
    }

    pub fn current_price(&self) -> f64 {
        self.current_price
    }

    pub fn is_long(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0.0
    }

    /// Market value at the last mark (`quantity * current_price`).
    pub fn value(&self) -> f64 {
        self.quantity * self.current_price
    }

    pub fn unrealized_pnl(&self) -> f64 {
        (self.current_price - self.avg_price) * self.quantity
    }

    pub fn unrealized_pnl_pct(&self) -> f64 {
        if self.avg_price == 0.0 {
            return 0.0;
        }
        let sign = if self.quantity > 0.0 { 1.0 } else { -1.0 };
        (self.current_price - self.avg_price) / self.avg_price * 100.0 * sign
    }

    pub fn commission_paid(&self) -> f64 {
        self.commission_paid
    }

    pub fn add_commission(&mut self, commission: f64) {
        self.commission_paid += commission;
    }

    /// The order that opened this position, if captured.
    pub fn origin(&self) -> Option<&Order> {
        self.origin.as_ref()
    }

    pub fn set_origin(&mut self, order: Order) {
        self.origin = Some(order);
    }

    /// Apply a fill of `delta` units at `price`.
    ///
    /// - scale-in re-weights the average price by absolute quantities;
    /// - reduce keeps the average price;
    /// - close-or-reverse resets the average price to the fill price.
    ///
    /// Every non-trivial update marks `current_price` to the fill price.
    pub fn update(&mut self, delta: f64, price: f64) -> PositionUpdate {
        if delta == 0.0 {
            return PositionUpdate::NoOp;
        }

        let outcome = if self.quantity == 0.0 {
            self.avg_price = price;
            self.quantity = delta;
            PositionUpdate::Opened
        } else if self.quantity.signum() == delta.signum() {
            let total_cost = (self.quantity * self.avg_price).abs() + (delta * price).abs();
            let total_qty = self.quantity.abs() + delta.abs();
            self.avg_price = total_cost / total_qty;
            self.quantity += delta;
            PositionUpdate::ScaledIn
        } else if delta.abs() < self.quantity.abs() {
            self.quantity += delta;
            PositionUpdate::Reduced
        } else {
            self.avg_price = price;
            self.quantity += delta;
            PositionUpdate::ClosedOrReversed
        };

        self.current_price = price;
        outcome
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn update_conserves_sign_rules(
            qty in prop_oneof![-100.0..-1.0f64, 1.0..100.0f64],
            delta in prop_oneof![-100.0..-1.0f64, 1.0..100.0f64],
            entry in 1.0..500.0f64,
            fill in 1.0..500.0f64,
        ) {
            let mut pos = Position::new("X", qty, entry);
            let outcome = pos.update(delta, fill);

            match outcome {
                PositionUpdate::ScaledIn => {
                    prop_assert_eq!(qty.signum(), delta.signum());
                    // weighted average lies between the two prices
                    let (lo, hi) = if entry <= fill { (entry, fill) } else { (fill, entry) };
                    prop_assert!(pos.avg_price() >= lo - 1e-9 && pos.avg_price() <= hi + 1e-9);
                }
                PositionUpdate::Reduced => {
                    prop_assert_ne!(qty.signum(), delta.signum());
                    prop_assert_eq!(pos.avg_price(), entry);
                    prop_assert_eq!(pos.quantity().signum(), qty.signum());
                }
                PositionUpdate::ClosedOrReversed => {
                    prop_assert_ne!(qty.signum(), delta.signum());
                    prop_assert_eq!(pos.avg_price(), fill);
                    prop_assert!(pos.quantity() == 0.0 || pos.quantity().signum() == delta.signum());
                }
                PositionUpdate::Opened | PositionUpdate::NoOp => {
                    prop_assert!(false, "unreachable for nonzero qty and delta");
                }
            }
            prop_assert_eq!(pos.current_price(), fill);
            prop_assert!((pos.quantity() - (qty + delta)).abs() < 1e-9);
        }
    }
}
