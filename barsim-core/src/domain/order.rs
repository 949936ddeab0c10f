//! Order — lifecycle is create once, execute once.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

static NEXT_ORDER_ID: AtomicU64 = AtomicU64::new(1);

/// Order type with its trigger price where one applies.
///
/// The stop-limit variant carries a single trigger that serves as both the
/// stop and the limit level: it fills only when the bar trades through the
/// trigger from both sides (`high >= trigger && low <= trigger`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit { limit_price: f64 },
    Stop { stop_price: f64 },
    StopLimit { trigger_price: f64 },
}

impl OrderType {
    fn trigger(&self) -> Option<f64> {
        match self {
            OrderType::Market => None,
            OrderType::Limit { limit_price } => Some(*limit_price),
            OrderType::Stop { stop_price } => Some(*stop_price),
            OrderType::StopLimit { trigger_price } => Some(*trigger_price),
        }
    }
}

/// A broker order. Signed quantity: positive buys, negative sells.
///
/// Mutates exactly twice: construction and `execute`. Execution fields are
/// frozen afterwards; a second `execute` is a programming error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    id: u64,
    pub symbol: String,
    pub order_type: OrderType,
    pub quantity: f64,
    pub creation_time: NaiveDateTime,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
    executed: bool,
    execution_time: Option<NaiveDateTime>,
    execution_price: Option<f64>,
}

impl Order {
    /// Create an order. IDs are unique within the process; issuance is
    /// thread-safe and monotonic.
    pub fn new(
        symbol: impl Into<String>,
        order_type: OrderType,
        quantity: f64,
        creation_time: NaiveDateTime,
    ) -> Result<Self, OrderError> {
        if quantity == 0.0 || !quantity.is_finite() {
            return Err(OrderError::ZeroQuantity);
        }
        if let Some(trigger) = order_type.trigger() {
            if trigger <= 0.0 {
                return Err(OrderError::NonPositivePrice { price: trigger });
            }
        }
        Ok(Self {
            id: NEXT_ORDER_ID.fetch_add(1, Ordering::Relaxed),
            symbol: symbol.into(),
            order_type,
            quantity,
            creation_time,
            stop_loss: None,
            take_profit: None,
            executed: false,
            execution_time: None,
            execution_price: None,
        })
    }

    pub fn market(
        symbol: impl Into<String>,
        quantity: f64,
        creation_time: NaiveDateTime,
    ) -> Result<Self, OrderError> {
        Self::new(symbol, OrderType::Market, quantity, creation_time)
    }

    pub fn limit(
        symbol: impl Into<String>,
        limit_price: f64,
        quantity: f64,
        creation_time: NaiveDateTime,
    ) -> Result<Self, OrderError> {
        Self::new(symbol, OrderType::Limit { limit_price }, quantity, creation_time)
    }

    pub fn stop(
        symbol: impl Into<String>,
        stop_price: f64,
        quantity: f64,
        creation_time: NaiveDateTime,
    ) -> Result<Self, OrderError> {
        Self::new(symbol, OrderType::Stop { stop_price }, quantity, creation_time)
    }

    /// Attach a stop-loss exit level.
    pub fn with_stop_loss(mut self, price: f64) -> Result<Self, OrderError> {
        if price <= 0.0 {
            return Err(OrderError::NonPositivePrice { price });
        }
        self.stop_loss = Some(price);
        Ok(self)
    }

    /// Attach a take-profit exit level.
    pub fn with_take_profit(mut self, price: f64) -> Result<Self, OrderError> {
        if price <= 0.0 {
            return Err(OrderError::NonPositivePrice { price });
        }
        self.take_profit = Some(price);
        Ok(self)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_buy(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn is_sell(&self) -> bool {
        self.quantity < 0.0
    }

    pub fn stop_loss(&self) -> Option<f64> {
        self.stop_loss
    }

    pub fn take_profit(&self) -> Option<f64> {
        self.take_profit
    }

    pub fn is_executed(&self) -> bool {
        self.executed
    }

    pub fn execution_time(&self) -> Option<NaiveDateTime> {
        self.execution_time
    }

    pub fn execution_price(&self) -> Option<f64> {
        self.execution_price
    }

    /// Record the fill. Fails if the order has already been executed.
    pub fn execute(&mut self, time: NaiveDateTime, price: f64) -> Result<(), OrderError> {
        if self.executed {
            return Err(OrderError::AlreadyExecuted { id: self.id });
        }
        self.executed = true;
        self.execution_time = Some(time);
        self.execution_price = Some(price);
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order quantity must be nonzero and finite")]
    ZeroQuantity,

    #[error("price must be positive, got {price}")]
    NonPositivePrice { price: f64 },

    #[error("order {id} already executed")]
    AlreadyExecuted { id: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    #[test]
    fn ids_are_unique_and_monotonic() {
        let a = Order::market("SPY", 10.0, ts()).unwrap();
        let b = Order::market("SPY", 10.0, ts()).unwrap();
        assert!(b.id() > a.id());
    }

    #[test]
    fn zero_quantity_rejected() {
        assert!(matches!(Order::market("SPY", 0.0, ts()), Err(OrderError::ZeroQuantity)));
    }

    #[test]
    fn negative_trigger_rejected() {
        let result = Order::limit("SPY", -5.0, 10.0, ts());
        assert!(matches!(result, Err(OrderError::NonPositivePrice { .. })));
    }

    #[test]
    fn sign_convention() {
        let buy = Order::market("SPY", 10.0, ts()).unwrap();
        let sell = Order::market("SPY", -10.0, ts()).unwrap();
        assert!(buy.is_buy() && !buy.is_sell());
        assert!(sell.is_sell() && !sell.is_buy());
    }

    #[test]
    fn execute_freezes_fields() {
        let mut order = Order::market("SPY", 10.0, ts()).unwrap();
        order.execute(ts(), 101.5).unwrap();
        assert!(order.is_executed());
        assert_eq!(order.execution_price(), Some(101.5));
        assert_eq!(order.execution_time(), Some(ts()));
    }

    #[test]
    fn execute_twice_is_an_error() {
        let mut order = Order::market("SPY", 10.0, ts()).unwrap();
        order.execute(ts(), 101.5).unwrap();
        assert!(matches!(order.execute(ts(), 102.0), Err(OrderError::AlreadyExecuted { .. })));
        assert_eq!(order.execution_price(), Some(101.5));
    }

    #[test]
    fn stop_loss_take_profit_attachments() {
        let order = Order::market("SPY", 10.0, ts())
            .unwrap()
            .with_stop_loss(95.0)
            .unwrap()
            .with_take_profit(110.0)
            .unwrap();
        assert_eq!(order.stop_loss(), Some(95.0));
        assert_eq!(order.take_profit(), Some(110.0));
        assert!(Order::market("SPY", 10.0, ts()).unwrap().with_stop_loss(0.0).is_err());
    }
}
