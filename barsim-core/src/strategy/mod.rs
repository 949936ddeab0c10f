//! Strategy contract and bundled strategies.
//!
//! Strategies are deterministic functions of their declared inputs and
//! internal state. They never mutate the portfolio directly; every effect
//! flows through the orders they return.

pub mod ma_crossover;
pub mod rsi_reversal;

pub use ma_crossover::MaCrossover;
pub use rsi_reversal::RsiReversal;

use crate::domain::{Bar, Order, Portfolio, TimeSeries};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Typed parameter value crossing the optimizer boundary.
///
/// Strategies keep typed fields internally; this enum is the narrow
/// runtime-reflected form used by `parameters`/`set_parameter` and the
/// evaluator's parameter sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl ParamValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; integers widen to float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Text(v) => write!(f, "{v}"),
        }
    }
}

/// Named parameter set, ordered for deterministic iteration.
pub type ParamSet = BTreeMap<String, ParamValue>;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("no market data for required symbol {symbol}")]
    MissingData { symbol: String },

    #[error("unknown parameter {name}")]
    UnknownParameter { name: String },

    #[error("invalid value for parameter {name}: {value}")]
    InvalidParameter { name: String, value: ParamValue },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A trading strategy driven by the backtest event loop.
pub trait Strategy: Send {
    fn name(&self) -> String;

    /// Symbols this strategy needs market data for.
    fn required_symbols(&self) -> BTreeSet<String>;

    /// Called once before the event loop with the fetched series.
    fn initialize(&mut self, data: &BTreeMap<String, TimeSeries>) -> Result<(), StrategyError>;

    /// Called at every timeline tick before order generation.
    fn on_bar(
        &mut self,
        timestamp: NaiveDateTime,
        current_bars: &BTreeMap<String, Bar>,
        portfolio: &Portfolio,
    ) -> Result<(), StrategyError>;

    /// Orders to route to the execution simulator at this tick.
    fn generate_orders(
        &mut self,
        timestamp: NaiveDateTime,
        current_bars: &BTreeMap<String, Bar>,
        portfolio: &Portfolio,
    ) -> Result<Vec<Order>, StrategyError>;

    /// Current parameters in the runtime-reflected form.
    fn parameters(&self) -> ParamSet;

    /// Override one parameter; unknown names and type mismatches fail.
    fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<(), StrategyError>;
}
