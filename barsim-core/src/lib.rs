//! barsim core engine
//!
//! Replays historical price bars against user-supplied strategies through a
//! simulated broker, producing a deterministic trade ledger and derived risk
//! statistics.

pub mod data;
pub mod domain;
pub mod engine;
pub mod indicators;
pub mod risk;
pub mod strategy;

pub use domain::{Bar, Order, OrderType, Portfolio, Position, TimeSeries, Trade, Transaction};
pub use engine::{BacktestEngine, BacktestResults, EngineError, ExecutionSimulator};
pub use risk::{RiskAnalyzer, RiskMetrics};
pub use strategy::{ParamValue, Strategy, StrategyError};

/// Default proportional commission rate (0.1% of filled notional).
pub const DEFAULT_COMMISSION_RATE: f64 = 0.001;

/// Default proportional slippage (0.1% adverse price adjustment).
pub const DEFAULT_SLIPPAGE: f64 = 0.001;

/// Trading periods per year used when annualizing statistics.
pub const PERIODS_PER_YEAR: f64 = 252.0;

/// Annual risk-free rate used by the risk analyzer.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;

/// Timestamp format accepted by the file-backed data loader.
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
