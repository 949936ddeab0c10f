//! barsim runner
//!
//! Batch layer on top of `barsim-core`: parallel parameter sweeps and
//! walk-forward optimization. One backtest stays single-threaded and
//! deterministic; this crate fans independent backtests out over a worker
//! pool that shares nothing but the read-only market-data cache.

pub mod evaluator;
pub mod walk_forward;

pub use evaluator::{
    EvaluationResult, EvaluatorError, StrategyEvaluator, StrategyFactory, SweepSettings,
};
pub use walk_forward::{
    ParameterUsage, TrainTestWindow, WalkForwardReport, WindowResult,
};
