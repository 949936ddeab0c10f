//! Parallel parameter-sweep evaluation.

use barsim_core::data::{DataError, MarketDataService};
use barsim_core::domain::Trade;
use barsim_core::engine::EngineError;
use barsim_core::risk::{RiskAnalyzer, RiskMetrics};
use barsim_core::strategy::{ParamSet, Strategy, StrategyError};
use barsim_core::BacktestEngine;
use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Builds a fresh strategy instance for one parameter set.
///
/// Implemented for free by any matching closure.
pub trait StrategyFactory: Sync {
    fn create(&self, symbol: &str, params: &ParamSet) -> Result<Box<dyn Strategy>, StrategyError>;
}

impl<F> StrategyFactory for F
where
    F: Fn(&str, &ParamSet) -> Result<Box<dyn Strategy>, StrategyError> + Sync,
{
    fn create(&self, symbol: &str, params: &ParamSet) -> Result<Box<dyn Strategy>, StrategyError> {
        self(symbol, params)
    }
}

/// Shared knobs for every backtest in a sweep.
#[derive(Debug, Clone, Copy)]
pub struct SweepSettings {
    pub initial_capital: f64,
    pub commission_rate: f64,
    pub slippage: f64,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            commission_rate: barsim_core::DEFAULT_COMMISSION_RATE,
            slippage: barsim_core::DEFAULT_SLIPPAGE,
        }
    }
}

/// Outcome of one parameter set's backtest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub parameters: ParamSet,
    pub metrics: RiskMetrics,
    pub trades: Vec<Trade>,
}

#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("market data error: {0}")]
    Data(#[from] DataError),

    #[error("backtest failed: {0}")]
    Engine(#[from] EngineError),

    #[error("strategy construction failed: {0}")]
    Strategy(#[from] StrategyError),

    #[error("worker pool construction failed: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("no parameter sets to evaluate")]
    EmptyParameterSets,

    #[error("no complete train+test window fits between {start} and {end}")]
    NoCompleteWindow { start: NaiveDateTime, end: NaiveDateTime },
}

/// Runs many independent backtests in parallel over a dedicated worker pool.
///
/// Each task owns its strategy, engine, portfolio, and trade ledger; the only
/// shared state is the read-only market-data cache, pre-warmed before
/// submission. The pool is released on `shutdown` or drop.
pub struct StrategyEvaluator {
    market_data: Arc<MarketDataService>,
    analyzer: RiskAnalyzer,
    pool: rayon::ThreadPool,
}

impl StrategyEvaluator {
    /// Evaluator with a pool of `max(1, cores - 1)` workers.
    pub fn new(market_data: Arc<MarketDataService>) -> Result<Self, EvaluatorError> {
        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self::with_workers(market_data, cores.saturating_sub(1).max(1))
    }

    pub fn with_workers(
        market_data: Arc<MarketDataService>,
        workers: usize,
    ) -> Result<Self, EvaluatorError> {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(workers.max(1)).build()?;
        Ok(Self { market_data, analyzer: RiskAnalyzer::default(), pool })
    }

    pub fn market_data(&self) -> &Arc<MarketDataService> {
        &self.market_data
    }

    /// Release the worker pool. Dropping the evaluator has the same effect;
    /// this form makes the release explicit at call sites.
    pub fn shutdown(self) {}

    /// Backtest every parameter set over `[start, end]` and rank the results
    /// by total return, best first.
    ///
    /// A failure in any task aborts the sweep and discards partial results.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate_parameters<F: StrategyFactory>(
        &self,
        factory: &F,
        param_sets: &[ParamSet],
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        settings: SweepSettings,
    ) -> Result<Vec<EvaluationResult>, EvaluatorError> {
        // Warm the cache once so tasks only ever read it.
        self.market_data.get(symbol, start, end)?;
        debug!(sets = param_sets.len(), symbol, "starting parameter sweep");

        let mut results: Vec<EvaluationResult> = self.pool.install(|| {
            param_sets
                .par_iter()
                .map(|params| self.run_single(factory, params, symbol, start, end, settings))
                .collect::<Result<Vec<_>, EvaluatorError>>()
        })?;

        results.sort_by(|a, b| {
            b.metrics
                .total_return
                .partial_cmp(&a.metrics.total_return)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(results)
    }

    /// One backtest for one parameter set; used by the sweep tasks and the
    /// walk-forward test legs.
    pub(crate) fn run_single<F: StrategyFactory>(
        &self,
        factory: &F,
        params: &ParamSet,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        settings: SweepSettings,
    ) -> Result<EvaluationResult, EvaluatorError> {
        let strategy = factory.create(symbol, params)?;

        let mut engine =
            BacktestEngine::new(Arc::clone(&self.market_data), settings.initial_capital);
        engine.set_commission_rate(settings.commission_rate);
        engine.set_slippage(settings.slippage);
        engine.add_strategy(strategy);

        let results = engine.run(start, end)?;
        let metrics = self.analyzer.metrics(&results.trades, settings.initial_capital);

        Ok(EvaluationResult { parameters: params.clone(), metrics, trades: results.trades })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_never_zero() {
        // with_workers clamps to at least one thread
        let svc = Arc::new(MarketDataService::new(Box::new(NoData)));
        let evaluator = StrategyEvaluator::with_workers(svc, 0).unwrap();
        evaluator.shutdown();
    }

    struct NoData;

    impl barsim_core::data::MarketDataLoader for NoData {
        fn load(
            &self,
            symbol: &str,
            _start: NaiveDateTime,
            _end: NaiveDateTime,
        ) -> Result<barsim_core::TimeSeries, DataError> {
            Err(DataError::SymbolNotFound { symbol: symbol.into(), dir: "/dev/null".into() })
        }
    }

    #[test]
    fn prefetch_failure_aborts_sweep() {
        let svc = Arc::new(MarketDataService::new(Box::new(NoData)));
        let evaluator = StrategyEvaluator::with_workers(svc, 1).unwrap();

        let factory = |_: &str, _: &ParamSet| -> Result<Box<dyn Strategy>, StrategyError> {
            unreachable!("factory must not run when prefetch fails")
        };
        let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let result = evaluator.evaluate_parameters(
            &factory,
            &[ParamSet::new()],
            "SPY",
            start,
            start,
            SweepSettings::default(),
        );
        assert!(matches!(result, Err(EvaluatorError::Data(_))));
    }
}
