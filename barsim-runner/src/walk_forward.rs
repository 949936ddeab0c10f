//! Walk-forward optimization: rolling train/test windows over the sweep.

use crate::evaluator::{EvaluatorError, StrategyEvaluator, StrategyFactory, SweepSettings};
use barsim_core::domain::Trade;
use barsim_core::risk::{RiskAnalyzer, RiskMetrics};
use barsim_core::strategy::{ParamSet, ParamValue};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// One train/test split. The test span starts where the training span ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainTestWindow {
    pub train_start: NaiveDateTime,
    pub train_end: NaiveDateTime,
    pub test_start: NaiveDateTime,
    pub test_end: NaiveDateTime,
}

/// Split `[start, end]` into consecutive, non-overlapping windows of
/// `train_days + test_days`; a trailing partial window is discarded.
pub fn make_windows(
    start: NaiveDateTime,
    end: NaiveDateTime,
    train_days: i64,
    test_days: i64,
) -> Vec<TrainTestWindow> {
    let mut windows = Vec::new();
    if train_days <= 0 || test_days <= 0 {
        return windows;
    }

    let mut cursor = start;
    while cursor + Duration::days(train_days + test_days) <= end {
        let train_end = cursor + Duration::days(train_days);
        let test_end = train_end + Duration::days(test_days);
        windows.push(TrainTestWindow {
            train_start: cursor,
            train_end,
            test_start: train_end,
            test_end,
        });
        cursor = test_end;
    }
    windows
}

/// Per-parameter counts of the values that won each training sweep, in
/// first-seen order per parameter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterUsage {
    counts: BTreeMap<String, Vec<(ParamValue, usize)>>,
}

impl ParameterUsage {
    /// Count every (name, value) pair of a winning parameter set.
    pub fn record(&mut self, params: &ParamSet) {
        for (name, value) in params {
            let values = self.counts.entry(name.clone()).or_default();
            match values.iter_mut().find(|(v, _)| v == value) {
                Some((_, count)) => *count += 1,
                None => values.push((value.clone(), 1)),
            }
        }
    }

    /// Times `value` won for `name`.
    pub fn count(&self, name: &str, value: &ParamValue) -> usize {
        self.counts
            .get(name)
            .and_then(|values| values.iter().find(|(v, _)| v == value))
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    /// The most frequent winning value per parameter; ties go to the value
    /// seen first.
    pub fn most_frequent(&self) -> ParamSet {
        self.counts
            .iter()
            .filter_map(|(name, values)| {
                let mut best: Option<&(ParamValue, usize)> = None;
                for entry in values {
                    if best.map(|(_, count)| entry.1 > *count).unwrap_or(true) {
                        best = Some(entry);
                    }
                }
                best.map(|(value, _)| (name.clone(), value.clone()))
            })
            .collect()
    }
}

/// Test-leg outcome for one window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowResult {
    pub window: TrainTestWindow,
    pub best_parameters: ParamSet,
    pub test_metrics: RiskMetrics,
    pub test_trades: Vec<Trade>,
}

/// Aggregate walk-forward outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardReport {
    pub windows: Vec<WindowResult>,
    /// Risk statistics over the concatenated test-leg trades.
    pub overall_metrics: RiskMetrics,
    pub parameter_usage: ParameterUsage,
}

impl WalkForwardReport {
    pub fn most_frequent_parameters(&self) -> ParamSet {
        self.parameter_usage.most_frequent()
    }
}

impl StrategyEvaluator {
    /// Walk-forward optimization over `[start, end]`.
    ///
    /// Each window sweeps the parameter sets on its training span, takes the
    /// top-ranked set, and re-runs a single backtest on the test span. Only
    /// test-leg trades and metrics are retained.
    #[allow(clippy::too_many_arguments)]
    pub fn walk_forward<F: StrategyFactory>(
        &self,
        factory: &F,
        param_sets: &[ParamSet],
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        train_days: i64,
        test_days: i64,
        settings: SweepSettings,
    ) -> Result<WalkForwardReport, EvaluatorError> {
        let windows = make_windows(start, end, train_days, test_days);
        if windows.is_empty() {
            return Err(EvaluatorError::NoCompleteWindow { start, end });
        }

        let mut window_results = Vec::with_capacity(windows.len());
        let mut all_test_trades: Vec<Trade> = Vec::new();
        let mut usage = ParameterUsage::default();

        for window in windows {
            let ranked = self.evaluate_parameters(
                factory,
                param_sets,
                symbol,
                window.train_start,
                window.train_end,
                settings,
            )?;
            let best = ranked.into_iter().next().ok_or(EvaluatorError::EmptyParameterSets)?;
            usage.record(&best.parameters);

            let test = self.run_single(
                factory,
                &best.parameters,
                symbol,
                window.test_start,
                window.test_end,
                settings,
            )?;
            info!(
                train_start = %window.train_start,
                test_start = %window.test_start,
                test_trades = test.trades.len(),
                "walk-forward window complete"
            );

            all_test_trades.extend(test.trades.iter().cloned());
            window_results.push(WindowResult {
                window,
                best_parameters: best.parameters,
                test_metrics: test.metrics,
                test_trades: test.trades,
            });
        }

        let overall_metrics =
            RiskAnalyzer::default().metrics(&all_test_trades, settings.initial_capital);

        Ok(WalkForwardReport { windows: window_results, overall_metrics, parameter_usage: usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, month, day).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    // ── Window construction ──

    #[test]
    fn windows_tile_the_range() {
        let windows = make_windows(ts(1, 1), ts(4, 1), 20, 10);
        // Jan 1 .. Apr 1 is 91 days; three 30-day windows fit
        assert_eq!(windows.len(), 3);
        for w in &windows {
            assert_eq!(w.train_end, w.train_start + Duration::days(20));
            assert_eq!(w.test_start, w.train_end);
            assert_eq!(w.test_end, w.test_start + Duration::days(10));
        }
        // consecutive and non-overlapping
        assert_eq!(windows[1].train_start, windows[0].test_end);
        assert_eq!(windows[2].train_start, windows[1].test_end);
    }

    #[test]
    fn trailing_partial_window_discarded() {
        // 45 days: one 30-day window, 15 left over
        let windows = make_windows(ts(1, 1), ts(2, 15), 20, 10);
        assert_eq!(windows.len(), 1);
    }

    #[test]
    fn exact_fit_keeps_last_window() {
        let windows = make_windows(ts(1, 1), ts(1, 31), 20, 10);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].test_end, ts(1, 31));
    }

    #[test]
    fn degenerate_spans_yield_no_windows() {
        assert!(make_windows(ts(1, 1), ts(1, 5), 20, 10).is_empty());
        assert!(make_windows(ts(1, 1), ts(4, 1), 0, 10).is_empty());
        assert!(make_windows(ts(1, 1), ts(4, 1), 20, -1).is_empty());
    }

    // ── Parameter usage ──

    fn params(fast: i64) -> ParamSet {
        ParamSet::from([("fast_period".to_string(), ParamValue::Int(fast))])
    }

    #[test]
    fn usage_counts_values() {
        let mut usage = ParameterUsage::default();
        usage.record(&params(10));
        usage.record(&params(10));
        usage.record(&params(20));
        assert_eq!(usage.count("fast_period", &ParamValue::Int(10)), 2);
        assert_eq!(usage.count("fast_period", &ParamValue::Int(20)), 1);
        assert_eq!(usage.count("fast_period", &ParamValue::Int(30)), 0);
    }

    #[test]
    fn most_frequent_prefers_majority() {
        let mut usage = ParameterUsage::default();
        usage.record(&params(10));
        usage.record(&params(20));
        usage.record(&params(20));
        assert_eq!(usage.most_frequent()["fast_period"], ParamValue::Int(20));
    }

    #[test]
    fn most_frequent_tie_goes_to_first_seen() {
        let mut usage = ParameterUsage::default();
        usage.record(&params(20));
        usage.record(&params(10));
        usage.record(&params(10));
        usage.record(&params(20));
        assert_eq!(usage.most_frequent()["fast_period"], ParamValue::Int(20));
    }
}
