//! Risk statistics and stop-level calculators.

pub mod analyzer;
pub mod stops;

pub use analyzer::{RiskAnalyzer, RiskMetrics};
pub use stops::StopError;
