//! Loader contract and the file-backed CSV implementation.
//!
//! CSV convention: one file per symbol at `{data_dir}/{symbol}.csv`, a header
//! row, required columns `datetime` (or `date`/`time`), `open`, `high`,
//! `low`, `close`, optional `volume` defaulting to 0. Header matching is
//! case-insensitive, extra columns are ignored, malformed rows are skipped
//! with a diagnostic.

use crate::domain::{Bar, TimeSeries};
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Source of historical bars for a symbol over an inclusive time range.
pub trait MarketDataLoader: Send + Sync {
    fn load(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<TimeSeries, DataError>;
}

#[derive(Debug, Error)]
pub enum DataError {
    #[error("no data file for symbol {symbol} under {dir}")]
    SymbolNotFound { symbol: String, dir: PathBuf },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("required column '{column}' missing in {path}")]
    MissingColumn { column: &'static str, path: PathBuf },
}

/// Loads bars from per-symbol CSV files in a data directory.
pub struct CsvLoader {
    data_dir: PathBuf,
    datetime_format: String,
}

impl CsvLoader {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            datetime_format: crate::DEFAULT_DATETIME_FORMAT.to_string(),
        }
    }

    pub fn with_datetime_format(mut self, format: impl Into<String>) -> Self {
        self.datetime_format = format.into();
        self
    }

    fn symbol_path(&self, symbol: &str) -> PathBuf {
        self.data_dir.join(format!("{symbol}.csv"))
    }
}

impl MarketDataLoader for CsvLoader {
    fn load(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<TimeSeries, DataError> {
        let path = self.symbol_path(symbol);
        if !path.exists() {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
                dir: self.data_dir.clone(),
            });
        }

        let series = read_csv_series(&path, symbol, &self.datetime_format)?;
        Ok(series.sub(start, end))
    }
}

fn read_csv_series(
    path: &Path,
    symbol: &str,
    datetime_format: &str,
) -> Result<TimeSeries, DataError> {
    let read_err = |source| DataError::Read { path: path.to_path_buf(), source };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(read_err)?;

    let headers = reader.headers().map_err(read_err)?.clone();
    let column = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
    };

    let missing = |column| DataError::MissingColumn { column, path: path.to_path_buf() };
    let datetime_idx = column(&["datetime", "date", "time"]).ok_or_else(|| missing("datetime"))?;
    let open_idx = column(&["open"]).ok_or_else(|| missing("open"))?;
    let high_idx = column(&["high"]).ok_or_else(|| missing("high"))?;
    let low_idx = column(&["low"]).ok_or_else(|| missing("low"))?;
    let close_idx = column(&["close"]).ok_or_else(|| missing("close"))?;
    let volume_idx = column(&["volume"]);

    let mut series = TimeSeries::new(symbol);

    for (row, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!(row, error = %e, file = %path.display(), "skipping unreadable row");
                continue;
            }
        };

        match parse_bar(&record, datetime_idx, open_idx, high_idx, low_idx, close_idx, volume_idx, datetime_format) {
            Ok(bar) => series.add(bar),
            Err(reason) => {
                warn!(row, %reason, file = %path.display(), "skipping malformed row");
            }
        }
    }

    Ok(series)
}

#[allow(clippy::too_many_arguments)]
fn parse_bar(
    record: &csv::StringRecord,
    datetime_idx: usize,
    open_idx: usize,
    high_idx: usize,
    low_idx: usize,
    close_idx: usize,
    volume_idx: Option<usize>,
    datetime_format: &str,
) -> Result<Bar, String> {
    let field = |idx: usize, name: &str| {
        record.get(idx).map(str::trim).ok_or_else(|| format!("missing {name} field"))
    };
    let number = |idx: usize, name: &str| {
        field(idx, name)?.parse::<f64>().map_err(|e| format!("bad {name}: {e}"))
    };

    let timestamp = NaiveDateTime::parse_from_str(field(datetime_idx, "datetime")?, datetime_format)
        .map_err(|e| format!("bad datetime: {e}"))?;
    let open = number(open_idx, "open")?;
    let high = number(high_idx, "high")?;
    let low = number(low_idx, "low")?;
    let close = number(close_idx, "close")?;
    let volume = match volume_idx {
        Some(idx) => record
            .get(idx)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| v.parse::<f64>().map_err(|e| format!("bad volume: {e}")))
            .transpose()?
            .unwrap_or(0.0),
        None => 0.0,
    };

    let bar = Bar::new(timestamp, open, high, low, close, volume);
    bar.validate().map_err(|e| e.to_string())?;
    Ok(bar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn write_csv(dir: &Path, symbol: &str, content: &str) {
        fs::write(dir.join(format!("{symbol}.csv")), content).unwrap();
    }

    #[test]
    fn loads_well_formed_file() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "SPY",
            "datetime,open,high,low,close,volume\n\
             2024-01-02 00:00:00,100,105,95,102,1000\n\
             2024-01-03 00:00:00,102,108,100,107,1500\n",
        );

        let loader = CsvLoader::new(dir.path());
        let series = loader.load("SPY", ts(1), ts(31)).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.get(0).unwrap().close, 102.0);
        assert_eq!(series.get(1).unwrap().volume, 1500.0);
    }

    #[test]
    fn headers_match_case_insensitively_and_extra_columns_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "SPY",
            "Date,Open,HIGH,Low,Close,Volume,AdjClose\n\
             2024-01-02 00:00:00,100,105,95,102,1000,101.5\n",
        );

        let loader = CsvLoader::new(dir.path());
        let series = loader.load("SPY", ts(1), ts(31)).unwrap();
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn missing_volume_defaults_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "SPY",
            "datetime,open,high,low,close\n2024-01-02 00:00:00,100,105,95,102\n",
        );

        let loader = CsvLoader::new(dir.path());
        let series = loader.load("SPY", ts(1), ts(31)).unwrap();
        assert_eq!(series.get(0).unwrap().volume, 0.0);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "SPY",
            "datetime,open,high,low,close,volume\n\
             2024-01-02 00:00:00,100,105,95,102,1000\n\
             not-a-date,1,2,3,4,5\n\
             2024-01-03 00:00:00,abc,108,100,107,1500\n\
             2024-01-04 00:00:00,104,110,101,109,1200\n",
        );

        let loader = CsvLoader::new(dir.path());
        let series = loader.load("SPY", ts(1), ts(31)).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.last().unwrap().close, 109.0);
    }

    #[test]
    fn invalid_ohlc_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        // high < low on the second row
        write_csv(
            dir.path(),
            "SPY",
            "datetime,open,high,low,close,volume\n\
             2024-01-02 00:00:00,100,105,95,102,1000\n\
             2024-01-03 00:00:00,102,99,101,100,1500\n",
        );

        let loader = CsvLoader::new(dir.path());
        let series = loader.load("SPY", ts(1), ts(31)).unwrap();
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "SPY", "datetime,open,high,low\n2024-01-02 00:00:00,1,2,0\n");

        let loader = CsvLoader::new(dir.path());
        let result = loader.load("SPY", ts(1), ts(31));
        assert!(matches!(result, Err(DataError::MissingColumn { column: "close", .. })));
    }

    #[test]
    fn unknown_symbol_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let loader = CsvLoader::new(dir.path());
        assert!(matches!(
            loader.load("NOPE", ts(1), ts(31)),
            Err(DataError::SymbolNotFound { .. })
        ));
    }

    #[test]
    fn range_filter_is_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "SPY",
            "datetime,open,high,low,close,volume\n\
             2024-01-02 00:00:00,100,105,95,102,1000\n\
             2024-01-03 00:00:00,102,108,100,107,1500\n\
             2024-01-04 00:00:00,104,110,101,109,1200\n",
        );

        let loader = CsvLoader::new(dir.path());
        let series = loader.load("SPY", ts(3), ts(4)).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.first().unwrap().timestamp, ts(3));
        assert_eq!(series.last().unwrap().timestamp, ts(4));
    }
}
