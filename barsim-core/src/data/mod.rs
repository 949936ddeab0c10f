//! Market data: loader contract, CSV loader, and the caching service.

pub mod loader;
pub mod service;

pub use loader::{CsvLoader, DataError, MarketDataLoader};
pub use service::MarketDataService;
