//! Candle data sources: a remote quote provider, a local CSV file, and the
//! policy that picks between them.

pub mod circuit_breaker;
pub mod csv_source;
pub mod loader;
pub mod polygon;
pub mod provider;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use csv_source::{
    parse_candles, parse_timestamp, write_candles, CsvLoadReport, CsvSourceError, LocalCandleFile,
};
pub use loader::{load_candles, LoadedCandles};
pub use polygon::PolygonProvider;
pub use provider::{
    CandleRequest, DataError, DataSource, RemoteCandleSource, RemoteResponse, Timespan,
};
