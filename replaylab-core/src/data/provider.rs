//! Remote candle source trait and structured error types.
//!
//! `RemoteCandleSource` abstracts over quote providers so the loader can swap
//! implementations and tests can inject canned responses.

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Candle, Timeframe};

/// Structured error types for remote data operations.
///
/// Displayable in CLI output and carried as the `error` string of a
/// [`RemoteResponse`].
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("no data for ticker: {ticker}")]
    NoData { ticker: String },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("unsupported request: {0}")]
    UnsupportedRequest(String),

    #[error("data error: {0}")]
    Other(String),
}

/// Bucket unit for aggregate requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timespan {
    Minute,
    Hour,
    Day,
    Week,
}

impl Timespan {
    pub fn as_str(self) -> &'static str {
        match self {
            Timespan::Minute => "minute",
            Timespan::Hour => "hour",
            Timespan::Day => "day",
            Timespan::Week => "week",
        }
    }

    pub fn seconds(self) -> i64 {
        match self {
            Timespan::Minute => 60,
            Timespan::Hour => 3_600,
            Timespan::Day => 86_400,
            Timespan::Week => 604_800,
        }
    }
}

const FIAT: &[&str] = &["USD", "EUR", "GBP", "JPY", "CHF", "AUD", "CAD", "NZD"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleRequest {
    pub base_asset: String,
    pub quote_asset: String,
    pub multiplier: u32,
    pub timespan: Timespan,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl CandleRequest {
    /// Request covering the last `lookback_days` days up to today (UTC).
    pub fn new(
        base_asset: impl Into<String>,
        quote_asset: impl Into<String>,
        multiplier: u32,
        timespan: Timespan,
        lookback_days: i64,
    ) -> Self {
        let to = Utc::now().date_naive();
        Self {
            base_asset: base_asset.into().to_uppercase(),
            quote_asset: quote_asset.into().to_uppercase(),
            multiplier: multiplier.max(1),
            timespan,
            from: to - ChronoDuration::days(lookback_days.max(1)),
            to,
        }
    }

    pub fn with_range(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Parse a pair like `EUR/USD` or `BTC-USD`.
    pub fn from_pair(
        pair: &str,
        multiplier: u32,
        timespan: Timespan,
        lookback_days: i64,
    ) -> Option<Self> {
        let (base, quote) = pair.split_once(['/', '-'])?;
        if base.is_empty() || quote.is_empty() {
            return None;
        }
        Some(Self::new(base, quote, multiplier, timespan, lookback_days))
    }

    pub fn is_forex(&self) -> bool {
        FIAT.contains(&self.base_asset.as_str()) && FIAT.contains(&self.quote_asset.as_str())
    }

    /// Provider ticker, `C:` prefix for currency pairs and `X:` for crypto.
    pub fn ticker(&self) -> String {
        let prefix = if self.is_forex() { "C" } else { "X" };
        format!("{prefix}:{}{}", self.base_asset, self.quote_asset)
    }

    /// Length of one requested candle.
    pub fn period_seconds(&self) -> i64 {
        self.timespan.seconds() * i64::from(self.multiplier)
    }

    /// Replay timeframe matching this request, if there is one.
    pub fn timeframe(&self) -> Option<Timeframe> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.seconds() == self.period_seconds())
    }
}

/// What a remote source hands back. Never an error value: failures are
/// reported in `error` so callers can fall back without unwinding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteResponse {
    pub candles: Vec<Candle>,
    pub rate_limited: bool,
    pub error: Option<String>,
    /// Newest candle is older than the provider's staleness threshold.
    #[serde(default)]
    pub stale: bool,
}

impl RemoteResponse {
    pub fn ok(candles: Vec<Candle>) -> Self {
        Self {
            candles,
            ..Self::default()
        }
    }

    pub fn failed(error: &DataError) -> Self {
        Self {
            rate_limited: matches!(error, DataError::RateLimited { .. }),
            error: Some(error.to_string()),
            ..Self::default()
        }
    }

    pub fn is_usable(&self) -> bool {
        !self.rate_limited && self.error.is_none() && !self.candles.is_empty()
    }
}

impl From<Result<Vec<Candle>, DataError>> for RemoteResponse {
    fn from(result: Result<Vec<Candle>, DataError>) -> Self {
        match result {
            Ok(candles) => Self::ok(candles),
            Err(e) => Self::failed(&e),
        }
    }
}

/// Where a loaded candle set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Remote,
    LocalFile,
    None,
}

/// Trait for remote quote providers.
pub trait RemoteCandleSource: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    fn fetch(&self, request: &CandleRequest) -> RemoteResponse;

    /// Check if the provider is currently available (not rate-limited, not blocked).
    fn is_available(&self) -> bool;
}
