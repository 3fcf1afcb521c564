//! Polygon-style aggregates provider.
//!
//! Fetches OHLCV candles from the `/v2/aggs` endpoint. Handles rate limiting,
//! retries with exponential backoff, response parsing, staleness detection and
//! the circuit breaker. The local candle file is the fallback when this is
//! unavailable.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, warn};

use super::circuit_breaker::CircuitBreaker;
use super::provider::{CandleRequest, DataError, RemoteCandleSource, RemoteResponse};
use crate::domain::Candle;

pub const DEFAULT_BASE_URL: &str = "https://api.polygon.io";

#[derive(Debug, Deserialize)]
struct AggsResponse {
    status: Option<String>,
    #[serde(default)]
    results: Option<Vec<AggBar>>,
    error: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AggBar {
    /// Bucket open, unix milliseconds.
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    #[serde(default)]
    v: f64,
}

pub struct PolygonProvider {
    client: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
    circuit_breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
    /// Newest candle older than this many periods marks the response stale.
    stale_after_periods: u32,
}

impl PolygonProvider {
    pub fn new(
        api_key: impl Into<String>,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            circuit_breaker,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            stale_after_periods: 3,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_stale_after(mut self, periods: u32) -> Self {
        self.stale_after_periods = periods;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    fn aggs_url(&self, request: &CandleRequest) -> String {
        format!(
            "{}/v2/aggs/ticker/{}/range/{}/{}/{}/{}?adjusted=true&sort=asc&limit=50000&apiKey={}",
            self.base_url,
            request.ticker(),
            request.multiplier,
            request.timespan.as_str(),
            request.from.format("%Y-%m-%d"),
            request.to.format("%Y-%m-%d"),
            self.api_key,
        )
    }

    /// Parse an aggregates body into ascending candles.
    fn parse_response(ticker: &str, resp: AggsResponse) -> Result<Vec<Candle>, DataError> {
        if let Some(status) = resp.status.as_deref() {
            if status == "ERROR" || status == "NOT_AUTHORIZED" {
                let detail = resp
                    .error
                    .or(resp.message)
                    .unwrap_or_else(|| status.to_string());
                return Err(if status == "NOT_AUTHORIZED" {
                    DataError::AuthenticationRequired(detail)
                } else {
                    DataError::ResponseFormatChanged(detail)
                });
            }
        }

        let results = resp.results.unwrap_or_default();
        let mut candles: Vec<Candle> = results
            .into_iter()
            .map(|b| Candle::new(b.t / 1000, b.o, b.h, b.l, b.c, b.v))
            .filter(Candle::is_sane)
            .collect();

        if candles.is_empty() {
            return Err(DataError::NoData {
                ticker: ticker.to_string(),
            });
        }

        candles.sort_by_key(|c| c.time);
        candles.dedup_by_key(|c| c.time);
        Ok(candles)
    }

    fn fetch_with_retry(&self, request: &CandleRequest) -> Result<Vec<Candle>, DataError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(DataError::CircuitBreakerTripped);
        }

        let ticker = request.ticker();
        let url = self.aggs_url(request);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                debug!(attempt, ?delay, %ticker, "retrying");
                std::thread::sleep(delay);
            }

            if !self.circuit_breaker.is_allowed() {
                return Err(DataError::CircuitBreakerTripped);
            }

            let resp = match self.client.get(&url).send() {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_error = Some(DataError::NetworkUnreachable(e.to_string()));
                    continue;
                }
                Err(e) => return Err(DataError::NetworkUnreachable(e.to_string())),
            };

            let status = resp.status();

            if status == reqwest::StatusCode::FORBIDDEN {
                self.circuit_breaker.trip();
                return Err(DataError::CircuitBreakerTripped);
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                self.circuit_breaker.record_failure();
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                last_error = Some(DataError::RateLimited {
                    retry_after_secs: retry_after,
                });
                continue;
            }

            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(DataError::AuthenticationRequired(
                    "provider rejected the API key".into(),
                ));
            }

            if !status.is_success() {
                self.circuit_breaker.record_failure();
                last_error = Some(DataError::Other(format!("HTTP {status} for {ticker}")));
                continue;
            }

            let body: AggsResponse = resp.json().map_err(|e| {
                DataError::ResponseFormatChanged(format!(
                    "failed to parse response for {ticker}: {e}"
                ))
            })?;

            let candles = Self::parse_response(&ticker, body)?;
            self.circuit_breaker.record_success();
            return Ok(candles);
        }

        Err(last_error.unwrap_or_else(|| DataError::Other("max retries exceeded".into())))
    }
}

/// True when the newest candle is more than `periods` candle lengths old.
pub fn is_stale(candles: &[Candle], period_seconds: i64, periods: u32, now: i64) -> bool {
    match candles.last() {
        Some(last) if periods > 0 => now - last.time > period_seconds * i64::from(periods),
        Some(_) => false,
        None => true,
    }
}

impl RemoteCandleSource for PolygonProvider {
    fn name(&self) -> &str {
        "polygon"
    }

    fn fetch(&self, request: &CandleRequest) -> RemoteResponse {
        let result = self.fetch_with_retry(request);
        if let Err(e) = &result {
            warn!(error = %e, ticker = %request.ticker(), "remote fetch failed");
        }
        let mut response = RemoteResponse::from(result);
        if response.error.is_none() {
            response.stale = is_stale(
                &response.candles,
                request.period_seconds(),
                self.stale_after_periods,
                Utc::now().timestamp(),
            );
        }
        response
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::Timespan;
    use chrono::NaiveDate;

    fn parse(json: &str) -> Result<Vec<Candle>, DataError> {
        let resp: AggsResponse = serde_json::from_str(json).unwrap();
        PolygonProvider::parse_response("C:EURUSD", resp)
    }

    #[test]
    fn parses_and_sorts_results() {
        let candles = parse(
            r#"{"status":"OK","resultsCount":2,"results":[
                {"t":1700003600000,"o":1.1,"h":1.2,"l":1.0,"c":1.15,"v":10},
                {"t":1700000000000,"o":1.0,"h":1.1,"l":0.9,"c":1.1,"v":5}
            ]}"#,
        )
        .unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].time, 1_700_000_000);
        assert_eq!(candles[1].close, 1.15);
    }

    #[test]
    fn drops_broken_bars() {
        let candles = parse(
            r#"{"status":"OK","results":[
                {"t":1700000000000,"o":1.0,"h":0.5,"l":0.9,"c":1.1,"v":5},
                {"t":1700003600000,"o":1.1,"h":1.2,"l":1.0,"c":1.15}
            ]}"#,
        )
        .unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].volume, 0.0);
    }

    #[test]
    fn empty_results_is_no_data() {
        assert!(matches!(
            parse(r#"{"status":"OK","resultsCount":0}"#),
            Err(DataError::NoData { .. })
        ));
    }

    #[test]
    fn error_status_is_reported() {
        assert!(matches!(
            parse(r#"{"status":"NOT_AUTHORIZED","message":"bad key"}"#),
            Err(DataError::AuthenticationRequired(msg)) if msg == "bad key"
        ));
    }

    #[test]
    fn url_shape() {
        let provider = PolygonProvider::new("k", Arc::new(CircuitBreaker::default_provider()))
            .unwrap()
            .with_base_url("http://localhost:1/");
        let req = CandleRequest::new("EUR", "USD", 1, Timespan::Hour, 1).with_range(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );
        assert_eq!(
            provider.aggs_url(&req),
            "http://localhost:1/v2/aggs/ticker/C:EURUSD/range/1/hour/2024-01-01/2024-01-31\
             ?adjusted=true&sort=asc&limit=50000&apiKey=k"
        );
    }

    #[test]
    fn tripped_breaker_refuses_without_network() {
        let breaker = Arc::new(CircuitBreaker::default_provider());
        breaker.trip();
        let provider = PolygonProvider::new("k", breaker).unwrap();
        assert!(!provider.is_available());
        let resp = provider.fetch(&CandleRequest::new("EUR", "USD", 1, Timespan::Hour, 1));
        assert!(resp.candles.is_empty());
        assert!(resp.error.unwrap().contains("circuit breaker"));
    }

    #[test]
    fn staleness() {
        let candles = vec![Candle::new(1_000, 1.0, 1.0, 1.0, 1.0, 0.0)];
        assert!(!is_stale(&candles, 60, 3, 1_180));
        assert!(is_stale(&candles, 60, 3, 1_181));
        assert!(!is_stale(&candles, 60, 0, 1_000_000));
        assert!(is_stale(&[], 60, 3, 0));
    }
}
