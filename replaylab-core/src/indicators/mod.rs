//! Technical indicators over a candle slice.
//!
//! Indicators are pure functions: candles in, numeric series out. Each one is
//! recomputed from scratch whenever the visible candle set changes; there is
//! no cached state, so repeated calls on the same input are bit-identical.
//!
//! Multi-line indicators (MACD, Bollinger, Stochastic, Volume) are exposed as
//! separate instances per line, keeping the single-series `Indicator` trait.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod pipeline;
pub mod rsi;
pub mod sma;
pub mod stochastic;
pub mod volume;

pub use atr::Atr;
pub use bollinger::{Bollinger, BollingerBand};
pub use ema::Ema;
pub use macd::{Macd, MacdLine};
pub use pipeline::{IndicatorLine, IndicatorPipeline, IndicatorSnapshot};
pub use rsi::Rsi;
pub use sma::Sma;
pub use stochastic::{Stochastic, StochasticLine};
pub use volume::{VolumeLine, VolumeStats};

use crate::domain::Candle;
use serde::{Deserialize, Serialize};

/// Trait for indicators.
///
/// `compute` returns a series of the same length as `candles`; the first
/// `lookback()` values are `f64::NAN` (warmup).
///
/// # Look-ahead guard
/// No value at index t may depend on candles after t. Every indicator must
/// give the same prefix on a truncated series as on the full one.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "sma_20", "rsi_14").
    fn name(&self) -> &str;

    /// Number of candles before the first valid output.
    fn lookback(&self) -> usize;

    fn compute(&self, candles: &[Candle]) -> Vec<f64>;
}

/// One indicator value aligned to the candle it was computed for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub time: i64,
    pub value: f64,
}

/// Pair `values` with candle times, dropping warmup/NaN entries.
pub fn to_points(candles: &[Candle], values: &[f64]) -> Vec<IndicatorPoint> {
    candles
        .iter()
        .zip(values)
        .filter(|(_, v)| !v.is_nan())
        .map(|(c, &value)| IndicatorPoint {
            time: c.time,
            value,
        })
        .collect()
}

pub(crate) fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Create candles from close prices for testing.
///
/// open = prev_close (or close for the first candle),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                time: 1_700_000_000 + i as i64 * 3600,
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
