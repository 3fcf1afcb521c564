//! Candle: the fundamental market data unit.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OHLCV candle for one time bucket.
///
/// `time` is the bucket open in unix seconds. Candles are immutable once they
/// join a history; sequences are strictly ascending in `time`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Why a candle or candle sequence was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CandleError {
    #[error("candle at {time} has a non-finite field")]
    NonFinite { time: i64 },

    #[error("candle at {time} violates low <= open/close <= high")]
    BrokenRange { time: i64 },

    #[error("candle times not strictly ascending: {prev} then {next}")]
    OutOfOrder { prev: i64, next: i64 },
}

impl Candle {
    pub fn new(time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Returns true if any OHLCV field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite())
    }

    /// OHLC sanity check: `low <= min(open, close)` and `high >= max(open, close)`.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.volume >= 0.0
    }

    pub fn validate(&self) -> Result<(), CandleError> {
        if self.is_void() {
            return Err(CandleError::NonFinite { time: self.time });
        }
        if !self.is_sane() {
            return Err(CandleError::BrokenRange { time: self.time });
        }
        Ok(())
    }

    /// High-low span of the candle.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }
}

/// Check a whole sequence: every candle sane, times strictly ascending.
pub fn validate_series(candles: &[Candle]) -> Result<(), CandleError> {
    for candle in candles {
        candle.validate()?;
    }
    for pair in candles.windows(2) {
        if pair[1].time <= pair[0].time {
            return Err(CandleError::OutOfOrder {
                prev: pair[0].time,
                next: pair[1].time,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candle() -> Candle {
        Candle::new(1_700_000_000, 1.1000, 1.1050, 1.0980, 1.1030, 1_250.0)
    }

    #[test]
    fn candle_is_sane() {
        assert!(sample_candle().is_sane());
        assert!(sample_candle().validate().is_ok());
    }

    #[test]
    fn candle_detects_void() {
        let mut candle = sample_candle();
        candle.open = f64::NAN;
        assert!(candle.is_void());
        assert_eq!(
            candle.validate(),
            Err(CandleError::NonFinite { time: candle.time })
        );
    }

    #[test]
    fn candle_detects_insane_high_low() {
        let mut candle = sample_candle();
        candle.high = 1.0970; // below low
        assert!(!candle.is_sane());
    }

    #[test]
    fn series_rejects_duplicate_times() {
        let a = sample_candle();
        let b = sample_candle();
        assert_eq!(
            validate_series(&[a, b]),
            Err(CandleError::OutOfOrder {
                prev: a.time,
                next: b.time
            })
        );
    }

    #[test]
    fn candle_serialization_roundtrip() {
        let candle = sample_candle();
        let json = serde_json::to_string(&candle).unwrap();
        let deser: Candle = serde_json::from_str(&json).unwrap();
        assert_eq!(candle, deser);
    }
}
