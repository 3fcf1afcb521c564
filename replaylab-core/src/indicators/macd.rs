//! Moving Average Convergence Divergence (MACD).
//!
//! macd = EMA(fast) - EMA(slow), signal = EMA(signal) of macd,
//! histogram = macd - signal. All three lines are reported in pips
//! (scaled by `MACD_SCALE`) so forex-sized moves stay readable.

use super::ema::ema_of_series;
use super::{closes, Indicator};
use crate::domain::Candle;

/// Price-to-pip scaling applied to every MACD line.
pub const MACD_SCALE: f64 = 10_000.0;

/// Which MACD line to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdLine {
    Macd,
    Signal,
    Histogram,
}

impl MacdLine {
    pub const ALL: [MacdLine; 3] = [Self::Macd, Self::Signal, Self::Histogram];

    pub fn label(self) -> &'static str {
        match self {
            Self::Macd => "macd",
            Self::Signal => "signal",
            Self::Histogram => "histogram",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
    line: MacdLine,
    name: String,
}

impl Macd {
    pub fn new(line: MacdLine, fast: usize, slow: usize, signal: usize) -> Self {
        assert!(
            fast >= 1 && slow >= 1 && signal >= 1,
            "MACD periods must be >= 1"
        );
        Self {
            fast,
            slow,
            signal,
            line,
            name: format!("macd_{}_{fast}_{slow}_{signal}", line.label()),
        }
    }

    pub fn line(&self) -> MacdLine {
        self.line
    }

    /// Unscaled macd line: EMA(fast) - EMA(slow).
    fn raw_macd(&self, closes: &[f64]) -> Vec<f64> {
        let fast = ema_of_series(closes, self.fast);
        let slow = ema_of_series(closes, self.slow);
        fast.iter().zip(&slow).map(|(f, s)| f - s).collect()
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        let macd_lookback = self.fast.max(self.slow) - 1;
        match self.line {
            MacdLine::Macd => macd_lookback,
            MacdLine::Signal | MacdLine::Histogram => macd_lookback + self.signal - 1,
        }
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let macd = self.raw_macd(&closes(candles));

        let raw = match self.line {
            MacdLine::Macd => macd,
            MacdLine::Signal => ema_of_series(&macd, self.signal),
            MacdLine::Histogram => {
                let signal = ema_of_series(&macd, self.signal);
                macd.iter().zip(&signal).map(|(m, s)| m - s).collect()
            }
        };

        raw.into_iter().map(|v| v * MACD_SCALE).collect()
    }
}
