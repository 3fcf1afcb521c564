//! Relative Strength Index (RSI).
//!
//! Average gain and average loss are plain means over the trailing `period`
//! close-to-close changes, so each value depends only on its own window.
//! RS = avg_gain / avg_loss; RSI = 100 - 100 / (1 + RS).
//! Lookback: period (first value at index `period`).
//! avg_loss == 0 uses RS = RS_SENTINEL instead of infinity.

use super::{closes, Indicator};
use crate::domain::Candle;

/// RS used when the window has no losses.
pub const RS_SENTINEL: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self {
            period,
            name: format!("rsi_{period}"),
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let closes = closes(candles);
        let n = closes.len();
        let mut result = vec![f64::NAN; n];

        if n <= self.period {
            return result;
        }

        let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

        for i in self.period..n {
            // changes[j] is the move from close[j] to close[j + 1]
            let window = &changes[i - self.period..i];
            if window.iter().any(|c| c.is_nan()) {
                continue;
            }
            let gains: f64 = window.iter().filter(|&&c| c > 0.0).sum();
            let losses: f64 = window.iter().filter(|&&c| c < 0.0).map(|c| -c).sum();
            let avg_gain = gains / self.period as f64;
            let avg_loss = losses / self.period as f64;
            result[i] = compute_rsi(avg_gain, avg_loss);
        }

        result
    }
}

fn compute_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    let rs = if avg_loss == 0.0 {
        RS_SENTINEL
    } else {
        avg_gain / avg_loss
    };
    100.0 - 100.0 / (1.0 + rs)
}
