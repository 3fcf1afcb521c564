//! Stochastic oscillator.
//!
//! %K = 100 * (close - lowest_low) / (highest_high - lowest_low) over `period`
//! candles; a flat range reports the midpoint, 50. %D = SMA(%K, smooth).

use super::sma::sma_of_series;
use super::Indicator;
use crate::domain::Candle;

/// %K when the window has no high-low range.
pub const FLAT_RANGE_K: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StochasticLine {
    K,
    D,
}

impl StochasticLine {
    pub const ALL: [StochasticLine; 2] = [Self::K, Self::D];

    pub fn label(self) -> &'static str {
        match self {
            Self::K => "k",
            Self::D => "d",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Stochastic {
    period: usize,
    smooth: usize,
    line: StochasticLine,
    name: String,
}

impl Stochastic {
    pub fn new(line: StochasticLine, period: usize, smooth: usize) -> Self {
        assert!(period >= 1 && smooth >= 1, "Stochastic periods must be >= 1");
        Self {
            period,
            smooth,
            line,
            name: format!("stoch_{}_{period}_{smooth}", line.label()),
        }
    }

    fn percent_k(&self, candles: &[Candle]) -> Vec<f64> {
        let n = candles.len();
        let mut k = vec![f64::NAN; n];
        if n < self.period {
            return k;
        }

        for i in (self.period - 1)..n {
            let window = &candles[i + 1 - self.period..=i];
            let hh = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
            let ll = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
            let range = hh - ll;
            k[i] = if range == 0.0 {
                FLAT_RANGE_K
            } else {
                100.0 * (candles[i].close - ll) / range
            };
        }
        k
    }
}

impl Indicator for Stochastic {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        match self.line {
            StochasticLine::K => self.period - 1,
            StochasticLine::D => self.period - 1 + self.smooth - 1,
        }
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let k = self.percent_k(candles);
        match self.line {
            StochasticLine::K => k,
            StochasticLine::D => sma_of_series(&k, self.smooth),
        }
    }
}
