//! Synthetic candle generator.
//!
//! Once replay exhausts real history, each new candle is drawn from the
//! statistics of a trailing window: average range, average volume and a
//! trend bias that tilts the random direction. The walk is momentum-aware
//! rather than white noise and makes no claim to statistical realism.

use crate::domain::Candle;
use rand::Rng;

/// Default trailing window size.
pub const DEFAULT_WINDOW: usize = 20;

/// Weight of the trend bias added to the uniform direction draw.
pub const TREND_WEIGHT: f64 = 0.3;

/// Fallback range (fraction of last close) when the window has no range.
const FLAT_RANGE_FRACTION: f64 = 0.001;

/// Statistics of the trailing window that drive generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub avg_range: f64,
    pub avg_volume: f64,
    /// Normalised price change over the window, in `[-1, 1]`.
    pub trend_bias: f64,
}

impl WindowStats {
    /// `None` for an empty window.
    pub fn from_window(window: &[Candle]) -> Option<Self> {
        let first = window.first()?;
        let last = window.last()?;
        let n = window.len() as f64;

        let mut avg_range = window.iter().map(Candle::range).sum::<f64>() / n;
        if avg_range <= 0.0 || !avg_range.is_finite() {
            avg_range = (last.close.abs() * FLAT_RANGE_FRACTION).max(f64::EPSILON);
        }
        let avg_volume = window.iter().map(|c| c.volume).sum::<f64>() / n;
        let trend_bias = ((last.close - first.close) / (avg_range * n.sqrt())).clamp(-1.0, 1.0);

        Some(Self {
            avg_range,
            avg_volume,
            trend_bias,
        })
    }
}

/// Produce the candle that follows `history`.
///
/// Reads only the last `window` candles of `history`; returns `None` when the
/// history is empty.
pub fn next_candle<R: Rng>(
    history: &[Candle],
    timeframe_seconds: i64,
    window: usize,
    rng: &mut R,
) -> Option<Candle> {
    let prev = history.last()?;
    let start = history.len().saturating_sub(window.max(1));
    let stats = WindowStats::from_window(&history[start..])?;
    let range = stats.avg_range;

    let direction = rng.gen_range(-1.0..=1.0) + stats.trend_bias * TREND_WEIGHT;
    let open = prev.close + rng.gen_range(-0.1..=0.1) * range;
    let close = open + direction * range * rng.gen_range(0.3..=1.0);
    let high = open.max(close) + rng.gen_range(0.0..=0.5) * range;
    let low = open.min(close) - rng.gen_range(0.0..=0.5) * range;
    let volume = stats.avg_volume * rng.gen_range(0.5..=1.5);

    Some(Candle {
        time: prev.time + timeframe_seconds,
        open,
        high,
        low,
        close,
        volume,
    })
}

/// Stateful wrapper that owns the rng and window size.
#[derive(Debug, Clone)]
pub struct SyntheticGenerator<R> {
    rng: R,
    window: usize,
}

impl<R: Rng> SyntheticGenerator<R> {
    pub fn new(rng: R, window: usize) -> Self {
        Self {
            rng,
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn next(&mut self, history: &[Candle], timeframe_seconds: i64) -> Option<Candle> {
        next_candle(history, timeframe_seconds, self.window, &mut self.rng)
    }
}
