//! Replay controller: a steppable, seekable, speed-controlled cursor over a
//! historical candle series that continues with synthetic candles once the
//! history runs out.

pub mod controller;

pub use controller::{
    PlaybackMode, ReplayController, ReplaySettings, ReplayStatus, MAX_SYNTHETIC_STEP,
};

/// Slowest and fastest supported playback multipliers.
pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 100.0;
