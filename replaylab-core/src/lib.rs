//! ReplayLab Core: candle replay, synthetic continuation, indicators and a
//! leveraged paper-trading engine.
//!
//! - Domain types (candles, timeframes, positions, trades)
//! - Candle aggregation and synthetic candle generation
//! - Indicator catalog and computation pipeline
//! - Replay controller (play/pause/step/seek over history, then synthetic)
//! - Trading engine (SL/TP evaluation, PnL settlement, equity accounting)
//! - Session actor tying the three together on one writer thread
//! - Remote and local candle sources

pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod data;
pub mod domain;
pub mod indicators;
pub mod replay;
pub mod rng;
pub mod session;
pub mod synthetic;
pub mod trading;
