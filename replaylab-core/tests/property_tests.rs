//! Property tests for replay invariants.
//!
//! Uses proptest to verify:
//! 1. Aggregation conserves extremes, volume and the open/close boundaries
//! 2. Synthetic candles are always well-formed and seed-deterministic
//! 3. Equity accounting holds after any sequence of trading operations
//! 4. The replay cursor stays consistent with the visible window

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use replaylab_core::aggregate::aggregate_by;
use replaylab_core::domain::{Candle, PositionSide, PositionUpdate, Timeframe};
use replaylab_core::replay::{PlaybackMode, ReplayController, ReplaySettings};
use replaylab_core::synthetic::SyntheticGenerator;
use replaylab_core::trading::{AccountConfig, TradingEngine};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = f64> {
    (0.5..2.0_f64).prop_map(|p| (p * 10_000.0).round() / 10_000.0)
}

/// A well-formed candle series with strictly increasing times.
fn arb_candles(max_len: usize) -> impl Strategy<Value = Vec<Candle>> {
    let row = (arb_price(), 0.0..0.01_f64, 0.0..0.01_f64, 0.0..5_000.0_f64);
    prop::collection::vec(row, 1..max_len).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (close, up, down, volume))| {
                let open = close - (up - down) / 2.0;
                Candle::new(
                    1_700_000_000 + i as i64 * 60,
                    open,
                    open.max(close) + up,
                    open.min(close) - down,
                    close,
                    volume,
                )
            })
            .collect()
    })
}

#[derive(Debug, Clone)]
enum TradeOp {
    Open(bool, f64, Option<f64>, Option<f64>),
    Price(f64),
    CloseFirst(f64),
    CloseAll(f64),
    MoveStop(f64),
}

fn arb_trade_op() -> impl Strategy<Value = TradeOp> {
    prop_oneof![
        (
            any::<bool>(),
            0.01..10.0_f64,
            prop::option::of(arb_price()),
            prop::option::of(arb_price())
        )
            .prop_map(|(long, size, sl, tp)| TradeOp::Open(long, size, sl, tp)),
        arb_price().prop_map(TradeOp::Price),
        arb_price().prop_map(TradeOp::CloseFirst),
        arb_price().prop_map(TradeOp::CloseAll),
        arb_price().prop_map(TradeOp::MoveStop),
    ]
}

#[derive(Debug, Clone)]
enum ReplayOp {
    Play,
    Pause,
    Tick,
    Forward(usize),
    Backward(usize),
    Seek(usize),
    Reset,
}

fn arb_replay_op() -> impl Strategy<Value = ReplayOp> {
    prop_oneof![
        Just(ReplayOp::Play),
        Just(ReplayOp::Pause),
        Just(ReplayOp::Tick),
        (0..8usize).prop_map(ReplayOp::Forward),
        (0..8usize).prop_map(ReplayOp::Backward),
        (0..64usize).prop_map(ReplayOp::Seek),
        Just(ReplayOp::Reset),
    ]
}

// ── 1. Aggregation ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn aggregation_conserves_extremes_and_volume(
        candles in arb_candles(120),
        n in 1..10usize,
    ) {
        let rolled = aggregate_by(&candles, n);
        prop_assert_eq!(rolled.len(), candles.len().div_ceil(n));

        for (chunk, agg) in candles.chunks(n).zip(&rolled) {
            let high = chunk.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
            let low = chunk.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
            let volume: f64 = chunk.iter().map(|c| c.volume).sum();

            prop_assert_eq!(agg.time, chunk[0].time);
            prop_assert_eq!(agg.open, chunk[0].open);
            prop_assert_eq!(agg.close, chunk[chunk.len() - 1].close);
            prop_assert_eq!(agg.high, high);
            prop_assert_eq!(agg.low, low);
            prop_assert!((agg.volume - volume).abs() < 1e-6);
            prop_assert!(agg.is_sane());
        }
    }
}

// ── 2. Synthetic generation ──────────────────────────────────────────

proptest! {
    #[test]
    fn synthetic_candles_are_well_formed(
        candles in arb_candles(40),
        seed in any::<u64>(),
        count in 1..50usize,
    ) {
        let mut generator = SyntheticGenerator::new(StdRng::seed_from_u64(seed), 20);
        let mut history = candles;
        for _ in 0..count {
            let prev = history[history.len() - 1];
            let next = generator.next(&history, 60).unwrap();
            prop_assert!(next.is_sane(), "malformed candle {:?}", next);
            prop_assert_eq!(next.time, prev.time + 60);
            history.push(next);
        }
    }

    #[test]
    fn synthetic_stream_is_seed_deterministic(
        candles in arb_candles(30),
        seed in any::<u64>(),
    ) {
        let run = |seed: u64| {
            let mut generator = SyntheticGenerator::new(StdRng::seed_from_u64(seed), 20);
            let mut history = candles.clone();
            for _ in 0..10 {
                if let Some(next) = generator.next(&history, 3600) {
                    history.push(next);
                }
            }
            history
        };
        prop_assert_eq!(run(seed), run(seed));
    }
}

// ── 3. Equity accounting ─────────────────────────────────────────────

proptest! {
    #[test]
    fn equity_identity_holds(ops in prop::collection::vec(arb_trade_op(), 1..40)) {
        let config = AccountConfig::default();
        let mut engine = TradingEngine::new(config);
        let mut time = 1_700_000_000;

        for op in ops {
            time += 60;
            match op {
                TradeOp::Open(long, size, sl, tp) => {
                    let price = engine.current_price().unwrap_or(1.1);
                    let side = if long { PositionSide::Long } else { PositionSide::Short };
                    engine.open_position(side, size, price, time, sl, tp);
                }
                TradeOp::Price(price) => {
                    engine.update_price(price, time);
                }
                TradeOp::CloseFirst(price) => {
                    if let Some(id) = engine.positions().first().map(|p| p.id.clone()) {
                        prop_assert!(engine.close_position(&id, price, time).is_some());
                    }
                }
                TradeOp::CloseAll(price) => {
                    engine.close_all_positions(price, time);
                    prop_assert!(engine.positions().is_empty());
                }
                TradeOp::MoveStop(price) => {
                    if let Some(id) = engine.positions().first().map(|p| p.id.clone()) {
                        prop_assert!(engine.update_position(&id, PositionUpdate::stop_loss(price)));
                    }
                }
            }

            let state = engine.state();
            let realized: f64 = state.trades.iter().map(|t| t.pnl).sum();
            let expected_equity = state.balance + state.unrealized_pnl(config.leverage);

            prop_assert!((state.equity - expected_equity).abs() < 1e-6);
            prop_assert!((state.balance - (config.initial_balance + realized)).abs() < 1e-6);
        }
    }
}

// ── 4. Replay cursor ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn visible_window_tracks_cursor(
        candles in arb_candles(60),
        ops in prop::collection::vec(arb_replay_op(), 1..60),
    ) {
        let history_len = candles.len();
        let mut replay = ReplayController::new(ReplaySettings::default(), candles, Timeframe::M1);

        for op in ops {
            match op {
                ReplayOp::Play => replay.play(),
                ReplayOp::Pause => replay.pause(),
                ReplayOp::Tick => {
                    replay.tick();
                }
                ReplayOp::Forward(n) => replay.step_forward(n),
                ReplayOp::Backward(n) => replay.step_backward(n),
                ReplayOp::Seek(i) => replay.seek(i),
                ReplayOp::Reset => replay.reset(),
            }

            let visible = replay.visible_candles();
            prop_assert_eq!(visible.len(), replay.visible_len());
            prop_assert!((0.0..=100.0).contains(&replay.progress()));

            match replay.cursor() {
                None => {
                    prop_assert_eq!(replay.mode(), PlaybackMode::Idle);
                    prop_assert_eq!(visible.len(), history_len);
                }
                Some(cursor) => {
                    prop_assert_eq!(visible.len(), cursor + 1);
                    prop_assert_eq!(replay.latest(), visible.last().copied());
                    prop_assert_eq!(replay.is_live(), cursor >= history_len);
                    prop_assert!(visible.windows(2).all(|w| w[1].time > w[0].time));
                }
            }
        }
    }
}
