//! Trading session: replay, trading engine and indicator pipeline wired
//! together, plus a single-writer actor that drives it from a background
//! thread.
//!
//! [`Session`] is the synchronous reducer. [`SessionHandle::spawn`] moves one
//! into a session thread that consumes [`SessionCommand`]s from an `mpsc`
//! channel. The play timer is a separate ticker thread that only sends
//! `Tick { generation }`; every state change happens on the session thread,
//! one message at a time. Pause, reset, timeframe changes and shutdown cancel
//! the ticker first, and ticks from an older generation are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogError, CatalogStore, IndicatorCatalog};
use crate::config::SessionConfig;
use crate::domain::{
    Candle, PositionId, PositionSide, PositionUpdate, Timeframe, TimeframeError, Trade,
};
use crate::indicators::{IndicatorPipeline, IndicatorSnapshot};
use crate::replay::{PlaybackMode, ReplayController, ReplayStatus};
use crate::trading::{TradeStats, TradingEngine, TradingState};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no visible candle to price the order")]
    NoPrice,

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error(transparent)]
    Timeframe(#[from] TimeframeError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("session thread has stopped")]
    Closed,

    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Consistent copy of everything a presentation layer draws.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub replay: ReplayStatus,
    pub candles: Vec<Candle>,
    pub trading: TradingState,
    pub stats: TradeStats,
    pub indicators: IndicatorSnapshot,
}

impl SessionSnapshot {
    pub fn latest(&self) -> Option<&Candle> {
        self.candles.last()
    }
}

pub struct Session {
    replay: ReplayController,
    trading: TradingEngine,
    catalog: IndicatorCatalog,
    store: Option<Box<dyn CatalogStore>>,
    pipeline: IndicatorPipeline,
    indicators: IndicatorSnapshot,
}

impl Session {
    pub fn new(replay: ReplayController, trading: TradingEngine, catalog: IndicatorCatalog) -> Self {
        let mut session = Self {
            replay,
            trading,
            catalog,
            store: None,
            pipeline: IndicatorPipeline::new(),
            indicators: IndicatorSnapshot::default(),
        };
        session.recompute();
        session
    }

    /// Build from configuration, starting at the configured timeframe.
    pub fn from_config(
        config: &SessionConfig,
        candles: Vec<Candle>,
        catalog: IndicatorCatalog,
    ) -> Result<Self, SessionError> {
        let mut replay =
            ReplayController::new(config.replay_settings(), candles, config.base_timeframe);
        replay.set_timeframe(config.initial_timeframe)?;
        Ok(Self::new(
            replay,
            TradingEngine::new(config.account),
            catalog,
        ))
    }

    /// Persist catalog edits through `store`.
    pub fn with_store(mut self, store: Box<dyn CatalogStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn replay(&self) -> &ReplayController {
        &self.replay
    }

    pub fn trading(&self) -> &TradingEngine {
        &self.trading
    }

    pub fn catalog(&self) -> &IndicatorCatalog {
        &self.catalog
    }

    pub fn indicators(&self) -> &IndicatorSnapshot {
        &self.indicators
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            replay: self.replay.status(),
            candles: self.replay.visible_candles(),
            trading: self.trading.state().clone(),
            stats: self.trading.stats(),
            indicators: self.indicators.clone(),
        }
    }

    /// Starting from idle moves the view to the first candle, so indicators
    /// and the engine catch up immediately rather than on the first tick.
    pub fn play(&mut self) -> Vec<Trade> {
        let from_idle = self.replay.mode() == PlaybackMode::Idle;
        self.replay.play();
        if !from_idle {
            return Vec::new();
        }
        self.recompute();
        self.push_price()
    }

    pub fn pause(&mut self) {
        self.replay.pause();
    }

    /// Timer tick: step, recompute, then settle against the new close.
    pub fn tick(&mut self) -> Vec<Trade> {
        if !self.replay.tick() {
            return Vec::new();
        }
        self.recompute();
        self.push_price()
    }

    pub fn step_forward(&mut self, n: usize) -> Vec<Trade> {
        self.replay.step_forward(n);
        self.recompute();
        self.push_price()
    }

    /// Indicators follow the cursor back; the trading engine does not.
    pub fn step_backward(&mut self, n: usize) {
        self.replay.step_backward(n);
        self.recompute();
    }

    /// Seeking back only moves the view; the engine keeps its newest price.
    pub fn seek(&mut self, index: usize) -> Vec<Trade> {
        self.replay.seek(index);
        self.recompute();
        self.push_price()
    }

    pub fn reset(&mut self) {
        self.replay.reset();
        self.recompute();
    }

    pub fn set_speed(&mut self, multiplier: f64) {
        self.replay.set_speed(multiplier);
    }

    pub fn set_timeframe(&mut self, timeframe: Timeframe) -> Result<Vec<Trade>, SessionError> {
        self.replay.set_timeframe(timeframe)?;
        self.recompute();
        Ok(match self.replay.cursor() {
            Some(_) => self.push_price(),
            None => Vec::new(),
        })
    }

    /// Open at the newest visible close.
    pub fn open_position(
        &mut self,
        side: PositionSide,
        size: f64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<PositionId, SessionError> {
        if !(size.is_finite() && size > 0.0) {
            return Err(SessionError::InvalidOrder(format!("size must be > 0, got {size}")));
        }
        if stop_loss.into_iter().chain(take_profit).any(|p| !p.is_finite()) {
            return Err(SessionError::InvalidOrder("bounds must be finite".into()));
        }
        let latest = self.replay.latest().ok_or(SessionError::NoPrice)?;
        Ok(self
            .trading
            .open_position(side, size, latest.close, latest.time, stop_loss, take_profit))
    }

    /// Close at the newest visible close. `None` for an unknown id or no price.
    pub fn close_position(&mut self, id: &PositionId) -> Option<Trade> {
        let latest = self.replay.latest()?;
        self.trading.close_position(id, latest.close, latest.time)
    }

    pub fn close_all(&mut self) -> Vec<Trade> {
        match self.replay.latest() {
            Some(latest) => self.trading.close_all_positions(latest.close, latest.time),
            None => Vec::new(),
        }
    }

    pub fn update_position(&mut self, id: &PositionId, update: PositionUpdate) -> bool {
        self.trading.update_position(id, update)
    }

    pub fn reset_account(&mut self) {
        self.trading.reset_account();
    }

    pub fn toggle_indicator(&mut self, id: &str) -> Result<bool, SessionError> {
        let enabled = self.catalog.toggle(id)?;
        self.persist_catalog()?;
        self.recompute();
        Ok(enabled)
    }

    pub fn set_indicator_param(
        &mut self,
        id: &str,
        key: &str,
        value: f64,
    ) -> Result<(), SessionError> {
        self.catalog
            .update_params(id, [(key.to_string(), value)].into_iter().collect())?;
        self.persist_catalog()?;
        self.recompute();
        Ok(())
    }

    fn persist_catalog(&self) -> Result<(), SessionError> {
        if let Some(store) = &self.store {
            self.catalog.save(store.as_ref())?;
        }
        Ok(())
    }

    fn recompute(&mut self) {
        let candles = self.replay.visible_candles();
        self.indicators = self.pipeline.compute(&candles, self.catalog.list());
    }

    /// Feed the newest visible close to the engine if it is newer than
    /// anything the engine has already seen.
    fn push_price(&mut self) -> Vec<Trade> {
        let Some(latest) = self.replay.latest() else {
            return Vec::new();
        };
        if self.trading.last_time().is_some_and(|last| latest.time <= last) {
            return Vec::new();
        }
        self.trading.update_price(latest.close, latest.time)
    }
}

/// Messages accepted by the session thread.
#[derive(Debug)]
pub enum SessionCommand {
    Play,
    Pause,
    StepForward(usize),
    StepBackward(usize),
    Seek(usize),
    Reset,
    SetSpeed(f64),
    SetTimeframe(Timeframe),
    OpenPosition {
        side: PositionSide,
        size: f64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
        reply: Sender<Result<PositionId, SessionError>>,
    },
    ClosePosition(PositionId),
    CloseAll,
    UpdatePosition(PositionId, PositionUpdate),
    ResetAccount,
    ToggleIndicator(String),
    Snapshot(Sender<SessionSnapshot>),
    /// Sent by the ticker thread only.
    Tick { generation: u64 },
    Shutdown,
}

/// Client side of a running session thread.
pub struct SessionHandle {
    tx: Sender<SessionCommand>,
    join: Option<JoinHandle<Session>>,
}

impl SessionHandle {
    pub fn spawn(session: Session) -> Result<Self, SessionError> {
        let (tx, rx) = mpsc::channel();
        let ticker_tx = tx.clone();
        let join = thread::Builder::new()
            .name("replaylab-session".into())
            .spawn(move || SessionActor::new(session, ticker_tx).run(rx))
            .map_err(SessionError::Spawn)?;
        Ok(Self {
            tx,
            join: Some(join),
        })
    }

    pub fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.tx.send(command).map_err(|_| SessionError::Closed)
    }

    pub fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply, rx) = mpsc::channel();
        self.send(SessionCommand::Snapshot(reply))?;
        rx.recv().map_err(|_| SessionError::Closed)
    }

    pub fn open_position(
        &self,
        side: PositionSide,
        size: f64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<PositionId, SessionError> {
        let (reply, rx) = mpsc::channel();
        self.send(SessionCommand::OpenPosition {
            side,
            size,
            stop_loss,
            take_profit,
            reply,
        })?;
        rx.recv().map_err(|_| SessionError::Closed)?
    }

    /// Stop the session thread and take back its state.
    pub fn shutdown(mut self) -> Result<Session, SessionError> {
        let _ = self.tx.send(SessionCommand::Shutdown);
        let join = self.join.take().ok_or(SessionError::Closed)?;
        join.join().map_err(|_| SessionError::Closed)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            let _ = self.tx.send(SessionCommand::Shutdown);
            let _ = join.join();
        }
    }
}

struct SessionActor {
    session: Session,
    tx: Sender<SessionCommand>,
    generation: u64,
    cancel: Option<Arc<AtomicBool>>,
}

impl SessionActor {
    fn new(session: Session, tx: Sender<SessionCommand>) -> Self {
        Self {
            session,
            tx,
            generation: 0,
            cancel: None,
        }
    }

    fn run(mut self, rx: Receiver<SessionCommand>) -> Session {
        loop {
            match rx.recv() {
                Ok(SessionCommand::Shutdown) | Err(_) => break,
                Ok(cmd) => self.handle(cmd),
            }
        }
        self.stop_ticker();
        info!("session thread stopped");
        self.session
    }

    fn handle(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Play => {
                self.session.play();
                if self.session.replay().is_playing() && self.cancel.is_none() {
                    self.start_ticker();
                }
            }
            SessionCommand::Pause => {
                self.stop_ticker();
                self.session.pause();
            }
            SessionCommand::Reset => {
                self.stop_ticker();
                self.session.reset();
            }
            SessionCommand::SetTimeframe(tf) => {
                self.stop_ticker();
                if let Err(e) = self.session.set_timeframe(tf) {
                    warn!(error = %e, "timeframe change rejected");
                }
            }
            SessionCommand::SetSpeed(speed) => {
                self.session.set_speed(speed);
                if self.session.replay().is_playing() {
                    self.stop_ticker();
                    self.start_ticker();
                }
            }
            SessionCommand::Tick { generation } => {
                if generation != self.generation || !self.session.replay().is_playing() {
                    debug!(generation, current = self.generation, "stale tick dropped");
                    return;
                }
                self.session.tick();
            }
            SessionCommand::StepForward(n) => {
                self.session.step_forward(n);
            }
            SessionCommand::StepBackward(n) => self.session.step_backward(n),
            SessionCommand::Seek(i) => {
                self.session.seek(i);
            }
            SessionCommand::OpenPosition {
                side,
                size,
                stop_loss,
                take_profit,
                reply,
            } => {
                let result = self.session.open_position(side, size, stop_loss, take_profit);
                let _ = reply.send(result);
            }
            SessionCommand::ClosePosition(id) => {
                self.session.close_position(&id);
            }
            SessionCommand::CloseAll => {
                self.session.close_all();
            }
            SessionCommand::UpdatePosition(id, update) => {
                self.session.update_position(&id, update);
            }
            SessionCommand::ResetAccount => self.session.reset_account(),
            SessionCommand::ToggleIndicator(id) => {
                if let Err(e) = self.session.toggle_indicator(&id) {
                    warn!(error = %e, %id, "indicator toggle failed");
                }
            }
            SessionCommand::Snapshot(reply) => {
                let _ = reply.send(self.session.snapshot());
            }
            SessionCommand::Shutdown => {}
        }
    }

    fn start_ticker(&mut self) {
        self.generation += 1;
        let cancel = Arc::new(AtomicBool::new(false));
        let interval = self.session.replay().tick_interval();
        match spawn_ticker(self.tx.clone(), self.generation, interval, Arc::clone(&cancel)) {
            Ok(_) => {
                debug!(generation = self.generation, ?interval, "ticker started");
                self.cancel = Some(cancel);
            }
            Err(e) => {
                warn!(error = %e, "failed to start ticker, pausing");
                self.session.pause();
            }
        }
    }

    fn stop_ticker(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.store(true, Ordering::Relaxed);
            self.generation += 1;
        }
    }
}

/// Sends `Tick { generation }` every `interval` until cancelled or the
/// session is gone. The thread is detached.
fn spawn_ticker(
    tx: Sender<SessionCommand>,
    generation: u64,
    interval: Duration,
    cancel: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("replaylab-ticker-{generation}"))
        .spawn(move || loop {
            thread::sleep(interval);
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            if tx.send(SessionCommand::Tick { generation }).is_err() {
                break;
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryStore;
    use crate::replay::ReplaySettings;

    fn candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 1.1 + 0.001 * i as f64;
                Candle::new(
                    1_700_000_000 + i as i64 * 60,
                    close,
                    close + 0.0005,
                    close - 0.0005,
                    close,
                    100.0,
                )
            })
            .collect()
    }

    fn session(n: usize) -> Session {
        let replay = ReplayController::new(ReplaySettings::default(), candles(n), Timeframe::M1);
        Session::new(replay, TradingEngine::default(), IndicatorCatalog::default_catalog())
    }

    #[test]
    fn open_requires_a_price() {
        let mut s = Session::new(
            ReplayController::new(ReplaySettings::default(), Vec::new(), Timeframe::M1),
            TradingEngine::default(),
            IndicatorCatalog::default_catalog(),
        );
        assert!(matches!(
            s.open_position(PositionSide::Long, 1.0, None, None),
            Err(SessionError::NoPrice)
        ));
        assert!(matches!(
            session(3).open_position(PositionSide::Long, 0.0, None, None),
            Err(SessionError::InvalidOrder(_))
        ));
    }

    #[test]
    fn forward_steps_drive_take_profit() {
        let mut s = session(50);
        s.seek(10);
        let entry = s.replay().latest().unwrap().close;
        // Prices rise 0.001 per candle; take profit two candles up.
        s.open_position(PositionSide::Long, 1.0, None, Some(entry + 0.0015)).unwrap();
        assert!(s.step_forward(1).is_empty());
        let trades = s.step_forward(1);
        assert_eq!(trades.len(), 1);
        assert_eq!(s.trading().positions().len(), 0);
    }

    #[test]
    fn step_backward_does_not_reprice() {
        let mut s = session(50);
        s.seek(20);
        s.open_position(PositionSide::Short, 1.0, Some(2.0), None).unwrap();
        let price = s.trading().current_price();
        s.step_backward(15);
        assert_eq!(s.trading().current_price(), price);
        assert_eq!(s.trading().positions().len(), 1);
        assert_eq!(s.snapshot().candles.len(), 6);
    }

    #[test]
    fn play_from_idle_shows_a_consistent_view() {
        let mut s = session(60);
        assert_eq!(s.indicators().line("volume", "volume").unwrap().points.len(), 60);

        s.play();
        let snap = s.snapshot();
        assert_eq!(snap.candles.len(), 1);
        for line in &snap.indicators.lines {
            assert!(line.points.len() <= snap.candles.len(), "{}", line.indicator_id);
        }
        assert_eq!(snap.indicators.line("volume", "volume").unwrap().points.len(), 1);
        assert_eq!(snap.trading.current_price, Some(snap.candles[0].close));
    }

    #[test]
    fn seek_back_keeps_stops_in_time_order() {
        let mut s = session(60);
        s.seek(50);
        let entry = s.replay().latest().unwrap();
        s.open_position(PositionSide::Long, 1.0, Some(entry.close - 0.01), None)
            .unwrap();

        assert!(s.seek(10).is_empty());
        assert_eq!(s.trading().positions().len(), 1);
        assert_eq!(s.trading().current_price(), Some(entry.close));
        assert_eq!(s.snapshot().candles.len(), 11);

        // Catching back up to the entry candle is not new information either.
        assert!(s.step_forward(40).is_empty());
        assert_eq!(s.trading().last_time(), Some(entry.time));
        s.step_forward(1);
        assert!(s.trading().last_time() > Some(entry.time));
        assert!(s.trading().trades().is_empty());
    }

    #[test]
    fn timeframe_change_does_not_rewind_the_engine() {
        let mut s = session(240);
        s.seek(200);
        let entry = s.replay().latest().unwrap();
        s.open_position(PositionSide::Long, 1.0, Some(entry.close - 0.01), None)
            .unwrap();

        let trades = s.set_timeframe(Timeframe::M15).unwrap();
        assert!(trades.is_empty());
        assert_eq!(s.replay().cursor(), Some(0));
        assert_eq!(s.trading().positions().len(), 1);
        assert_eq!(s.trading().last_time(), Some(entry.time));
        assert!(s.trading().trades().iter().all(|t| t.exit_time >= t.entry_time));
    }

    #[test]
    fn indicators_follow_visible_candles() {
        let mut s = session(60);
        s.seek(29);
        let rsi = s.indicators().line("rsi", "value").unwrap();
        assert_eq!(rsi.points.len(), 30 - 14);
        s.step_backward(10);
        let rsi = s.indicators().line("rsi", "value").unwrap();
        assert_eq!(rsi.points.len(), 20 - 14);
    }

    #[test]
    fn toggle_persists_through_store() {
        let store = MemoryStore::new();
        let mut s = session(30).with_store(Box::new(store.clone()));
        assert!(s.toggle_indicator("sma").unwrap());
        let saved = IndicatorCatalog::load(&store).unwrap();
        assert!(saved.get("sma").unwrap().enabled);
        assert!(s.indicators().line("sma", "value").is_some());
    }

    #[test]
    fn actor_steps_and_snapshots() {
        let handle = SessionHandle::spawn(session(40)).unwrap();
        handle.send(SessionCommand::StepForward(5)).unwrap();
        let id = handle.open_position(PositionSide::Long, 1.0, None, None).unwrap();
        let snap = handle.snapshot().unwrap();
        assert_eq!(snap.replay.cursor, Some(4));
        assert_eq!(snap.trading.positions[0].id, id);

        let session = handle.shutdown().unwrap();
        assert_eq!(session.replay().mode(), PlaybackMode::Paused);
    }

    #[test]
    fn actor_drops_stale_ticks() {
        let handle = SessionHandle::spawn(session(40)).unwrap();
        handle.send(SessionCommand::StepForward(1)).unwrap();
        handle.send(SessionCommand::Tick { generation: 99 }).unwrap();
        assert_eq!(handle.snapshot().unwrap().replay.cursor, Some(0));
    }
}
