use std::time::Duration;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{MAX_SPEED, MIN_SPEED};
use crate::aggregate::aggregate;
use crate::domain::{validate_series, Candle, Timeframe, TimeframeError};
use crate::rng::SeedHierarchy;
use crate::synthetic::{SyntheticGenerator, DEFAULT_WINDOW};

/// Most synthetic candles a single forward step may generate.
pub const MAX_SYNTHETIC_STEP: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    Idle,
    Playing,
    Paused,
}

/// Construction-time parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaySettings {
    /// Instrument label; feeds synthetic seed derivation.
    pub symbol: String,
    /// Tick period at 1x speed.
    pub base_interval: Duration,
    pub speed: f64,
    /// Trailing window for synthetic candle statistics.
    pub window: usize,
    pub seed: u64,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            symbol: "EUR/USD".to_string(),
            base_interval: Duration::from_millis(1000),
            speed: 1.0,
            window: DEFAULT_WINDOW,
            seed: 42,
        }
    }
}

/// Point-in-time view of the controller, cheap to clone and send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayStatus {
    pub mode: PlaybackMode,
    /// `None` while idle.
    pub cursor: Option<usize>,
    pub timeframe: Timeframe,
    pub speed: f64,
    pub is_live: bool,
    pub progress: f64,
    pub visible_len: usize,
    pub historical_len: usize,
    pub synthetic_cached: usize,
}

#[derive(Debug, Clone)]
pub struct ReplayController {
    symbol: String,
    base: Vec<Candle>,
    base_timeframe: Timeframe,
    timeframe: Timeframe,
    /// `base` aggregated to `timeframe`.
    historical: Vec<Candle>,
    /// Generated candles following `historical`, kept across backward steps.
    synthetic: Vec<Candle>,
    mode: PlaybackMode,
    cursor: usize,
    speed: f64,
    base_interval: Duration,
    seeds: SeedHierarchy,
    epoch: u64,
    generator: SyntheticGenerator<StdRng>,
}

impl ReplayController {
    pub fn new(settings: ReplaySettings, candles: Vec<Candle>, base_timeframe: Timeframe) -> Self {
        let seeds = SeedHierarchy::new(settings.seed);
        let generator = SyntheticGenerator::new(
            seeds.rng_for(&settings.symbol, base_timeframe, 0),
            settings.window,
        );
        if let Err(e) = validate_series(&candles) {
            warn!(error = %e, "history failed validation");
        }
        Self {
            symbol: settings.symbol,
            historical: candles.clone(),
            base: candles,
            base_timeframe,
            timeframe: base_timeframe,
            synthetic: Vec::new(),
            mode: PlaybackMode::Idle,
            cursor: 0,
            speed: clamp_speed(settings.speed).unwrap_or(1.0),
            base_interval: settings.base_interval,
            seeds,
            epoch: 0,
            generator,
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn is_playing(&self) -> bool {
        self.mode == PlaybackMode::Playing
    }

    /// Cursor position, or `None` while idle.
    pub fn cursor(&self) -> Option<usize> {
        (self.mode != PlaybackMode::Idle).then_some(self.cursor)
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn base_timeframe(&self) -> Timeframe {
        self.base_timeframe
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn historical(&self) -> &[Candle] {
        &self.historical
    }

    pub fn synthetic_cached(&self) -> usize {
        self.synthetic.len()
    }

    /// True once the cursor has moved past the end of history.
    pub fn is_live(&self) -> bool {
        self.mode != PlaybackMode::Idle && self.cursor >= self.historical.len()
    }

    /// Timer period at the current speed.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(self.base_interval.as_secs_f64() / self.speed)
    }

    pub fn visible_len(&self) -> usize {
        match self.mode {
            PlaybackMode::Idle => self.historical.len(),
            _ => self.cursor + 1,
        }
    }

    /// Candles up to and including the cursor; all of history while idle.
    pub fn visible_candles(&self) -> Vec<Candle> {
        if self.mode == PlaybackMode::Idle {
            return self.historical.clone();
        }
        let hist_end = (self.cursor + 1).min(self.historical.len());
        let synth_end = (self.cursor + 1).saturating_sub(self.historical.len());
        let mut visible = Vec::with_capacity(self.cursor + 1);
        visible.extend_from_slice(&self.historical[..hist_end]);
        visible.extend_from_slice(&self.synthetic[..synth_end]);
        visible
    }

    /// Newest visible candle.
    pub fn latest(&self) -> Option<Candle> {
        if self.mode == PlaybackMode::Idle {
            return self.historical.last().copied();
        }
        self.candle_at(self.cursor)
    }

    /// 0 while idle, 100 once live.
    pub fn progress(&self) -> f64 {
        if self.mode == PlaybackMode::Idle || self.historical.is_empty() {
            return 0.0;
        }
        if self.is_live() {
            return 100.0;
        }
        (self.visible_len() as f64 / self.historical.len() as f64 * 100.0).min(100.0)
    }

    pub fn status(&self) -> ReplayStatus {
        ReplayStatus {
            mode: self.mode,
            cursor: self.cursor(),
            timeframe: self.timeframe,
            speed: self.speed,
            is_live: self.is_live(),
            progress: self.progress(),
            visible_len: self.visible_len(),
            historical_len: self.historical.len(),
            synthetic_cached: self.synthetic.len(),
        }
    }

    pub fn play(&mut self) {
        if !self.has_history("play") {
            return;
        }
        match self.mode {
            PlaybackMode::Idle => {
                self.cursor = 0;
                self.set_mode(PlaybackMode::Playing);
            }
            PlaybackMode::Paused => self.set_mode(PlaybackMode::Playing),
            PlaybackMode::Playing => {}
        }
    }

    pub fn pause(&mut self) {
        if self.mode == PlaybackMode::Playing {
            self.set_mode(PlaybackMode::Paused);
        }
    }

    /// One timer tick: advance by one candle while playing.
    pub fn tick(&mut self) -> bool {
        if self.mode != PlaybackMode::Playing {
            return false;
        }
        self.step_forward(1);
        true
    }

    /// Advance `n` candles, generating synthetic ones past the end of history.
    ///
    /// From idle this enters paused at cursor 0, which counts as the first step.
    pub fn step_forward(&mut self, n: usize) {
        if n == 0 || !self.has_history("step forward") {
            return;
        }
        let n = if self.mode == PlaybackMode::Idle {
            self.cursor = 0;
            self.set_mode(PlaybackMode::Paused);
            n - 1
        } else {
            n
        };
        let limit = self.historical.len() + self.synthetic.len() - 1 + MAX_SYNTHETIC_STEP;
        let target = self.cursor.saturating_add(n);
        if target > limit {
            warn!(requested = n, limit, "forward step clamped");
        }
        self.cursor = target.min(limit);
        self.ensure_synthetic();
        debug!(cursor = self.cursor, live = self.is_live(), "stepped forward");
    }

    /// Retreat `n` candles, clamped at 0. The synthetic cache is kept.
    pub fn step_backward(&mut self, n: usize) {
        if !self.has_history("step backward") {
            return;
        }
        if self.mode == PlaybackMode::Idle {
            self.cursor = 0;
            self.set_mode(PlaybackMode::Paused);
        }
        self.cursor = self.cursor.saturating_sub(n);
        debug!(cursor = self.cursor, "stepped backward");
    }

    /// Jump to a historical index, dropping any synthetic overflow.
    pub fn seek(&mut self, index: usize) {
        if !self.has_history("seek") {
            return;
        }
        if self.mode == PlaybackMode::Idle {
            self.set_mode(PlaybackMode::Paused);
        }
        self.cursor = index.min(self.historical.len() - 1);
        self.synthetic.clear();
        debug!(cursor = self.cursor, "seek");
    }

    /// Back to idle with a fresh synthetic stream.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.synthetic.clear();
        self.epoch += 1;
        self.reseed();
        self.set_mode(PlaybackMode::Idle);
    }

    /// Clamp into `[MIN_SPEED, MAX_SPEED]`. Non-finite values are ignored.
    pub fn set_speed(&mut self, multiplier: f64) {
        if let Some(speed) = clamp_speed(multiplier) {
            self.speed = speed;
            debug!(speed, "speed changed");
        }
    }

    /// Re-aggregate to `timeframe`. While playing or paused the replay
    /// restarts paused at cursor 0.
    pub fn set_timeframe(&mut self, timeframe: Timeframe) -> Result<(), TimeframeError> {
        self.historical = aggregate(&self.base, self.base_timeframe, timeframe)?;
        self.timeframe = timeframe;
        self.synthetic.clear();
        self.cursor = 0;
        self.reseed();
        if self.mode != PlaybackMode::Idle {
            if self.historical.is_empty() {
                self.set_mode(PlaybackMode::Idle);
            } else {
                self.set_mode(PlaybackMode::Paused);
            }
        }
        info!(%timeframe, candles = self.historical.len(), "timeframe changed");
        Ok(())
    }

    /// Swap in a new backing series and reset. The current timeframe is kept
    /// when the new base can be aggregated to it.
    pub fn replace_history(&mut self, candles: Vec<Candle>, base_timeframe: Timeframe) {
        if let Err(e) = validate_series(&candles) {
            warn!(error = %e, "history failed validation");
        }
        self.base = candles;
        self.base_timeframe = base_timeframe;
        self.historical = match aggregate(&self.base, base_timeframe, self.timeframe) {
            Ok(aggregated) => aggregated,
            Err(e) => {
                warn!(error = %e, "keeping base timeframe");
                self.timeframe = base_timeframe;
                self.base.clone()
            }
        };
        info!(candles = self.historical.len(), timeframe = %self.timeframe, "history replaced");
        self.reset();
    }

    fn candle_at(&self, index: usize) -> Option<Candle> {
        match index.checked_sub(self.historical.len()) {
            None => self.historical.get(index).copied(),
            Some(i) => self.synthetic.get(i).copied(),
        }
    }

    /// Generate synthetic candles until the cursor is covered.
    fn ensure_synthetic(&mut self) {
        let needed = (self.cursor + 1).saturating_sub(self.historical.len());
        let step = self.timeframe.seconds();
        while self.synthetic.len() < needed {
            let window = self.trailing(self.generator.window());
            let Some(candle) = self.generator.next(&window, step) else {
                break;
            };
            self.synthetic.push(candle);
        }
        if self.synthetic.len() < needed {
            self.cursor = self.historical.len() + self.synthetic.len() - 1;
        }
    }

    /// Last `len` candles of history + synthetic cache.
    fn trailing(&self, len: usize) -> Vec<Candle> {
        let total = self.historical.len() + self.synthetic.len();
        let start = total.saturating_sub(len);
        (start..total).filter_map(|i| self.candle_at(i)).collect()
    }

    fn reseed(&mut self) {
        let rng = self.seeds.rng_for(&self.symbol, self.timeframe, self.epoch);
        self.generator = SyntheticGenerator::new(rng, self.generator.window());
    }

    fn has_history(&self, op: &str) -> bool {
        if self.historical.is_empty() {
            warn!(op, "no candles loaded, ignoring");
            return false;
        }
        true
    }

    fn set_mode(&mut self, mode: PlaybackMode) {
        if self.mode != mode {
            info!(from = ?self.mode, to = ?mode, cursor = self.cursor, "playback mode");
            self.mode = mode;
        }
    }
}

fn clamp_speed(multiplier: f64) -> Option<f64> {
    multiplier
        .is_finite()
        .then(|| multiplier.clamp(MIN_SPEED, MAX_SPEED))
}
