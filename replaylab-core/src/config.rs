//! Session configuration, loaded from TOML. Every field has a default, so an
//! empty file is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{CandleRequest, Timespan};
use crate::domain::Timeframe;
use crate::replay::{ReplaySettings, MAX_SPEED, MIN_SPEED};
use crate::rng::SeedHierarchy;
use crate::synthetic::DEFAULT_WINDOW;
use crate::trading::AccountConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Instrument, e.g. `EUR/USD` or `BTC/USD`.
    pub pair: String,
    /// Resolution of the loaded candles.
    pub base_timeframe: Timeframe,
    /// Resolution the replay starts at; must aggregate from the base.
    pub initial_timeframe: Timeframe,
    pub playback: PlaybackConfig,
    pub account: AccountConfig,
    pub synthetic: SyntheticConfig,
    pub data: DataConfig,
    /// Where the indicator catalog is persisted. `None` keeps it in memory.
    pub catalog_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Milliseconds between ticks at 1x speed.
    pub base_interval_ms: u64,
    pub speed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub window: usize,
    /// `None` draws a fresh seed per run.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub csv_path: Option<PathBuf>,
    pub remote: Option<RemoteConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub base_url: Option<String>,
    pub multiplier: u32,
    pub timespan: Timespan,
    pub lookback_days: i64,
    pub stale_after_periods: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pair: "EUR/USD".to_string(),
            base_timeframe: Timeframe::H1,
            initial_timeframe: Timeframe::H1,
            playback: PlaybackConfig::default(),
            account: AccountConfig::default(),
            synthetic: SyntheticConfig::default(),
            data: DataConfig::default(),
            catalog_path: None,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: 1000,
            speed: 1.0,
        }
    }
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            seed: None,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_key_env: "POLYGON_API_KEY".to_string(),
            base_url: None,
            multiplier: 1,
            timespan: Timespan::Hour,
            lookback_days: 30,
            stale_after_periods: 3,
        }
    }
}

impl SessionConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_timeframe.ratio_to(self.base_timeframe).is_none() {
            return Err(ConfigError::Invalid(format!(
                "initial_timeframe {} cannot be built from base_timeframe {}",
                self.initial_timeframe, self.base_timeframe
            )));
        }
        if !self.pair.contains(['/', '-']) {
            return Err(ConfigError::Invalid(format!(
                "pair '{}' must look like BASE/QUOTE",
                self.pair
            )));
        }
        if self.playback.base_interval_ms == 0 {
            return Err(ConfigError::Invalid("base_interval_ms must be > 0".into()));
        }
        if !(MIN_SPEED..=MAX_SPEED).contains(&self.playback.speed) {
            return Err(ConfigError::Invalid(format!(
                "speed must be within [{MIN_SPEED}, {MAX_SPEED}]"
            )));
        }
        if self.synthetic.window == 0 {
            return Err(ConfigError::Invalid("synthetic window must be > 0".into()));
        }
        if !(self.account.initial_balance.is_finite() && self.account.initial_balance > 0.0) {
            return Err(ConfigError::Invalid("initial_balance must be > 0".into()));
        }
        if !(self.account.leverage.is_finite() && self.account.leverage > 0.0) {
            return Err(ConfigError::Invalid("leverage must be > 0".into()));
        }
        Ok(())
    }

    /// Seed hierarchy for synthetic candles.
    pub fn seeds(&self) -> SeedHierarchy {
        match self.synthetic.seed {
            Some(seed) => SeedHierarchy::new(seed),
            None => SeedHierarchy::from_entropy(),
        }
    }

    pub fn replay_settings(&self) -> ReplaySettings {
        ReplaySettings {
            symbol: self.pair.clone(),
            base_interval: Duration::from_millis(self.playback.base_interval_ms),
            speed: self.playback.speed,
            window: self.synthetic.window,
            seed: self.seeds().master_seed(),
        }
    }

    /// Remote request for the configured pair, if a remote block is present.
    pub fn candle_request(&self) -> Option<CandleRequest> {
        let remote = self.data.remote.as_ref()?;
        CandleRequest::from_pair(
            &self.pair,
            remote.multiplier,
            remote.timespan,
            remote.lookback_days,
        )
    }
}
