//! Recompute every enabled catalog indicator over the visible candles.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{
    to_points, Atr, Bollinger, BollingerBand, Ema, Indicator, IndicatorPoint, Macd, MacdLine,
    Rsi, Sma, Stochastic, StochasticLine, VolumeLine, VolumeStats,
};
use crate::catalog::{IndicatorConfig, Placement};
use crate::domain::Candle;

/// One drawable line of one catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorLine {
    /// Catalog id of the entry that produced the line.
    pub indicator_id: String,
    /// Line within the indicator ("value" for single-line indicators).
    pub line: String,
    pub placement: Placement,
    pub points: Vec<IndicatorPoint>,
}

/// All lines for one candle set, in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub lines: Vec<IndicatorLine>,
}

impl IndicatorSnapshot {
    pub fn overlays(&self) -> impl Iterator<Item = &IndicatorLine> {
        self.lines
            .iter()
            .filter(|l| l.placement == Placement::Overlay)
    }

    pub fn separate(&self) -> impl Iterator<Item = &IndicatorLine> {
        self.lines
            .iter()
            .filter(|l| l.placement == Placement::Separate)
    }

    pub fn line(&self, indicator_id: &str, line: &str) -> Option<&IndicatorLine> {
        self.lines
            .iter()
            .find(|l| l.indicator_id == indicator_id && l.line == line)
    }

    /// Most recent value of a line, if it has left warmup.
    pub fn latest(&self, indicator_id: &str, line: &str) -> Option<f64> {
        self.line(indicator_id, line)
            .and_then(|l| l.points.last())
            .map(|p| p.value)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

type NamedIndicator = (&'static str, Box<dyn Indicator>);

fn named<I: Indicator + 'static>(label: &'static str, indicator: I) -> NamedIndicator {
    (label, Box::new(indicator) as Box<dyn Indicator>)
}

/// Stateless: every call rebuilds the indicators from their configs.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorPipeline;

impl IndicatorPipeline {
    pub fn new() -> Self {
        Self
    }

    /// Indicator instances for one catalog entry, or `None` for an unknown name.
    pub fn build(config: &IndicatorConfig) -> Option<Vec<NamedIndicator>> {
        let built: Vec<NamedIndicator> = match config.name.as_str() {
            "RSI" => vec![named("value", Rsi::new(config.period("period", 14)))],
            "EMA" => vec![named("value", Ema::new(config.period("period", 20)))],
            "SMA" => vec![named("value", Sma::new(config.period("period", 20)))],
            "ATR" => vec![named("value", Atr::new(config.period("period", 14)))],
            "MACD" => {
                let fast = config.period("fast", 12);
                let slow = config.period("slow", 26);
                let signal = config.period("signal", 9);
                MacdLine::ALL
                    .iter()
                    .map(|&line| named(line.label(), Macd::new(line, fast, slow, signal)))
                    .collect()
            }
            "Bollinger Bands" => {
                let period = config.period("period", 20);
                let mult = config
                    .param("std_dev")
                    .filter(|m| m.is_finite() && *m >= 0.0)
                    .unwrap_or(2.0);
                BollingerBand::ALL
                    .iter()
                    .map(|&band| named(band.label(), Bollinger::new(band, period, mult)))
                    .collect()
            }
            "Stochastic" => {
                let period = config.period("k_period", 14);
                let smooth = config.period("d_period", 3);
                StochasticLine::ALL
                    .iter()
                    .map(|&line| named(line.label(), Stochastic::new(line, period, smooth)))
                    .collect()
            }
            "Volume" => {
                let period = config.period("period", 20);
                VolumeLine::ALL
                    .iter()
                    .map(|&line| named(line.label(), VolumeStats::new(line, period)))
                    .collect()
            }
            _ => return None,
        };
        Some(built)
    }

    pub fn compute<'a, I>(&self, candles: &[Candle], configs: I) -> IndicatorSnapshot
    where
        I: IntoIterator<Item = &'a IndicatorConfig>,
    {
        let mut lines = Vec::new();
        for config in configs.into_iter().filter(|c| c.enabled) {
            let Some(indicators) = Self::build(config) else {
                warn!(id = %config.id, name = %config.name, "unknown indicator, skipped");
                continue;
            };
            for (label, indicator) in indicators {
                let values = indicator.compute(candles);
                lines.push(IndicatorLine {
                    indicator_id: config.id.clone(),
                    line: label.to_string(),
                    placement: config.kind,
                    points: to_points(candles, &values),
                });
            }
        }
        IndicatorSnapshot { lines }
    }
}
