//! Volume and its moving average.

use super::sma::sma_of_series;
use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeLine {
    Volume,
    Average,
}

impl VolumeLine {
    pub const ALL: [VolumeLine; 2] = [Self::Volume, Self::Average];

    pub fn label(self) -> &'static str {
        match self {
            Self::Volume => "volume",
            Self::Average => "average",
        }
    }
}

#[derive(Debug, Clone)]
pub struct VolumeStats {
    period: usize,
    line: VolumeLine,
    name: String,
}

impl VolumeStats {
    pub fn new(line: VolumeLine, period: usize) -> Self {
        assert!(period >= 1, "volume average period must be >= 1");
        let name = match line {
            VolumeLine::Volume => "volume".to_string(),
            VolumeLine::Average => format!("volume_sma_{period}"),
        };
        Self { period, line, name }
    }
}

impl Indicator for VolumeStats {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        match self.line {
            VolumeLine::Volume => 0,
            VolumeLine::Average => self.period - 1,
        }
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
        match self.line {
            VolumeLine::Volume => volumes,
            VolumeLine::Average => sma_of_series(&volumes, self.period),
        }
    }
}
