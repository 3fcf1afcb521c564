//! Chart timeframes and their relationship to the base data resolution.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Supported chart resolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1w")]
    W1,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeframeError {
    #[error("unsupported timeframe: {0}")]
    Unsupported(String),

    #[error("cannot aggregate {base} candles into {target}")]
    NotAggregatable { base: Timeframe, target: Timeframe },
}

impl Timeframe {
    pub const ALL: [Timeframe; 8] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
        Timeframe::W1,
    ];

    /// Bucket length in seconds.
    pub fn seconds(self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 5 * 60,
            Timeframe::M15 => 15 * 60,
            Timeframe::M30 => 30 * 60,
            Timeframe::H1 => 60 * 60,
            Timeframe::H4 => 4 * 60 * 60,
            Timeframe::D1 => 24 * 60 * 60,
            Timeframe::W1 => 7 * 24 * 60 * 60,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1w",
        }
    }

    /// How many `base` candles make up one candle of `self`.
    ///
    /// `None` when `self` is finer than `base` or not an exact multiple of it.
    pub fn ratio_to(self, base: Timeframe) -> Option<usize> {
        let (target, base) = (self.seconds(), base.seconds());
        if target < base || target % base != 0 {
            return None;
        }
        usize::try_from(target / base).ok()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        let timeframe = match normalized.as_str() {
            "1m" | "1min" => Timeframe::M1,
            "5m" | "5min" => Timeframe::M5,
            "15m" | "15min" => Timeframe::M15,
            "30m" | "30min" => Timeframe::M30,
            "1h" | "60m" | "1hour" => Timeframe::H1,
            "4h" | "4hour" => Timeframe::H4,
            "1d" | "d" | "1day" => Timeframe::D1,
            "1w" | "w" | "1week" => Timeframe::W1,
            _ => return Err(TimeframeError::Unsupported(value.to_string())),
        };
        Ok(timeframe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratios_between_common_resolutions() {
        assert_eq!(Timeframe::H4.ratio_to(Timeframe::H1), Some(4));
        assert_eq!(Timeframe::D1.ratio_to(Timeframe::H1), Some(24));
        assert_eq!(Timeframe::H1.ratio_to(Timeframe::H1), Some(1));
    }

    #[test]
    fn finer_target_has_no_ratio() {
        assert_eq!(Timeframe::M15.ratio_to(Timeframe::H1), None);
    }

    #[test]
    fn parse_accepts_aliases() {
        assert_eq!("4H".parse::<Timeframe>(), Ok(Timeframe::H4));
        assert_eq!("1day".parse::<Timeframe>(), Ok(Timeframe::D1));
        assert!("3h".parse::<Timeframe>().is_err());
    }

    #[test]
    fn serde_uses_labels() {
        let json = serde_json::to_string(&Timeframe::H4).unwrap();
        assert_eq!(json, "\"4h\"");
        let back: Timeframe = serde_json::from_str("\"1d\"").unwrap();
        assert_eq!(back, Timeframe::D1);
    }
}
