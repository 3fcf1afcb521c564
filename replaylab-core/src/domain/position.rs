//! Open leveraged position with optional stop-loss / take-profit bounds.

use super::ids::PositionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => f.write_str("long"),
            PositionSide::Short => f.write_str("short"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub side: PositionSide,
    pub entry_price: f64,
    /// Lot units.
    pub size: f64,
    pub entry_time: i64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.side == PositionSide::Long
    }

    pub fn is_short(&self) -> bool {
        self.side == PositionSide::Short
    }

    /// Signed price move in the position's favour.
    pub fn price_diff(&self, price: f64) -> f64 {
        match self.side {
            PositionSide::Long => price - self.entry_price,
            PositionSide::Short => self.entry_price - price,
        }
    }

    /// PnL if the position were settled at `price`.
    pub fn pnl_at(&self, price: f64, leverage: f64) -> f64 {
        self.price_diff(price) * self.size * leverage
    }

    /// Reward-to-risk ratio implied by the current bounds.
    ///
    /// `None` unless both bounds are set.
    pub fn risk_reward(&self) -> Option<RiskReward> {
        let stop = self.stop_loss?;
        let target = self.take_profit?;
        let risk = (self.entry_price - stop).abs();
        let reward = (target - self.entry_price).abs();
        Some(RiskReward::from_distances(reward, risk))
    }

    pub fn apply(&mut self, update: &PositionUpdate) {
        update.stop_loss.apply_to(&mut self.stop_loss);
        update.take_profit.apply_to(&mut self.take_profit);
    }
}

/// Reward/risk ratio with an explicit sentinel for a zero-risk denominator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RiskReward {
    Ratio(f64),
    Infinite,
}

impl RiskReward {
    pub fn from_distances(reward: f64, risk: f64) -> Self {
        if risk == 0.0 {
            RiskReward::Infinite
        } else {
            RiskReward::Ratio(reward / risk)
        }
    }
}

impl fmt::Display for RiskReward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskReward::Ratio(r) => write!(f, "1:{r:.2}"),
            RiskReward::Infinite => f.write_str("1:∞"),
        }
    }
}

/// Edit to a single protective bound.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum BoundChange {
    #[default]
    Keep,
    Set(f64),
    Clear,
}

impl BoundChange {
    fn apply_to(self, bound: &mut Option<f64>) {
        match self {
            BoundChange::Keep => {}
            BoundChange::Set(price) => *bound = Some(price),
            BoundChange::Clear => *bound = None,
        }
    }
}

/// Bound edits from a chart drag or panel edit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub stop_loss: BoundChange,
    pub take_profit: BoundChange,
}

impl PositionUpdate {
    pub fn stop_loss(price: f64) -> Self {
        Self {
            stop_loss: BoundChange::Set(price),
            ..Self::default()
        }
    }

    pub fn take_profit(price: f64) -> Self {
        Self {
            take_profit: BoundChange::Set(price),
            ..Self::default()
        }
    }
}
