//! Summary statistics over the closed-trade ledger.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::Trade;

/// Gross profit / gross loss, with a sentinel when there were no losses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ProfitFactor {
    Value(f64),
    Infinite,
}

impl fmt::Display for ProfitFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfitFactor::Value(v) => write!(f, "{v:.2}"),
            ProfitFactor::Infinite => f.write_str("∞"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub count: usize,
    pub wins: usize,
    pub losses: usize,
    /// Fraction of trades with positive pnl, 0.0 for an empty ledger.
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_pnl: f64,
    pub best_pnl: Option<f64>,
    pub worst_pnl: Option<f64>,
    pub profit_factor: ProfitFactor,
}

impl TradeStats {
    pub fn from_trades(trades: &[Trade]) -> Self {
        let count = trades.len();
        let wins = trades.iter().filter(|t| t.pnl > 0.0).count();
        let losses = trades.iter().filter(|t| t.pnl < 0.0).count();
        let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();

        let gross_profit: f64 = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
        let gross_loss: f64 = trades
            .iter()
            .filter(|t| t.pnl < 0.0)
            .map(|t| t.pnl.abs())
            .sum();

        let profit_factor = if gross_loss > 0.0 {
            ProfitFactor::Value(gross_profit / gross_loss)
        } else if gross_profit > 0.0 {
            ProfitFactor::Infinite
        } else {
            ProfitFactor::Value(0.0)
        };

        let (win_rate, avg_pnl) = if count == 0 {
            (0.0, 0.0)
        } else {
            (wins as f64 / count as f64, total_pnl / count as f64)
        };

        Self {
            count,
            wins,
            losses,
            win_rate,
            total_pnl,
            avg_pnl,
            best_pnl: trades.iter().map(|t| t.pnl).reduce(f64::max),
            worst_pnl: trades.iter().map(|t| t.pnl).reduce(f64::min),
            profit_factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExitReason, PositionId, PositionSide, TradeId};

    fn make_trade(pnl: f64) -> Trade {
        Trade {
            id: TradeId::new("trade-1"),
            position_id: PositionId::new("pos-1"),
            side: PositionSide::Long,
            entry_price: 1.0,
            exit_price: 1.0,
            size: 1.0,
            pnl,
            entry_time: 0,
            exit_time: 60,
            reason: ExitReason::Manual,
        }
    }

    #[test]
    fn empty_ledger() {
        let stats = TradeStats::from_trades(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.win_rate, 0.0);
        assert_eq!(stats.best_pnl, None);
        assert_eq!(stats.profit_factor, ProfitFactor::Value(0.0));
    }

    #[test]
    fn mixed_ledger() {
        let trades = vec![make_trade(500.0), make_trade(-200.0), make_trade(300.0)];
        let stats = TradeStats::from_trades(&trades);
        assert_eq!(stats.wins, 2);
        assert_eq!(stats.losses, 1);
        assert!((stats.win_rate - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(stats.total_pnl, 600.0);
        assert_eq!(stats.avg_pnl, 200.0);
        assert_eq!(stats.best_pnl, Some(500.0));
        assert_eq!(stats.worst_pnl, Some(-200.0));
        assert_eq!(stats.profit_factor, ProfitFactor::Value(4.0));
    }

    #[test]
    fn all_winners_is_infinite() {
        let stats = TradeStats::from_trades(&[make_trade(10.0), make_trade(5.0)]);
        assert_eq!(stats.profit_factor, ProfitFactor::Infinite);
        assert_eq!(stats.profit_factor.to_string(), "∞");
    }
}
