//! Trading engine: a reducer over [`TradingState`].
//!
//! Every operation runs to completion and leaves the accounting identity
//! `equity == balance + Σ unrealized pnl` intact. Nothing here fails: unknown
//! position ids are ignored.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::stats::TradeStats;
use crate::domain::{
    ExitReason, IdGenerator, Position, PositionId, PositionSide, PositionUpdate, Trade,
};

/// Account parameters applied on construction and on every reset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub initial_balance: f64,
    /// Multiplier on raw price-difference PnL.
    pub leverage: f64,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            leverage: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingState {
    pub balance: f64,
    pub equity: f64,
    /// Open positions in the order they were opened.
    pub positions: Vec<Position>,
    /// Closed trades, oldest first.
    pub trades: Vec<Trade>,
    /// Last price seen by the engine; `None` until the first price arrives.
    pub current_price: Option<f64>,
    /// Time of the newest price the engine has processed.
    #[serde(default)]
    pub last_time: Option<i64>,
}

impl TradingState {
    fn fresh(balance: f64) -> Self {
        Self {
            balance,
            equity: balance,
            positions: Vec::new(),
            trades: Vec::new(),
            current_price: None,
            last_time: None,
        }
    }

    /// Σ unrealized pnl of open positions at `current_price`.
    pub fn unrealized_pnl(&self, leverage: f64) -> f64 {
        match self.current_price {
            Some(price) => self.positions.iter().map(|p| p.pnl_at(price, leverage)).sum(),
            None => 0.0,
        }
    }
}

/// Which bound, if any, `price` breaches. Stop-loss wins over take-profit.
fn triggered(position: &Position, price: f64) -> Option<(f64, ExitReason)> {
    let (sl_hit, tp_hit) = match position.side {
        PositionSide::Long => (
            position.stop_loss.is_some_and(|sl| price <= sl),
            position.take_profit.is_some_and(|tp| price >= tp),
        ),
        PositionSide::Short => (
            position.stop_loss.is_some_and(|sl| price >= sl),
            position.take_profit.is_some_and(|tp| price <= tp),
        ),
    };

    if sl_hit {
        position.stop_loss.map(|sl| (sl, ExitReason::StopLoss))
    } else if tp_hit {
        position.take_profit.map(|tp| (tp, ExitReason::TakeProfit))
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct TradingEngine {
    config: AccountConfig,
    state: TradingState,
    ids: IdGenerator,
}

impl TradingEngine {
    pub fn new(config: AccountConfig) -> Self {
        Self {
            config,
            state: TradingState::fresh(config.initial_balance),
            ids: IdGenerator::new(),
        }
    }

    pub fn config(&self) -> &AccountConfig {
        &self.config
    }

    pub fn state(&self) -> &TradingState {
        &self.state
    }

    pub fn balance(&self) -> f64 {
        self.state.balance
    }

    pub fn equity(&self) -> f64 {
        self.state.equity
    }

    pub fn positions(&self) -> &[Position] {
        &self.state.positions
    }

    pub fn trades(&self) -> &[Trade] {
        &self.state.trades
    }

    pub fn current_price(&self) -> Option<f64> {
        self.state.current_price
    }

    pub fn last_time(&self) -> Option<i64> {
        self.state.last_time
    }

    pub fn position(&self, id: &PositionId) -> Option<&Position> {
        self.state.positions.iter().find(|p| &p.id == id)
    }

    pub fn stats(&self) -> TradeStats {
        TradeStats::from_trades(&self.state.trades)
    }

    /// Open a position at `price`. Balance is unchanged; the position's
    /// unrealized pnl starts at zero.
    pub fn open_position(
        &mut self,
        side: PositionSide,
        size: f64,
        price: f64,
        time: i64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> PositionId {
        let id = self.ids.next_position();
        info!(%id, %side, size, price, "position opened");
        self.state.positions.push(Position {
            id: id.clone(),
            side,
            entry_price: price,
            size,
            entry_time: time,
            stop_loss,
            take_profit,
        });
        self.state.current_price = Some(price);
        self.advance_clock(time);
        self.revalue();
        id
    }

    /// Mark every position at `price`, settling those whose bounds were hit.
    ///
    /// Triggered positions settle at the bound price, not at `price`.
    /// Prices older than the newest one already processed are ignored.
    pub fn update_price(&mut self, price: f64, time: i64) -> Vec<Trade> {
        if self.state.last_time.is_some_and(|last| time < last) {
            debug!(price, time, last = ?self.state.last_time, "out-of-order price ignored");
            return Vec::new();
        }
        self.state.current_price = Some(price);
        self.advance_clock(time);

        let mut closed = Vec::new();
        let mut remaining = Vec::with_capacity(self.state.positions.len());
        for position in std::mem::take(&mut self.state.positions) {
            match triggered(&position, price) {
                Some((exit_price, reason)) => {
                    closed.push(self.settle(position, exit_price, time, reason));
                }
                None => remaining.push(position),
            }
        }
        self.state.positions = remaining;
        self.revalue();

        debug!(price, time, closed = closed.len(), equity = self.state.equity, "price update");
        closed
    }

    /// Manually close one position. Unknown ids return `None`.
    pub fn close_position(
        &mut self,
        id: &PositionId,
        exit_price: f64,
        exit_time: i64,
    ) -> Option<Trade> {
        let idx = self.state.positions.iter().position(|p| &p.id == id)?;
        let position = self.state.positions.remove(idx);
        let trade = self.settle(position, exit_price, exit_time, ExitReason::Manual);
        self.state.current_price = Some(exit_price);
        self.advance_clock(exit_time);
        self.revalue();
        Some(trade)
    }

    /// Close every open position at one price in a single transition.
    pub fn close_all_positions(&mut self, exit_price: f64, exit_time: i64) -> Vec<Trade> {
        let positions = std::mem::take(&mut self.state.positions);
        let trades = positions
            .into_iter()
            .map(|p| self.settle(p, exit_price, exit_time, ExitReason::CloseAll))
            .collect();
        self.state.current_price = Some(exit_price);
        self.advance_clock(exit_time);
        self.revalue();
        trades
    }

    /// Edit stop-loss/take-profit. Returns false for an unknown id.
    pub fn update_position(&mut self, id: &PositionId, update: PositionUpdate) -> bool {
        let Some(position) = self.state.positions.iter_mut().find(|p| &p.id == id) else {
            return false;
        };
        position.apply(&update);
        debug!(%id, stop_loss = ?position.stop_loss, take_profit = ?position.take_profit, "bounds updated");
        true
    }

    /// Back to the initial balance with no positions or trades.
    /// Id counters keep running.
    pub fn reset_account(&mut self) {
        self.state = TradingState::fresh(self.config.initial_balance);
        info!(balance = self.state.balance, "account reset");
    }

    fn settle(
        &mut self,
        position: Position,
        exit_price: f64,
        exit_time: i64,
        reason: ExitReason,
    ) -> Trade {
        let pnl = position.pnl_at(exit_price, self.config.leverage);
        self.state.balance += pnl;

        let trade = Trade {
            id: self.ids.next_trade(),
            position_id: position.id,
            side: position.side,
            entry_price: position.entry_price,
            exit_price,
            size: position.size,
            pnl,
            entry_time: position.entry_time,
            exit_time,
            reason,
        };
        info!(
            trade = %trade.id,
            position = %trade.position_id,
            %reason,
            exit_price,
            pnl,
            "position closed"
        );
        self.state.trades.push(trade.clone());
        trade
    }

    fn advance_clock(&mut self, time: i64) {
        self.state.last_time = Some(self.state.last_time.map_or(time, |last| last.max(time)));
    }

    fn revalue(&mut self) {
        self.state.equity = self.state.balance + self.state.unrealized_pnl(self.config.leverage);
    }
}

impl Default for TradingEngine {
    fn default() -> Self {
        Self::new(AccountConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "actual={actual}, expected={expected}"
        );
    }

    #[test]
    fn open_leaves_balance_untouched() {
        let mut engine = TradingEngine::default();
        let id = engine.open_position(PositionSide::Long, 1.0, 1.1, 0, None, None);
        assert_eq!(engine.balance(), 10_000.0);
        assert_eq!(engine.equity(), 10_000.0);
        assert_eq!(engine.position(&id).unwrap().entry_price, 1.1);
        assert_eq!(engine.current_price(), Some(1.1));
    }

    #[test]
    fn long_and_short_unrealized_pnl() {
        let mut engine = TradingEngine::default();
        engine.open_position(PositionSide::Long, 1.0, 1.10000, 0, None, None);
        engine.update_price(1.10050, 60);
        assert_close(engine.equity() - engine.balance(), 0.05);

        let mut engine = TradingEngine::default();
        engine.open_position(PositionSide::Short, 1.0, 1.10000, 0, None, None);
        engine.update_price(1.10050, 60);
        assert_close(engine.equity() - engine.balance(), -0.05);
    }

    #[test]
    fn long_stop_loss_settles_at_bound() {
        let mut engine = TradingEngine::default();
        engine.open_position(PositionSide::Long, 2.0, 1.1000, 0, Some(1.0950), Some(1.1100));
        let trades = engine.update_price(1.0940, 60);

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].exit_price, 1.0950);
        assert_eq!(trades[0].reason, ExitReason::StopLoss);
        assert_close(trades[0].pnl, (1.0950 - 1.1000) * 2.0 * 100.0);
        assert!(engine.positions().is_empty());
        assert_close(engine.balance(), 10_000.0 + trades[0].pnl);
        assert_close(engine.equity(), engine.balance());
    }

    #[test]
    fn short_take_profit() {
        let mut engine = TradingEngine::default();
        engine.open_position(PositionSide::Short, 1.0, 1.2000, 0, Some(1.2100), Some(1.1900));
        assert!(engine.update_price(1.1950, 60).is_empty());
        let trades = engine.update_price(1.1890, 120);
        assert_eq!(trades[0].reason, ExitReason::TakeProfit);
        assert_close(trades[0].pnl, (1.2000 - 1.1900) * 100.0);
    }

    #[test]
    fn stop_loss_wins_when_both_breached() {
        // Bounds on the same side: price satisfies both conditions.
        let mut engine = TradingEngine::default();
        engine.open_position(PositionSide::Long, 1.0, 1.1000, 0, Some(1.0950), Some(1.0900));
        let trades = engine.update_price(1.0900, 60);
        assert_eq!(trades[0].reason, ExitReason::StopLoss);
        assert_eq!(trades[0].exit_price, 1.0950);
    }

    #[test]
    fn older_prices_are_ignored() {
        let mut engine = TradingEngine::default();
        engine.open_position(PositionSide::Long, 1.0, 1.1000, 600, Some(1.0950), None);
        assert!(engine.update_price(1.0900, 300).is_empty());
        assert_eq!(engine.positions().len(), 1);
        assert_eq!(engine.current_price(), Some(1.1000));
        assert_eq!(engine.last_time(), Some(600));

        let trades = engine.update_price(1.0900, 660);
        assert_eq!(trades.len(), 1);
        assert!(trades[0].exit_time >= trades[0].entry_time);
        assert_eq!(engine.last_time(), Some(660));
    }

    #[test]
    fn unset_bounds_never_trigger() {
        let mut engine = TradingEngine::default();
        engine.open_position(PositionSide::Long, 1.0, 1.0, 0, None, None);
        assert!(engine.update_price(0.01, 60).is_empty());
        assert!(engine.update_price(100.0, 120).is_empty());
        assert_eq!(engine.positions().len(), 1);
    }

    #[test]
    fn manual_close_and_unknown_id() {
        let mut engine = TradingEngine::default();
        let id = engine.open_position(PositionSide::Long, 1.0, 1.1, 0, None, None);
        let trade = engine.close_position(&id, 1.2, 60).unwrap();
        assert_eq!(trade.reason, ExitReason::Manual);
        assert_eq!(trade.position_id, id);
        assert!(engine.close_position(&id, 1.2, 60).is_none());
        assert_eq!(engine.trades().len(), 1);
        assert_eq!(engine.current_price(), Some(1.2));
    }

    #[test]
    fn close_all_settles_everything_at_once() {
        let mut engine = TradingEngine::default();
        engine.open_position(PositionSide::Long, 1.0, 1.0, 0, None, None);
        engine.open_position(PositionSide::Short, 1.0, 1.0, 0, None, None);
        let trades = engine.close_all_positions(1.5, 60);
        assert_eq!(trades.len(), 2);
        assert!(trades.iter().all(|t| t.reason == ExitReason::CloseAll));
        // Long +50, short -50.
        assert_close(engine.balance(), 10_000.0);
        assert!(engine.positions().is_empty());
    }

    #[test]
    fn update_position_edits_bounds() {
        let mut engine = TradingEngine::default();
        let id = engine.open_position(PositionSide::Long, 1.0, 1.0, 0, None, None);
        assert!(engine.update_position(&id, PositionUpdate::stop_loss(0.9)));
        assert_eq!(engine.position(&id).unwrap().stop_loss, Some(0.9));
        assert!(!engine.update_position(&PositionId::new("pos-999"), PositionUpdate::default()));
    }

    #[test]
    fn reset_restores_initial_account_and_keeps_ids_fresh() {
        let mut engine = TradingEngine::default();
        let first = engine.open_position(PositionSide::Long, 1.0, 1.0, 0, None, None);
        engine.close_all_positions(1.1, 60);
        engine.reset_account();

        assert_eq!(engine.balance(), 10_000.0);
        assert_eq!(engine.equity(), 10_000.0);
        assert!(engine.positions().is_empty());
        assert!(engine.trades().is_empty());

        let second = engine.open_position(PositionSide::Long, 1.0, 1.0, 0, None, None);
        assert_ne!(first, second);
    }

    #[test]
    fn custom_leverage() {
        let mut engine = TradingEngine::new(AccountConfig {
            initial_balance: 500.0,
            leverage: 10.0,
        });
        let id = engine.open_position(PositionSide::Long, 1.0, 2.0, 0, None, None);
        let trade = engine.close_position(&id, 3.0, 60).unwrap();
        assert_close(trade.pnl, 10.0);
        assert_close(engine.balance(), 510.0);
    }
}
