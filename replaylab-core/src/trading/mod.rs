//! Paper-trading engine: leveraged positions settled against the replayed
//! price stream.

pub mod engine;
pub mod stats;

pub use engine::{AccountConfig, TradingEngine, TradingState};
pub use stats::{ProfitFactor, TradeStats};
