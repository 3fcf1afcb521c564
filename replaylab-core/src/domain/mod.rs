//! Domain types for ReplayLab

pub mod candle;
pub mod ids;
pub mod position;
pub mod timeframe;
pub mod trade;

pub use candle::{validate_series, Candle, CandleError};
pub use ids::{IdGenerator, PositionId, TradeId};
pub use position::{BoundChange, Position, PositionSide, PositionUpdate, RiskReward};
pub use timeframe::{Timeframe, TimeframeError};
pub use trade::{ExitReason, Trade};
