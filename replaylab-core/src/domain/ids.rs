use serde::{Deserialize, Serialize};
use std::fmt;

/// Position ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId(pub String);

impl PositionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trade ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradeId(pub String);

impl TradeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic ID source.
///
/// Counters only ever increase, including across account resets, so an ID is
/// never handed out twice within a session.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    next_position: u64,
    next_trade: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_position(&mut self) -> PositionId {
        self.next_position += 1;
        PositionId(format!("pos-{}", self.next_position))
    }

    pub fn next_trade(&mut self) -> TradeId {
        self.next_trade += 1;
        TradeId(format!("trade-{}", self.next_trade))
    }
}
