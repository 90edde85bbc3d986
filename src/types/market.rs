use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Side of a trade request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "buy"),
            TradeAction::Sell => write!(f, "sell"),
        }
    }
}

/// Point-in-time view of the whole market, served over the HTTP API and
/// used by integration tests.
#[derive(Debug, Clone, Serialize)]
pub struct MarketSnapshot {
    /// Whether a round is in progress.
    pub active: bool,
    /// Seconds remaining in the current round (0 when idle).
    pub time_left: u64,
    /// Current price per instrument.
    pub prices: BTreeMap<String, i64>,
    /// Post-clamp change applied on the most recent tick.
    pub changes: BTreeMap<String, i64>,
    /// Number of connected sessions.
    pub sessions: usize,
}
