use super::TradeAction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Incoming WebSocket message from a client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request a new round. Rejected with an `error` message if one is
    /// already running.
    StartRound,
    /// Buy or sell one share of an instrument at the current price.
    Trade { action: TradeAction, symbol: String },
}

/// Outgoing WebSocket message to one or all clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent to a session right after it connects.
    InitStatus {
        cash: i64,
        holdings: BTreeMap<String, u32>,
        prices: BTreeMap<String, i64>,
        active: bool,
    },
    /// Broadcast when a round begins.
    GameStarted,
    /// Broadcast once per tick while a round is running.
    UpdateData {
        time_left: u64,
        prices: BTreeMap<String, i64>,
        changes: BTreeMap<String, i64>,
        timestamp: i64,
    },
    /// Sent to a session after one of its trades executes. Profit is
    /// marked to market at current prices.
    UserUpdate {
        cash: i64,
        holdings: BTreeMap<String, u32>,
        profit: i64,
    },
    /// Sent to each session at settlement.
    GameOver { final_balance: i64, profit: i64 },
    /// Sent to a session whose request was rejected.
    Error { error: String },
}
