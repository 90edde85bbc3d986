//! bullpen - Real-time multiplayer trading game server
//!
//! A background engine task fluctuates prices for a fixed instrument set
//! once per tick and broadcasts them over WebSocket; connected clients
//! trade against per-session ledgers until the round countdown hits zero,
//! at which point every position is liquidated and final results go out.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod types;
pub mod websocket;

use config::Config;
use engine::EngineHandle;
use std::sync::Arc;
use websocket::SessionRegistry;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: EngineHandle,
    pub registry: Arc<SessionRegistry>,
}

// Re-export commonly used types
pub use error::{AppError, MarketError};
pub use types::*;
