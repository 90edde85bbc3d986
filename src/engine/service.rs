//! The engine task.
//!
//! A single task owns the [`Market`] and is reached only through
//! [`EngineHandle`] commands, so tick updates and trade handling never
//! interleave. The per-round tick interval is multiplexed into the same
//! task with `select!`.

use crate::config::Config;
use crate::engine::market::{Market, TickOutcome};
use crate::types::{MarketSnapshot, ServerMessage, TradeAction};
use crate::websocket::SessionRegistry;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Duration, Interval, MissedTickBehavior};
use tracing::{info, warn};
use uuid::Uuid;

/// Commands accepted by the engine task.
#[derive(Debug)]
pub enum Command {
    /// A session connected; create its ledger and send it `init_status`.
    Connect { session: Uuid },
    /// A session disconnected; discard its ledger.
    Disconnect { session: Uuid },
    /// A session asked to start a round.
    StartRound { session: Uuid },
    /// A session asked to buy or sell one share.
    Trade {
        session: Uuid,
        action: TradeAction,
        symbol: String,
    },
    /// Query the current market view.
    Snapshot {
        reply: oneshot::Sender<MarketSnapshot>,
    },
}

/// Cloneable handle to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl EngineHandle {
    pub fn connect(&self, session: Uuid) {
        let _ = self.tx.send(Command::Connect { session });
    }

    pub fn disconnect(&self, session: Uuid) {
        let _ = self.tx.send(Command::Disconnect { session });
    }

    pub fn start_round(&self, session: Uuid) {
        let _ = self.tx.send(Command::StartRound { session });
    }

    pub fn trade(&self, session: Uuid, action: TradeAction, symbol: String) {
        let _ = self.tx.send(Command::Trade {
            session,
            action,
            symbol,
        });
    }

    /// Fetch the current market view. Returns `None` if the engine task
    /// is gone.
    pub async fn snapshot(&self) -> Option<MarketSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Snapshot { reply }).ok()?;
        rx.await.ok()
    }
}

/// Spawn the engine task and return a handle to it.
pub fn spawn(config: Arc<Config>, registry: Arc<SessionRegistry>) -> EngineHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run(config, registry, rx));
    EngineHandle { tx }
}

async fn run(
    config: Arc<Config>,
    registry: Arc<SessionRegistry>,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut market = Market::new(&config);
    let mut rng = StdRng::from_entropy();

    // Only polled while a round is active; reset on every round start so
    // the first tick lands one full interval after the start request.
    let mut ticker = time::interval(Duration::from_millis(config.tick_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Engine started: {} instruments, {}s rounds",
        config.instruments.len(),
        config.round_duration_secs
    );

    loop {
        let active = market.active();

        tokio::select! {
            _ = ticker.tick(), if active => {
                let outcome = market.tick(&mut rng);

                registry.broadcast_all(&ServerMessage::UpdateData {
                    time_left: market.time_left(),
                    prices: market.prices(),
                    changes: market.changes(),
                    timestamp: chrono::Utc::now().timestamp_millis(),
                });

                if let TickOutcome::RoundOver(results) = outcome {
                    let settled = results.len();
                    for (session, result) in results {
                        registry.send_to(session, &ServerMessage::GameOver {
                            final_balance: result.final_balance,
                            profit: result.profit,
                        });
                    }
                    info!("Round over, settled {} sessions", settled);
                }
            }
            cmd = rx.recv() => {
                match cmd {
                    Some(cmd) => handle_command(cmd, &mut market, &mut ticker, &registry),
                    // All handles dropped; nothing can reach the market anymore.
                    None => break,
                }
            }
        }
    }

    info!("Engine stopped");
}

fn handle_command(
    cmd: Command,
    market: &mut Market,
    ticker: &mut Interval,
    registry: &SessionRegistry,
) {
    match cmd {
        Command::Connect { session } => {
            let view = market.connect(session);
            info!("Session {} joined with {} cash", session, view.cash);
            registry.send_to(
                session,
                &ServerMessage::InitStatus {
                    cash: view.cash,
                    holdings: view.holdings,
                    prices: market.prices(),
                    active: market.active(),
                },
            );
        }
        Command::Disconnect { session } => {
            market.disconnect(session);
            info!("Session {} left", session);
        }
        Command::StartRound { session } => match market.start_round() {
            Ok(()) => {
                info!("Round started by session {}", session);
                registry.broadcast_all(&ServerMessage::GameStarted);
                ticker.reset();
            }
            Err(e) => {
                registry.send_to(
                    session,
                    &ServerMessage::Error {
                        error: e.to_string(),
                    },
                );
            }
        },
        Command::Trade {
            session,
            action,
            symbol,
        } => match market.trade(session, action, &symbol) {
            Ok(view) => {
                registry.send_to(
                    session,
                    &ServerMessage::UserUpdate {
                        cash: view.cash,
                        holdings: view.holdings,
                        profit: view.profit,
                    },
                );
            }
            Err(e) => {
                warn!("Rejected {} {} from {}: {}", action, symbol, session, e);
                registry.send_to(
                    session,
                    &ServerMessage::Error {
                        error: e.to_string(),
                    },
                );
            }
        },
        Command::Snapshot { reply } => {
            let _ = reply.send(market.snapshot());
        }
    }
}
